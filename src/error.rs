//! Error types for the companion core.
//!
//! This module defines all error types that can occur while loading
//! configuration, persisting settings, routing between screens and talking
//! to the `AirPods` service over D-Bus.

use thiserror::Error;

use crate::magic_keys::KeyError;

/// Main error type for the companion core.
#[derive(Error, Debug)]
pub enum CompanionError {
   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("D-Bus connection error: {0}")]
   DBusConnection(#[from] zbus::fdo::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("JSON error: {0}")]
   Json(#[from] serde_json::Error),

   #[error("Setting {key} holds a {found}, expected a {expected}")]
   TypeMismatch {
      key: String,
      expected: &'static str,
      found: &'static str,
   },

   #[error("Unknown setting: {0}")]
   UnknownSetting(String),

   #[error("Invalid value for setting {key}: {reason}")]
   InvalidSettingValue { key: String, reason: String },

   #[error("Unknown route: {0}")]
   UnknownRoute(String),

   #[error("Route {route} is missing argument {arg}")]
   MissingRouteArgument { route: String, arg: String },

   #[error("Main content is locked until permissions are granted")]
   ContentLocked,

   #[error("Unknown permission: {0}")]
   UnknownPermission(String),

   #[error("Invalid URI: {0}")]
   InvalidUri(String),

   #[error("Invalid magic key: {0}")]
   MagicKey(#[from] KeyError),

   #[error("Service not bound")]
   ServiceNotBound,

   #[error("Receiver not registered")]
   ReceiverNotRegistered,

   #[error("Failed to reset hook offset")]
   HookResetFailed,
}

/// Convenience type alias for Results with `CompanionError`.
pub type Result<T> = std::result::Result<T, CompanionError>;
