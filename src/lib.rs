//! kAirPods companion
//!
//! Settings, onboarding, permission gating and UI state for kAirPods
//! front-ends. The binary serves this state on the session bus; the
//! library is usable on its own by front-ends embedding it directly.

pub mod app;
pub mod config;
pub mod dbus;
pub mod error;
pub mod event;
pub mod hook;
pub mod magic_keys;
pub mod media;
pub mod permissions;
pub mod prefs;
pub mod remote;
pub mod screens;
pub mod service;
pub mod ui;
