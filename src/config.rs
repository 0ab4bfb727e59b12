//! Configuration management for the companion core.
//!
//! This module handles loading and saving configuration from disk and
//! derives the locations of the settings store and the hook offset file.

use std::{
   env, fs,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, Result};

const CONFIG_DIR_NAME: &str = "kairpods-companion";
const CONFIG_FILE_NAME: &str = "config.toml";
const SETTINGS_FILE_NAME: &str = "settings.json";
const HOOK_OFFSET_FILE_NAME: &str = "hook_offset";

/// Main configuration structure for the companion.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// Well-known name the companion claims on the session bus.
   #[serde(default = "default_bus_name")]
   pub bus_name: String,

   #[serde(default = "default_object_path")]
   pub object_path: String,

   /// Well-known name of the `AirPods` daemon.
   #[serde(default = "default_service_name")]
   pub service_name: String,

   #[serde(default = "default_service_path")]
   pub service_path: String,

   /// Platform API level, selects the required permission set.
   #[serde(default = "default_sdk_level")]
   pub sdk_level: u32,

   /// Grant every runtime permission on start. Desktop platforms have no
   /// permission prompts.
   #[serde(default = "default_assume_permissions_granted")]
   pub assume_permissions_granted: bool,

   /// Scheme of deep links carrying magic keys.
   #[serde(default = "default_uri_scheme")]
   pub uri_scheme: String,

   #[serde(default)]
   pub dark_theme: bool,
}

fn default_bus_name() -> String {
   "org.kairpods.companion".to_string()
}

fn default_object_path() -> String {
   "/org/kairpods/companion".to_string()
}

fn default_service_name() -> String {
   "org.kairpods".to_string()
}

fn default_service_path() -> String {
   "/org/kairpods/manager".to_string()
}

const fn default_sdk_level() -> u32 {
   34
}

const fn default_assume_permissions_granted() -> bool {
   true
}

fn default_uri_scheme() -> String {
   "librepods".to_string()
}

impl Default for Config {
   fn default() -> Self {
      Self {
         bus_name: default_bus_name(),
         object_path: default_object_path(),
         service_name: default_service_name(),
         service_path: default_service_path(),
         sdk_level: default_sdk_level(),
         assume_permissions_granted: default_assume_permissions_granted(),
         uri_scheme: default_uri_scheme(),
         dark_theme: false,
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the defaults there if the file
   /// does not exist yet.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_dir() -> Result<PathBuf> {
      if let Ok(home) = env::var("KAIRPODS_COMPANION_HOME") {
         return Ok(PathBuf::from(home));
      }
      dirs::config_dir()
         .map(|dir| dir.join(CONFIG_DIR_NAME))
         .ok_or(CompanionError::ConfigDirNotFound)
   }

   fn config_path() -> Result<PathBuf> {
      Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
   }

   /// Location of the persisted "settings" namespace.
   pub fn settings_path() -> Result<PathBuf> {
      Ok(Self::config_dir()?.join(SETTINGS_FILE_NAME))
   }

   pub fn hook_offset_path() -> Result<PathBuf> {
      Ok(Self::config_dir()?.join(HOOK_OFFSET_FILE_NAME))
   }
}
