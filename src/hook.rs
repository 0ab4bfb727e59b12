//! Persistence of the hook offset.
//!
//! The offset is opaque to the companion: it is produced by the setup flow,
//! stored as hex text and only ever checked for presence or cleared.

use std::{
   fmt, fs, io,
   path::{Path, PathBuf},
};

use log::{info, warn};

use crate::error::{CompanionError, Result};

/// Offset consumed by the native hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookOffset(pub u64);

impl fmt::Display for HookOffset {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{:#x}", self.0)
   }
}

impl HookOffset {
   fn parse(text: &str) -> Option<Self> {
      let text = text.trim();
      let digits = text
         .strip_prefix("0x")
         .or_else(|| text.strip_prefix("0X"))
         .unwrap_or(text);
      if digits.is_empty() {
         return None;
      }
      u64::from_str_radix(digits, 16).ok().map(Self)
   }
}

/// File-backed hook offset.
#[derive(Debug, Clone)]
pub struct HookOffsetStore {
   path: PathBuf,
}

impl HookOffsetStore {
   pub fn new(path: impl Into<PathBuf>) -> Self {
      Self { path: path.into() }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   pub fn load(&self) -> Option<HookOffset> {
      let text = match fs::read_to_string(&self.path) {
         Ok(text) => text,
         Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
         Err(e) => {
            warn!("Failed to read hook offset: {e}");
            return None;
         },
      };
      let offset = HookOffset::parse(&text);
      if offset.is_none() {
         warn!("Ignoring malformed hook offset {:?}", text.trim());
      }
      offset
   }

   pub fn is_available(&self) -> bool {
      self.load().is_some()
   }

   pub fn save(&self, offset: HookOffset) -> Result<()> {
      if let Some(parent) = self.path.parent() {
         fs::create_dir_all(parent)?;
      }
      fs::write(&self.path, format!("{offset}\n"))?;
      info!("Saved hook offset {offset}");
      Ok(())
   }

   /// Removes the stored offset. Clearing an absent offset succeeds.
   pub fn clear(&self) -> Result<()> {
      match fs::remove_file(&self.path) {
         Ok(()) => {
            info!("Cleared hook offset");
            Ok(())
         },
         Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
         Err(e) => {
            warn!("Failed to clear hook offset: {e}");
            Err(CompanionError::HookResetFailed)
         },
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_save_load_clear() {
      let dir = tempfile::tempdir().unwrap();
      let store = HookOffsetStore::new(dir.path().join("hook_offset"));
      assert!(!store.is_available());

      store.save(HookOffset(0x1a2b3c)).unwrap();
      assert_eq!(store.load(), Some(HookOffset(0x1a2b3c)));
      assert!(store.is_available());

      store.clear().unwrap();
      assert!(!store.is_available());
      store.clear().unwrap();
   }

   #[test]
   fn test_parse_variants() {
      assert_eq!(HookOffset::parse("0x10\n"), Some(HookOffset(16)));
      assert_eq!(HookOffset::parse("0XfF"), Some(HookOffset(255)));
      assert_eq!(HookOffset::parse("abc"), Some(HookOffset(0xabc)));
      assert_eq!(HookOffset::parse("0x"), None);
      assert_eq!(HookOffset::parse("offset"), None);
   }

   #[test]
   fn test_malformed_file_is_unavailable() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("hook_offset");
      fs::write(&path, "not hex").unwrap();
      assert!(!HookOffsetStore::new(path).is_available());
   }

   #[test]
   fn test_clear_failure_is_reported() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("hook_offset");
      fs::create_dir(&path).unwrap();
      assert!(matches!(
         HookOffsetStore::new(path).clear(),
         Err(CompanionError::HookResetFailed)
      ));
   }
}
