//! Persistent key-value store for the "settings" namespace.
//!
//! Every commit is written to disk before it becomes visible to readers or
//! listeners. A failed write rolls the in-memory map back, so displayed and
//! persisted values cannot diverge.

use std::{
   collections::BTreeMap,
   fmt, fs, io,
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicU64, Ordering},
   },
};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
   error::{CompanionError, Result},
   prefs::keys::{PrefType, Setting},
   ui::state::Subscription,
};

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
   Bool(bool),
   Int(i64),
   Str(SmolStr),
}

impl PrefValue {
   pub const fn type_name(&self) -> &'static str {
      match self {
         Self::Bool(_) => "bool",
         Self::Int(_) => "int",
         Self::Str(_) => "string",
      }
   }
}

impl fmt::Display for PrefValue {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Bool(b) => write!(f, "{b}"),
         Self::Int(i) => write!(f, "{i}"),
         Self::Str(s) => f.write_str(s),
      }
   }
}

impl From<bool> for PrefValue {
   fn from(value: bool) -> Self {
      Self::Bool(value)
   }
}

impl From<i64> for PrefValue {
   fn from(value: i64) -> Self {
      Self::Int(value)
   }
}

impl From<SmolStr> for PrefValue {
   fn from(value: SmolStr) -> Self {
      Self::Str(value)
   }
}

impl From<&str> for PrefValue {
   fn from(value: &str) -> Self {
      Self::Str(value.into())
   }
}

type Values = BTreeMap<SmolStr, PrefValue>;
type Listener = Arc<dyn Fn(&str) + Send + Sync>;

struct StoreInner {
   path: Option<PathBuf>,
   values: Mutex<Values>,
   listeners: Mutex<Vec<(u64, Listener)>>,
   next_id: AtomicU64,
}

/// Preference store backed by a JSON file.
///
/// This type is cheaply cloneable; clones share the same values and
/// listeners.
#[derive(Clone)]
pub struct PreferenceStore(Arc<StoreInner>);

impl fmt::Debug for PreferenceStore {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("PreferenceStore")
         .field("path", &self.0.path)
         .field("values", &*self.0.values.lock())
         .finish()
   }
}

impl PreferenceStore {
   /// Opens the store at `path`. A missing or empty file yields an empty store.
   pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
      let path = path.into();
      let values = match fs::read_to_string(&path) {
         Ok(contents) if contents.trim().is_empty() => Values::new(),
         Ok(contents) => serde_json::from_str(&contents)?,
         Err(e) if e.kind() == io::ErrorKind::NotFound => Values::new(),
         Err(e) => return Err(e.into()),
      };
      debug!("Opened settings at {} ({} keys)", path.display(), values.len());
      Ok(Self::with_values(Some(path), values))
   }

   /// Creates a store that is never written to disk.
   pub fn in_memory() -> Self {
      Self::with_values(None, Values::new())
   }

   fn with_values(path: Option<PathBuf>, values: Values) -> Self {
      Self(Arc::new(StoreInner {
         path,
         values: Mutex::new(values),
         listeners: Mutex::new(Vec::new()),
         next_id: AtomicU64::new(0),
      }))
   }

   pub fn path(&self) -> Option<&Path> {
      self.0.path.as_deref()
   }

   pub fn get(&self, key: &str) -> Option<PrefValue> {
      self.0.values.lock().get(key).cloned()
   }

   pub fn contains(&self, key: &str) -> bool {
      self.0.values.lock().contains_key(key)
   }

   pub fn get_bool(&self, key: &str, default: bool) -> bool {
      match self.get(key) {
         Some(PrefValue::Bool(b)) => b,
         None => default,
         Some(other) => mismatch(key, "bool", &other, default),
      }
   }

   pub fn get_int(&self, key: &str, default: i64) -> i64 {
      match self.get(key) {
         Some(PrefValue::Int(i)) => i,
         None => default,
         Some(other) => mismatch(key, "int", &other, default),
      }
   }

   pub fn get_string(&self, key: &str, default: &str) -> SmolStr {
      match self.get(key) {
         Some(PrefValue::Str(s)) => s,
         None => default.into(),
         Some(other) => mismatch(key, "string", &other, default.into()),
      }
   }

   /// Reads a typed setting, falling back to its default when absent.
   pub fn try_read<T: PrefType>(&self, setting: &Setting<T>) -> Result<T> {
      match self.get(setting.key) {
         None => Ok(setting.default.clone()),
         Some(value) => T::from_pref(&value).ok_or_else(|| CompanionError::TypeMismatch {
            key: setting.key.to_string(),
            expected: T::TYPE_NAME,
            found: value.type_name(),
         }),
      }
   }

   /// Like [`Self::try_read`], but a stored value of the wrong type reads as
   /// the default.
   pub fn read<T: PrefType>(&self, setting: &Setting<T>) -> T {
      self.try_read(setting).unwrap_or_else(|e| {
         warn!("{e}, using default");
         setting.default.clone()
      })
   }

   pub fn write<T: PrefType>(&self, setting: &Setting<T>, value: T) -> Result<()> {
      self.edit().put(setting.key, value.into_pref()).commit()?;
      Ok(())
   }

   pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
      self.edit().put(key, value).commit()?;
      Ok(())
   }

   pub fn set_int(&self, key: &str, value: i64) -> Result<()> {
      self.edit().put(key, value).commit()?;
      Ok(())
   }

   pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
      self.edit().put(key, value).commit()?;
      Ok(())
   }

   pub fn remove(&self, key: &str) -> Result<()> {
      self.edit().remove(key).commit()?;
      Ok(())
   }

   /// Starts a batch of changes that is persisted by a single commit.
   pub fn edit(&self) -> Editor<'_> {
      Editor {
         store: self,
         changes: SmallVec::new(),
      }
   }

   /// Registers a listener called with each changed key after a commit.
   pub fn subscribe(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
      let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
      self.0.listeners.lock().push((id, Arc::new(listener)));

      let weak = Arc::downgrade(&self.0);
      Subscription::new(move || {
         if let Some(inner) = weak.upgrade() {
            inner.listeners.lock().retain(|(i, _)| *i != id);
         }
      })
   }

   pub fn listener_count(&self) -> usize {
      self.0.listeners.lock().len()
   }

   fn persist(&self, values: &Values) -> Result<()> {
      let Some(path) = &self.0.path else {
         return Ok(());
      };

      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = serde_json::to_string_pretty(values)?;
      let tmp = path.with_extension("json.tmp");
      fs::write(&tmp, contents)?;
      fs::rename(&tmp, path)?;
      Ok(())
   }

   fn notify(&self, keys: &[SmolStr]) {
      let listeners: SmallVec<[Listener; 4]> = self
         .0
         .listeners
         .lock()
         .iter()
         .map(|(_, l)| l.clone())
         .collect();
      for key in keys {
         for listener in &listeners {
            listener(key);
         }
      }
   }
}

fn mismatch<T>(key: &str, expected: &str, found: &PrefValue, default: T) -> T {
   warn!(
      "Setting {key} holds a {}, expected a {expected}; using default",
      found.type_name()
   );
   default
}

/// Batch of pending changes.
#[must_use = "changes are only applied by commit()"]
pub struct Editor<'a> {
   store: &'a PreferenceStore,
   changes: SmallVec<[(SmolStr, Option<PrefValue>); 2]>,
}

impl Editor<'_> {
   pub fn put(mut self, key: &str, value: impl Into<PrefValue>) -> Self {
      self.changes.push((key.into(), Some(value.into())));
      self
   }

   pub fn remove(mut self, key: &str) -> Self {
      self.changes.push((key.into(), None));
      self
   }

   /// Applies and persists the batch, then notifies listeners.
   ///
   /// Returns the keys whose value changed. On error nothing is applied.
   pub fn commit(self) -> Result<Vec<SmolStr>> {
      let changed = {
         let mut values = self.store.0.values.lock();
         let snapshot = values.clone();

         for (key, value) in self.changes {
            match value {
               Some(value) => values.insert(key, value),
               None => values.remove(&key),
            };
         }

         let mut changed: Vec<SmolStr> = Vec::new();
         for key in snapshot.keys().chain(values.keys()) {
            if snapshot.get(key) != values.get(key) && !changed.contains(key) {
               changed.push(key.clone());
            }
         }
         if changed.is_empty() {
            return Ok(changed);
         }

         if let Err(e) = self.store.persist(&values) {
            warn!("Failed to persist settings, reverting: {e}");
            *values = snapshot;
            return Err(e);
         }
         changed
      };

      debug!("Committed settings: {changed:?}");
      self.store.notify(&changed);
      Ok(changed)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::prefs::keys;

   fn open_temp() -> (tempfile::TempDir, PreferenceStore) {
      let dir = tempfile::tempdir().unwrap();
      let store = PreferenceStore::open(dir.path().join("settings.json")).unwrap();
      (dir, store)
   }

   #[test]
   fn test_defaults_when_absent() {
      let store = PreferenceStore::in_memory();
      assert!(store.get_bool("show_phone_battery_in_widget", true));
      assert_eq!(store.get_int("conversational_awareness_volume", 43), 43);
      assert_eq!(store.get_string("name", ""), "");
      assert!(!store.contains("name"));
   }

   #[test]
   fn test_values_survive_reopen() {
      let (dir, store) = open_temp();
      store.set_bool("disconnect_when_not_wearing", true).unwrap();
      store.set_int("conversational_awareness_volume", 60).unwrap();
      store.set_string("qs_click_behavior", "cycle").unwrap();
      drop(store);

      let store = PreferenceStore::open(dir.path().join("settings.json")).unwrap();
      assert!(store.get_bool("disconnect_when_not_wearing", false));
      assert_eq!(store.get_int("conversational_awareness_volume", 43), 60);
      assert_eq!(store.get_string("qs_click_behavior", "dialog"), "cycle");
   }

   #[test]
   fn test_toggle_n_times_persists_last_value() {
      let (dir, store) = open_temp();
      let path = dir.path().join("settings.json");

      for n in 0..7 {
         let mut value = keys::SHOW_PHONE_BATTERY_IN_WIDGET.default;
         for _ in 0..n {
            value = !value;
            store.write(&keys::SHOW_PHONE_BATTERY_IN_WIDGET, value).unwrap();
         }
         let reopened = PreferenceStore::open(&path).unwrap();
         assert_eq!(reopened.read(&keys::SHOW_PHONE_BATTERY_IN_WIDGET), value);
         assert_eq!(store.read(&keys::SHOW_PHONE_BATTERY_IN_WIDGET), value);
      }
   }

   #[test]
   fn test_listener_receives_changed_keys_only() {
      let store = PreferenceStore::in_memory();
      let seen = Arc::new(Mutex::new(Vec::<String>::new()));
      let sink = seen.clone();
      let _sub = store.subscribe(move |key| sink.lock().push(key.to_string()));

      store.set_bool("CrossDeviceIsAvailable", true).unwrap();
      store.set_bool("CrossDeviceIsAvailable", true).unwrap();
      store
         .edit()
         .put("IRK", "aXJr")
         .put("ENC_KEY", "ZW5j")
         .commit()
         .unwrap();

      assert_eq!(*seen.lock(), vec!["CrossDeviceIsAvailable", "ENC_KEY", "IRK"]);
   }

   #[test]
   fn test_listener_unregisters_on_drop() {
      let store = PreferenceStore::in_memory();
      let sub = store.subscribe(|_| {});
      assert_eq!(store.listener_count(), 1);
      drop(sub);
      assert_eq!(store.listener_count(), 0);
   }

   #[test]
   fn test_failed_persist_rolls_back() {
      let (dir, store) = open_temp();
      store.set_bool("disconnect_when_not_wearing", false).unwrap();

      // A directory squatting on the temp file name makes the write fail.
      fs::create_dir(dir.path().join("settings.json.tmp")).unwrap();

      let notified = Arc::new(Mutex::new(0usize));
      let counter = notified.clone();
      let _sub = store.subscribe(move |_| *counter.lock() += 1);

      assert!(store.set_bool("disconnect_when_not_wearing", true).is_err());
      assert!(!store.get_bool("disconnect_when_not_wearing", true));
      assert_eq!(*notified.lock(), 0);
   }

   #[test]
   fn test_type_mismatch() {
      let store = PreferenceStore::in_memory();
      store.set_string("show_phone_battery_in_widget", "yes").unwrap();

      assert!(matches!(
         store.try_read(&keys::SHOW_PHONE_BATTERY_IN_WIDGET),
         Err(CompanionError::TypeMismatch {
            expected: "bool",
            found: "string",
            ..
         })
      ));
      assert!(store.read(&keys::SHOW_PHONE_BATTERY_IN_WIDGET));
      assert!(!store.get_bool("show_phone_battery_in_widget", false));
   }

   #[test]
   fn test_remove() {
      let store = PreferenceStore::in_memory();
      store.set_int("conversational_awareness_volume", 20).unwrap();
      store.remove("conversational_awareness_volume").unwrap();
      assert!(!store.contains("conversational_awareness_volume"));
   }

   #[test]
   fn test_file_format_is_plain_json() {
      let (dir, store) = open_temp();
      store.set_bool("overlay_permission_skipped", true).unwrap();
      store.set_string("name", "Pods").unwrap();

      let raw = fs::read_to_string(dir.path().join("settings.json")).unwrap();
      let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
      assert_eq!(json["overlay_permission_skipped"], true);
      assert_eq!(json["name"], "Pods");
   }
}
