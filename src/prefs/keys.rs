//! Typed keys of the "settings" namespace.

use std::ops::RangeInclusive;

use smol_str::SmolStr;

use crate::{
   error::{CompanionError, Result},
   prefs::store::PrefValue,
   ui::slider::clamp_to_range,
};

/// Conversion between a Rust type and a stored [`PrefValue`].
pub trait PrefType: Clone {
   const TYPE_NAME: &'static str;

   fn from_pref(value: &PrefValue) -> Option<Self>;
   fn into_pref(self) -> PrefValue;
}

impl PrefType for bool {
   const TYPE_NAME: &'static str = "bool";

   fn from_pref(value: &PrefValue) -> Option<Self> {
      match value {
         PrefValue::Bool(b) => Some(*b),
         _ => None,
      }
   }

   fn into_pref(self) -> PrefValue {
      PrefValue::Bool(self)
   }
}

impl PrefType for i64 {
   const TYPE_NAME: &'static str = "int";

   fn from_pref(value: &PrefValue) -> Option<Self> {
      match value {
         PrefValue::Int(i) => Some(*i),
         _ => None,
      }
   }

   fn into_pref(self) -> PrefValue {
      PrefValue::Int(self)
   }
}

impl PrefType for SmolStr {
   const TYPE_NAME: &'static str = "string";

   fn from_pref(value: &PrefValue) -> Option<Self> {
      match value {
         PrefValue::Str(s) => Some(s.clone()),
         _ => None,
      }
   }

   fn into_pref(self) -> PrefValue {
      PrefValue::Str(self)
   }
}

/// A named setting with its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting<T> {
   pub key: &'static str,
   pub default: T,
}

impl<T> Setting<T> {
   pub const fn new(key: &'static str, default: T) -> Self {
      Self { key, default }
   }
}

/// What tapping the quick settings tile does.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   strum::Display,
   strum::EnumString,
   strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum QsClickBehavior {
   /// Open a dialog with noise control and conversational awareness.
   Dialog,
   /// Cycle through noise control modes.
   Cycle,
}

impl PrefType for QsClickBehavior {
   const TYPE_NAME: &'static str = "string";

   // Anything but "dialog" means cycling.
   fn from_pref(value: &PrefValue) -> Option<Self> {
      match value {
         PrefValue::Str(s) if s.as_str() == "dialog" => Some(Self::Dialog),
         PrefValue::Str(_) => Some(Self::Cycle),
         _ => None,
      }
   }

   fn into_pref(self) -> PrefValue {
      let s: &'static str = self.into();
      PrefValue::Str(SmolStr::new_static(s))
   }
}

pub const NAME: Setting<SmolStr> = Setting::new("name", SmolStr::new_static(""));
pub const SHOW_PHONE_BATTERY_IN_WIDGET: Setting<bool> =
   Setting::new("show_phone_battery_in_widget", true);
pub const CONVERSATIONAL_AWARENESS_PAUSE_MUSIC: Setting<bool> =
   Setting::new("conversational_awareness_pause_music", false);
pub const RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME: Setting<bool> =
   Setting::new("relative_conversational_awareness_volume", true);
pub const CONVERSATIONAL_AWARENESS_VOLUME: Setting<i64> =
   Setting::new("conversational_awareness_volume", 43);
pub const QS_CLICK_BEHAVIOR: Setting<QsClickBehavior> =
   Setting::new("qs_click_behavior", QsClickBehavior::Dialog);
pub const DISCONNECT_WHEN_NOT_WEARING: Setting<bool> =
   Setting::new("disconnect_when_not_wearing", false);
pub const OVERLAY_PERMISSION_SKIPPED: Setting<bool> =
   Setting::new("overlay_permission_skipped", false);
/// Set by the cross-device session when a companion is available elsewhere.
pub const CROSS_DEVICE_IS_AVAILABLE: Setting<bool> = Setting::new("CrossDeviceIsAvailable", false);
/// Identity resolving key, base64.
pub const IRK: Setting<SmolStr> = Setting::new("IRK", SmolStr::new_static(""));
/// Encryption key, base64.
pub const ENC_KEY: Setting<SmolStr> = Setting::new("ENC_KEY", SmolStr::new_static(""));

pub const CONVERSATIONAL_AWARENESS_VOLUME_RANGE: RangeInclusive<i64> = 10..=85;

/// Clamps raw slider input into the conversational awareness volume range.
///
/// Fractions are truncated toward zero after clamping; NaN maps to the
/// lower bound.
pub fn clamp_volume(raw: f64) -> i64 {
   clamp_to_range(raw, &CONVERSATIONAL_AWARENESS_VOLUME_RANGE)
}

/// Value type of a known setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
   Bool,
   Int,
   Str,
   /// Integer clamped into [`CONVERSATIONAL_AWARENESS_VOLUME_RANGE`].
   Volume,
   /// One of the [`QsClickBehavior`] names.
   QsBehavior,
}

/// Every key the companion reads or writes.
pub const KNOWN_SETTINGS: &[(&str, SettingKind)] = &[
   ("name", SettingKind::Str),
   ("show_phone_battery_in_widget", SettingKind::Bool),
   ("conversational_awareness_pause_music", SettingKind::Bool),
   ("relative_conversational_awareness_volume", SettingKind::Bool),
   ("conversational_awareness_volume", SettingKind::Volume),
   ("qs_click_behavior", SettingKind::QsBehavior),
   ("disconnect_when_not_wearing", SettingKind::Bool),
   ("overlay_permission_skipped", SettingKind::Bool),
   ("CrossDeviceIsAvailable", SettingKind::Bool),
   ("IRK", SettingKind::Str),
   ("ENC_KEY", SettingKind::Str),
];

pub fn setting_kind(key: &str) -> Option<SettingKind> {
   KNOWN_SETTINGS
      .iter()
      .find(|(k, _)| *k == key)
      .map(|(_, kind)| *kind)
}

/// Value reported for a known key that was never written.
pub fn default_value(key: &str) -> Option<PrefValue> {
   let kind = setting_kind(key)?;
   let value = match key {
      "show_phone_battery_in_widget" => SHOW_PHONE_BATTERY_IN_WIDGET.default.into_pref(),
      "relative_conversational_awareness_volume" => {
         RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME.default.into_pref()
      },
      "conversational_awareness_volume" => CONVERSATIONAL_AWARENESS_VOLUME.default.into_pref(),
      "qs_click_behavior" => QS_CLICK_BEHAVIOR.default.into_pref(),
      _ => match kind {
         SettingKind::Bool => PrefValue::Bool(false),
         SettingKind::Int | SettingKind::Volume => PrefValue::Int(0),
         SettingKind::Str | SettingKind::QsBehavior => PrefValue::Str(SmolStr::default()),
      },
   };
   Some(value)
}

/// Validates an externally supplied value for a known key.
///
/// Volumes are clamped rather than rejected, matching the slider.
pub fn coerce_value(key: &str, value: &serde_json::Value) -> Result<PrefValue> {
   let kind = setting_kind(key).ok_or_else(|| CompanionError::UnknownSetting(key.to_string()))?;
   let invalid = |reason: &str| CompanionError::InvalidSettingValue {
      key: key.to_string(),
      reason: reason.to_string(),
   };

   match kind {
      SettingKind::Bool => value
         .as_bool()
         .map(PrefValue::Bool)
         .ok_or_else(|| invalid("expected a boolean")),
      SettingKind::Int => value
         .as_i64()
         .map(PrefValue::Int)
         .ok_or_else(|| invalid("expected an integer")),
      SettingKind::Volume => value
         .as_f64()
         .map(|v| PrefValue::Int(clamp_volume(v)))
         .ok_or_else(|| invalid("expected a number")),
      SettingKind::Str => value
         .as_str()
         .map(PrefValue::from)
         .ok_or_else(|| invalid("expected a string")),
      SettingKind::QsBehavior => {
         let s = value.as_str().ok_or_else(|| invalid("expected a string"))?;
         let behavior: QsClickBehavior =
            s.parse().map_err(|_| invalid("expected dialog or cycle"))?;
         Ok(behavior.into_pref())
      },
   }
}
