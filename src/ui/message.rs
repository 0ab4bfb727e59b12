//! User interactions carried by interactive view nodes.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// An interaction reported by a front-end.
///
/// Serialized as JSON tagged by `action`, e.g.
/// `{"action":"toggle","key":"disconnect_when_not_wearing"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Message {
   /// Flip a boolean setting.
   Toggle { key: SmolStr },
   SetToggle { key: SmolStr, value: bool },
   /// Raw slider position; clamped by the receiver.
   SetSlider { key: SmolStr, value: f64 },
   Navigate { route: SmolStr },
   Back,
   ShowResetDialog,
   DismissResetDialog,
   ConfirmResetHookOffset,
   RequestPermissions,
   OpenOverlaySettings,
   SkipOverlay,
}
