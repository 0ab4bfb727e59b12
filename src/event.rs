//! Event handling for companion state changes.
//!
//! This module provides the event infrastructure used to tell front-ends
//! about changed settings, navigation, the permission gate and user-facing
//! notifications.

use std::{sync::Arc, time::Duration};

use smol_str::SmolStr;

use crate::{
   media::MediaAction,
   permissions::{GateState, Permission},
   prefs::store::PrefValue,
};

/// How long a toast stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ToastDuration {
   Short,
   Long,
}

impl ToastDuration {
   pub const fn as_duration(self) -> Duration {
      match self {
         Self::Short => Duration::from_millis(2000),
         Self::Long => Duration::from_millis(3500),
      }
   }
}

/// A short user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
   pub text: SmolStr,
   pub duration: ToastDuration,
}

impl Toast {
   pub fn short(text: impl Into<SmolStr>) -> Self {
      Self {
         text: text.into(),
         duration: ToastDuration::Short,
      }
   }

   pub fn long(text: impl Into<SmolStr>) -> Self {
      Self {
         text: text.into(),
         duration: ToastDuration::Long,
      }
   }
}

/// Events that can be emitted by the companion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompanionEvent {
   SettingChanged(SmolStr, Option<PrefValue>),
   RouteChanged(SmolStr),
   GateChanged(GateState),
   Toast(Toast),
   ServiceConnected,
   ServiceDisconnected,
   Media(MediaAction),
   /// Ask the platform to drop the audio link of this device.
   DisconnectDevice(SmolStr),
   /// The front-end should prompt for these permissions.
   PermissionsRequested(Vec<Permission>),
   OverlaySettingsRequested,
   /// The front-end is going away; receivers bound to it should detach.
   DisconnectReceivers,
}

/// Trait for implementing event emission.
pub trait EventBus: Send + Sync {
   /// Emits an event to all registered listeners.
   fn emit(&self, event: CompanionEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;

#[cfg(test)]
pub(crate) mod testing {
   use parking_lot::Mutex;

   use super::*;

   /// Bus that records everything it is given.
   #[derive(Default)]
   pub struct EventLog(Mutex<Vec<CompanionEvent>>);

   impl EventLog {
      pub fn new() -> Arc<Self> {
         Arc::new(Self::default())
      }

      pub fn take(&self) -> Vec<CompanionEvent> {
         std::mem::take(&mut *self.0.lock())
      }

      pub fn toasts(&self) -> Vec<Toast> {
         self
            .0
            .lock()
            .iter()
            .filter_map(|e| match e {
               CompanionEvent::Toast(t) => Some(t.clone()),
               _ => None,
            })
            .collect()
      }
   }

   impl EventBus for EventLog {
      fn emit(&self, event: CompanionEvent) {
         self.0.lock().push(event);
      }
   }
}
