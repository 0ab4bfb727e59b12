//! Media reactions to ear detection and conversational awareness.
//!
//! [`MediaPolicy`] decides what should happen; [`MprisController`] carries
//! the decisions out against the active MPRIS player on the session bus.

use std::{
   num::NonZeroU8,
   sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, info};
use parking_lot::Mutex;
use serde::Deserialize;
use smallvec::{SmallVec, smallvec};
use zbus::{Connection, fdo::DBusProxy, zvariant::Value};

use crate::{
   error::Result,
   prefs::{keys, store::PreferenceStore},
};

/// When to pause playback as buds leave the ears.
#[derive(
   Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum EarDetectionBehavior {
   #[default]
   PauseWhenOneRemoved,
   PauseWhenBothRemoved,
   Disabled,
}

/// In-ear state of both buds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EarDetectionStatus(NonZeroU8);

impl EarDetectionStatus {
   pub const LEFT: u8 = 1 << 0;
   pub const RIGHT: u8 = 1 << 1;
   pub const VALID: u8 = 0x80;

   pub const fn new(left_in_ear: bool, right_in_ear: bool) -> Self {
      let mut flags = Self::VALID;
      if left_in_ear {
         flags |= Self::LEFT;
      }
      if right_in_ear {
         flags |= Self::RIGHT;
      }
      match NonZeroU8::new(flags) {
         Some(flags) => Self(flags),
         None => unreachable!(),
      }
   }

   pub const fn is_left_in_ear(&self) -> bool {
      self.0.get() & Self::LEFT != 0
   }

   pub const fn is_right_in_ear(&self) -> bool {
      self.0.get() & Self::RIGHT != 0
   }

   pub const fn any_in_ear(&self) -> bool {
      self.is_left_in_ear() || self.is_right_in_ear()
   }

   pub const fn both_in_ear(&self) -> bool {
      self.is_left_in_ear() && self.is_right_in_ear()
   }

   /// Parses the daemon's `{"left_in_ear":..,"right_in_ear":..}` payload.
   pub fn from_json(json: &str) -> Result<Self> {
      #[derive(Deserialize)]
      struct Report {
         left_in_ear: bool,
         right_in_ear: bool,
      }
      let report: Report = serde_json::from_str(json)?;
      Ok(Self::new(report.left_in_ear, report.right_in_ear))
   }
}

/// Something the media layer should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
   /// Pause the player if it is playing.
   Pause,
   /// Resume playback previously paused by the companion.
   Resume,
   /// Route audio to the `AirPods`.
   ActivateOutput,
   /// Stop routing audio to the `AirPods`.
   ReleaseOutput,
   /// Duck the player to `percent`, of the current volume when `relative`.
   LowerVolume { percent: u8, relative: bool },
   RestoreVolume,
   /// Drop the audio connection to the device.
   Disconnect,
}

pub type MediaActions = SmallVec<[MediaAction; 4]>;

/// Conversational awareness settings, read when a change arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwarenessSettings {
   pub pause_music: bool,
   pub relative_volume: bool,
   pub volume: u8,
}

impl AwarenessSettings {
   pub fn load(store: &PreferenceStore) -> Self {
      let volume = keys::clamp_volume(store.read(&keys::CONVERSATIONAL_AWARENESS_VOLUME) as f64);
      Self {
         pause_music: store.read(&keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC),
         relative_volume: store.read(&keys::RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME),
         volume: u8::try_from(volume).unwrap_or(u8::MAX),
      }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ducked {
   Paused,
   Lowered,
}

/// Turns device broadcasts into [`MediaAction`]s.
#[derive(Debug, Default)]
pub struct MediaPolicy {
   behavior: EarDetectionBehavior,
   last_status: Option<EarDetectionStatus>,
   ducked: Option<Ducked>,
}

impl MediaPolicy {
   pub fn new(behavior: EarDetectionBehavior) -> Self {
      Self {
         behavior,
         ..Self::default()
      }
   }

   pub const fn behavior(&self) -> EarDetectionBehavior {
      self.behavior
   }

   pub fn set_behavior(&mut self, behavior: EarDetectionBehavior) {
      self.behavior = behavior;
   }

   pub fn on_ear_detection(
      &mut self,
      status: EarDetectionStatus,
      disconnect_when_not_wearing: bool,
   ) -> MediaActions {
      let previous = self.last_status.replace(status);
      if previous == Some(status) {
         return MediaActions::new();
      }

      let mut actions = MediaActions::new();
      let should_pause = match self.behavior {
         EarDetectionBehavior::PauseWhenOneRemoved => !status.both_in_ear(),
         EarDetectionBehavior::PauseWhenBothRemoved => !status.any_in_ear(),
         EarDetectionBehavior::Disabled => false,
      };
      let was_paused = match (self.behavior, previous) {
         (EarDetectionBehavior::PauseWhenOneRemoved, Some(p)) => !p.both_in_ear(),
         (EarDetectionBehavior::PauseWhenBothRemoved, Some(p)) => !p.any_in_ear(),
         _ => false,
      };

      if status.any_in_ear() {
         actions.push(MediaAction::ActivateOutput);
      }
      if should_pause && !was_paused {
         actions.push(MediaAction::Pause);
      } else if !should_pause && was_paused {
         actions.push(MediaAction::Resume);
      }
      if !status.any_in_ear() {
         actions.push(MediaAction::ReleaseOutput);
         if disconnect_when_not_wearing {
            actions.push(MediaAction::Disconnect);
         }
      }
      debug!("Ear detection {status:?} -> {actions:?}");
      actions
   }

   pub fn on_conversation(&mut self, speaking: bool, settings: AwarenessSettings) -> MediaActions {
      match (speaking, self.ducked) {
         (true, None) if settings.pause_music => {
            self.ducked = Some(Ducked::Paused);
            smallvec![MediaAction::Pause]
         },
         (true, None) => {
            self.ducked = Some(Ducked::Lowered);
            smallvec![MediaAction::LowerVolume {
               percent: settings.volume,
               relative: settings.relative_volume,
            }]
         },
         (false, Some(Ducked::Paused)) => {
            self.ducked = None;
            smallvec![MediaAction::Resume]
         },
         (false, Some(Ducked::Lowered)) => {
            self.ducked = None;
            smallvec![MediaAction::RestoreVolume]
         },
         _ => MediaActions::new(),
      }
   }
}

const CONVERSATION_HEADER: [u8; 6] = [0x04, 0x00, 0x04, 0x00, 0x4b, 0x00];
const CONVERSATION_STATUS_OFFSET: usize = 9;
const CONVERSATION_SPEAKING: u8 = 0x01;

/// Parses a conversational awareness packet, returning whether the user
/// started speaking. Other packets yield `None`.
pub fn parse_conversation(packet: &[u8]) -> Option<bool> {
   if !packet.starts_with(&CONVERSATION_HEADER) {
      return None;
   }
   packet
      .get(CONVERSATION_STATUS_OFFSET)
      .map(|status| *status == CONVERSATION_SPEAKING)
}

/// Remembers the player volume across a duck.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct VolumeMemory {
   initial: Option<f64>,
}

impl VolumeMemory {
   /// Returns the volume to set. The first call records `current`.
   pub fn lower(&mut self, current: f64, percent: u8, relative: bool) -> f64 {
      let initial = *self.initial.get_or_insert(current);
      let fraction = f64::from(percent) / 100.0;
      if relative {
         initial * fraction
      } else {
         fraction.min(initial)
      }
   }

   pub fn restore(&mut self) -> Option<f64> {
      self.initial.take()
   }
}

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const MPRIS_PLAYER: &str = "org.mpris.MediaPlayer2.Player";
const PROPERTIES: &str = "org.freedesktop.DBus.Properties";

/// Applies [`MediaAction`]s to the first MPRIS player on the bus.
pub struct MprisController {
   connection: Connection,
   volume: Mutex<VolumeMemory>,
   paused_by_us: AtomicBool,
}

impl MprisController {
   pub fn new(connection: Connection) -> Self {
      Self {
         connection,
         volume: Mutex::new(VolumeMemory::default()),
         paused_by_us: AtomicBool::new(false),
      }
   }

   pub async fn apply(&self, action: MediaAction) -> Result<()> {
      match action {
         MediaAction::Pause => {
            let Some(player) = self.player().await? else {
               return Ok(());
            };
            if self.playback_status(&player).await?.as_deref() == Some("Playing") {
               self.call(&player, "Pause").await?;
               self.paused_by_us.store(true, Ordering::Release);
               info!("Paused {player}");
            }
         },
         MediaAction::Resume => {
            if self.paused_by_us.swap(false, Ordering::AcqRel)
               && let Some(player) = self.player().await?
            {
               self.call(&player, "Play").await?;
               info!("Resumed {player}");
            }
         },
         MediaAction::LowerVolume { percent, relative } => {
            let Some(player) = self.player().await? else {
               return Ok(());
            };
            let Some(current) = self.get_volume(&player).await? else {
               return Ok(());
            };
            let target = self.volume.lock().lower(current, percent, relative);
            self.set_volume(&player, target).await?;
            info!("Lowered {player} volume {current:.2} -> {target:.2}");
         },
         MediaAction::RestoreVolume => {
            let restore = self.volume.lock().restore();
            if let Some(volume) = restore
               && let Some(player) = self.player().await?
            {
               self.set_volume(&player, volume).await?;
               info!("Restored {player} volume to {volume:.2}");
            }
         },
         MediaAction::ActivateOutput | MediaAction::ReleaseOutput | MediaAction::Disconnect => {
            debug!("{action:?} is handled by the audio service");
         },
      }
      Ok(())
   }

   async fn player(&self) -> Result<Option<String>> {
      let names = DBusProxy::new(&self.connection).await?.list_names().await?;
      Ok(names
         .iter()
         .map(|n| n.as_str())
         .find(|n| n.starts_with(MPRIS_PREFIX))
         .map(str::to_string))
   }

   async fn call(&self, player: &str, method: &str) -> Result<()> {
      self
         .connection
         .call_method(Some(player), MPRIS_PATH, Some(MPRIS_PLAYER), method, &())
         .await?;
      Ok(())
   }

   async fn get_property(&self, player: &str, name: &str) -> Result<zbus::zvariant::OwnedValue> {
      let reply = self
         .connection
         .call_method(
            Some(player),
            MPRIS_PATH,
            Some(PROPERTIES),
            "Get",
            &(MPRIS_PLAYER, name),
         )
         .await?;
      Ok(reply.body().deserialize()?)
   }

   async fn playback_status(&self, player: &str) -> Result<Option<String>> {
      let value = self.get_property(player, "PlaybackStatus").await?;
      Ok(match &*value {
         Value::Str(s) => Some(s.to_string()),
         _ => None,
      })
   }

   async fn get_volume(&self, player: &str) -> Result<Option<f64>> {
      let value = self.get_property(player, "Volume").await?;
      Ok(match &*value {
         Value::F64(v) => Some(*v),
         _ => None,
      })
   }

   async fn set_volume(&self, player: &str, volume: f64) -> Result<()> {
      self
         .connection
         .call_method(
            Some(player),
            MPRIS_PATH,
            Some(PROPERTIES),
            "Set",
            &(MPRIS_PLAYER, "Volume", Value::F64(volume.clamp(0.0, 1.0))),
         )
         .await?;
      Ok(())
   }
}
