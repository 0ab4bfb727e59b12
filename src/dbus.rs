use std::{sync::Arc, time::Duration};

use log::{debug, info};
use parking_lot::Mutex;
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{app::App, error::CompanionError, media, service::DeviceBroadcast, ui::Message};

impl From<CompanionError> for fdo::Error {
   fn from(e: CompanionError) -> Self {
      match e {
         CompanionError::UnknownSetting(_)
         | CompanionError::InvalidSettingValue { .. }
         | CompanionError::UnknownRoute(_)
         | CompanionError::MissingRouteArgument { .. }
         | CompanionError::UnknownPermission(_)
         | CompanionError::InvalidUri(_)
         | CompanionError::MagicKey(_)
         | CompanionError::Json(_) => Self::InvalidArgs(e.to_string()),
         CompanionError::ContentLocked => Self::AccessDenied(e.to_string()),
         e => Self::Failed(e.to_string()),
      }
   }
}

pub struct CompanionService {
   app: Arc<Mutex<App>>,
}

impl CompanionService {
   pub const fn new(app: Arc<Mutex<App>>) -> Self {
      Self { app }
   }
}

#[interface(name = "org.kairpods.Companion")]
impl CompanionService {
   /// Current view tree as JSON.
   async fn render(&self) -> fdo::Result<String> {
      let node = self.app.lock().view();
      Ok(serde_json::to_string(&node).map_err(CompanionError::from)?)
   }

   async fn render_outline(&self) -> String {
      self.app.lock().view().to_string()
   }

   /// Advances animations; returns whether another frame is needed.
   async fn tick(&self, elapsed_ms: u32) -> bool {
      self
         .app
         .lock()
         .advance(Duration::from_millis(u64::from(elapsed_ms)))
   }

   async fn dispatch(&self, message: String) -> fdo::Result<bool> {
      let message: Message =
         serde_json::from_str(&message).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
      self.app.lock().dispatch(message)?;
      Ok(true)
   }

   async fn get_setting(&self, key: String) -> fdo::Result<String> {
      let value = self.app.lock().setting(&key)?;
      Ok(serde_json::to_string(&value).map_err(CompanionError::from)?)
   }

   async fn set_setting(&self, key: String, value: String) -> fdo::Result<bool> {
      let value: serde_json::Value =
         serde_json::from_str(&value).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
      self.app.lock().set_setting(&key, &value)?;
      info!("Setting {key} updated over D-Bus");
      Ok(true)
   }

   async fn open_uri(&self, uri: String) -> fdo::Result<bool> {
      self.app.lock().handle_uri(&uri)?;
      Ok(true)
   }

   async fn permission_result(&self, permission: String, granted: bool) -> fdo::Result<String> {
      let state = self.app.lock().permission_result(&permission, granted)?;
      Ok(state.to_string())
   }

   async fn set_overlay_granted(&self, granted: bool) -> fdo::Result<()> {
      self.app.lock().set_overlay_granted(granted)?;
      Ok(())
   }

   /// Feeds a raw conversational awareness packet (hex).
   async fn report_conversation(&self, packet: String) -> fdo::Result<bool> {
      let packet = hex::decode(packet).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
      let Some(speaking) = media::parse_conversation(&packet) else {
         debug!("Ignoring non-conversation packet");
         return Ok(false);
      };
      self
         .app
         .lock()
         .on_broadcast(DeviceBroadcast::Conversation(speaking));
      Ok(true)
   }

   async fn current_route(&self) -> String {
      self
         .app
         .lock()
         .current_route()
         .map(|r| r.path())
         .unwrap_or_default()
   }

   #[zbus(signal)]
   pub async fn setting_changed(
      emitter: &SignalEmitter<'_>,
      key: &str,
      value: &str,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn route_changed(emitter: &SignalEmitter<'_>, route: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn gate_changed(emitter: &SignalEmitter<'_>, state: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn toast(emitter: &SignalEmitter<'_>, text: &str, long: bool) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn service_connection_changed(
      emitter: &SignalEmitter<'_>,
      connected: bool,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn permissions_requested(
      emitter: &SignalEmitter<'_>,
      permissions: Vec<String>,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn overlay_settings_requested(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn disconnect_receivers(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

   #[zbus(property)]
   async fn gate_state(&self) -> String {
      self.app.lock().gate().state().to_string()
   }

   #[zbus(property)]
   async fn connected(&self) -> bool {
      self.app.lock().is_connected()
   }
}
