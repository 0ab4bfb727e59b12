//! Application controller.
//!
//! Owns the permission gate, the back stack, mounted screens and the
//! service binding, and turns front-end interactions into state changes
//! and [`CompanionEvent`]s.

use std::{
   str::FromStr,
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   time::Duration,
};

use log::{debug, info, warn};

use crate::{
   config::Config,
   error::{CompanionError, Result},
   event::{CompanionEvent, EventSender, Toast},
   hook::HookOffsetStore,
   magic_keys,
   media::{AwarenessSettings, MediaAction, MediaPolicy},
   permissions::{GateState, Permission, PermissionGate},
   prefs::{
      keys::{self, QsClickBehavior},
      store::{PrefValue, PreferenceStore},
   },
   screens::{
      self, Effect,
      app_settings::AppSettingsScreen,
      device::{self, DeviceViewModel},
      onboarding, permissions,
   },
   service::{BoundService, DeviceBroadcast, ServiceBinder, ServiceHandle, ServiceSlot},
   ui::{
      Message, Node,
      host::ViewHost,
      nav::{self, NavOptions, NavRoute, Navigator, RouteTable},
      state::{State, Subscription},
      theme::Theme,
   },
};

pub const MAGIC_KEYS_ADDED_TOAST: &str = "Magic keys added successfully!";

pub struct App {
   config: Config,
   store: PreferenceStore,
   hooks: HookOffsetStore,
   events: EventSender,
   theme: Theme,
   gate: PermissionGate,
   navigator: Option<Navigator>,
   app_settings: Option<AppSettingsScreen>,
   slot: ServiceSlot,
   binder: Option<Box<dyn ServiceBinder>>,
   service: Option<BoundService>,
   is_connected: State<bool>,
   is_remotely_connected: State<bool>,
   cross_device_external: Arc<AtomicBool>,
   media: MediaPolicy,
   host: ViewHost,
   animating: bool,
   subscriptions: Vec<Subscription>,
}

impl App {
   pub fn new(
      config: Config,
      store: PreferenceStore,
      hooks: HookOffsetStore,
      events: EventSender,
   ) -> Self {
      let mut gate = PermissionGate::for_sdk(config.sdk_level);
      if store.read(&keys::OVERLAY_PERMISSION_SKIPPED) {
         gate.skip_overlay();
      }
      if config.assume_permissions_granted {
         gate.grant_all();
         gate.set_overlay_granted(true);
      }

      let slot = ServiceSlot::new();
      let is_connected = State::new(false);
      let is_remotely_connected = State::new(store.read(&keys::CROSS_DEVICE_IS_AVAILABLE));
      let cross_device_external = Arc::new(AtomicBool::new(false));

      let settings_listener = {
         let (reader, events) = (store.clone(), events.clone());
         let (remote, external) = (is_remotely_connected.clone(), cross_device_external.clone());
         store.subscribe(move |key| {
            if key == keys::CROSS_DEVICE_IS_AVAILABLE.key {
               let available = reader.read(&keys::CROSS_DEVICE_IS_AVAILABLE);
               remote.set(available || external.load(Ordering::Acquire));
            }
            events.emit(CompanionEvent::SettingChanged(key.into(), reader.get(key)));
         })
      };
      let service_listener = {
         let (events, connected) = (events.clone(), is_connected.clone());
         slot.state().subscribe(move |handle| match handle {
            Some(handle) => {
               connected.set(handle.0.is_connected_locally());
               events.emit(CompanionEvent::ServiceConnected);
            },
            None => {
               connected.set(false);
               events.emit(CompanionEvent::ServiceDisconnected);
            },
         })
      };

      let mut app = Self {
         theme: Theme::from_dark(config.dark_theme),
         config,
         store,
         hooks,
         events,
         gate,
         navigator: None,
         app_settings: None,
         slot,
         binder: None,
         service: None,
         is_connected,
         is_remotely_connected,
         cross_device_external,
         media: MediaPolicy::default(),
         host: ViewHost::new(),
         animating: false,
         subscriptions: vec![settings_listener, service_listener],
      };
      app.rebind_host();
      app
   }

   /// Attaches the service binder and enters the main content if the gate
   /// is already open.
   pub fn start(&mut self, binder: Box<dyn ServiceBinder>) -> Result<()> {
      self.binder = Some(binder);
      self.events.emit(CompanionEvent::GateChanged(self.gate.state()));
      self.unlock_if_ready()
   }

   pub fn config(&self) -> &Config {
      &self.config
   }

   pub fn store(&self) -> &PreferenceStore {
      &self.store
   }

   pub fn gate(&self) -> &PermissionGate {
      &self.gate
   }

   pub fn slot(&self) -> &ServiceSlot {
      &self.slot
   }

   pub fn service(&self) -> Option<ServiceHandle> {
      self.slot.handle()
   }

   pub fn is_connected(&self) -> bool {
      self.is_connected.get()
   }

   pub fn is_remotely_connected(&self) -> bool {
      self.is_remotely_connected.get()
   }

   pub fn current_route(&self) -> Option<NavRoute> {
      self.navigator.as_ref().map(Navigator::current)
   }

   pub fn set_theme(&mut self, theme: Theme) {
      if self.theme != theme {
         self.theme = theme;
         self.host.invalidate();
      }
   }

   fn emit(&self, event: CompanionEvent) {
      self.events.emit(event);
   }

   fn toast(&self, toast: Toast) {
      self.emit(CompanionEvent::Toast(toast));
   }

   fn rebind_host(&mut self) {
      self.host.unbind_all();
      self.host.bind_store(&self.store);
      self.host.bind(self.slot.state());
      self.host.bind(&self.is_connected);
      self.host.bind(&self.is_remotely_connected);
      if let Some(navigator) = &self.navigator {
         self.host.bind(navigator.route());
      }
      if let Some(screen) = &self.app_settings {
         screen.bind(&mut self.host);
      }
      self.host.invalidate();
   }

   fn unlock_if_ready(&mut self) -> Result<()> {
      if self.navigator.is_some() || !self.gate.is_unblocked() {
         return Ok(());
      }

      let start = if self.hooks.is_available() {
         nav::SETTINGS
      } else {
         nav::ONBOARDING
      };
      let navigator = Navigator::new(RouteTable::default(), start)?;
      let events = self.events.clone();
      self
         .subscriptions
         .push(navigator.route().subscribe(move |route| {
            events.emit(CompanionEvent::RouteChanged(route.path().into()));
         }));
      self.navigator = Some(navigator);
      info!("Permissions granted, starting at {start}");
      self.emit(CompanionEvent::RouteChanged(start.into()));

      self.bind_service();
      self.rebind_host();
      Ok(())
   }

   fn bind_service(&mut self) {
      if self.service.is_none()
         && let Some(binder) = self.binder.take()
      {
         self.service = Some(BoundService::new(binder, Arc::new(self.slot.clone())));
      }
      if let Some(service) = &mut self.service
         && let Err(e) = service.bind()
      {
         warn!("Failed to bind service: {e}");
      }
   }

   fn after_gate_change(&mut self, before: GateState) -> Result<()> {
      let state = self.gate.state();
      if state != before {
         self.emit(CompanionEvent::GateChanged(state));
      }
      self.host.invalidate();
      self.unlock_if_ready()
   }

   /// Records a grant callback for the permission named `name`.
   pub fn permission_result(&mut self, name: &str, granted: bool) -> Result<GateState> {
      let permission =
         Permission::from_str(name).map_err(|_| CompanionError::UnknownPermission(name.into()))?;
      let before = self.gate.state();
      self.gate.on_permission_result(permission, granted);
      self.after_gate_change(before)?;
      Ok(self.gate.state())
   }

   pub fn set_overlay_granted(&mut self, granted: bool) -> Result<()> {
      let before = self.gate.state();
      self.gate.set_overlay_granted(granted);
      self.after_gate_change(before)
   }

   /// Continues without the overlay permission and remembers the choice.
   pub fn skip_overlay(&mut self) -> Result<()> {
      self.store.write(&keys::OVERLAY_PERMISSION_SKIPPED, true)?;
      let before = self.gate.state();
      self.gate.skip_overlay();
      self.after_gate_change(before)
   }

   fn request_permissions(&mut self) -> Result<()> {
      let before = self.gate.state();
      self.gate.mark_requested();
      self.emit(CompanionEvent::PermissionsRequested(
         self.gate.required().to_vec(),
      ));
      self.after_gate_change(before)
   }

   /// Handles a deep link. Links for other schemes or hosts are ignored.
   pub fn handle_uri(&mut self, uri: &str) -> Result<()> {
      let Some(link) = magic_keys::parse_link(uri, &self.config.uri_scheme)? else {
         debug!("Ignoring link {uri}");
         return Ok(());
      };
      match magic_keys::import(&self.store, &link) {
         Ok(_) => {
            self.toast(Toast::short(MAGIC_KEYS_ADDED_TOAST));
            Ok(())
         },
         Err(e) => {
            warn!("Error processing magic keys: {e}");
            self.toast(Toast::long(format!("Error processing magic keys: {e}")));
            Err(e)
         },
      }
   }

   fn navigator_mut(&mut self) -> Result<&mut Navigator> {
      self.navigator.as_mut().ok_or(CompanionError::ContentLocked)
   }

   fn ensure_unlocked(&self) -> Result<()> {
      if self.navigator.is_none() || !self.gate.is_unblocked() {
         return Err(CompanionError::ContentLocked);
      }
      Ok(())
   }

   pub fn navigate(&mut self, route: &str, options: &NavOptions) -> Result<()> {
      self.ensure_unlocked()?;
      self.navigator_mut()?.navigate_with(route, options)?;
      self.sync_screens();
      Ok(())
   }

   pub fn back(&mut self) -> Result<bool> {
      self.ensure_unlocked()?;
      let popped = self.navigator_mut()?.pop_back();
      self.sync_screens();
      Ok(popped)
   }

   /// Mounts the settings screen while it is the current destination.
   fn sync_screens(&mut self) {
      let on_app_settings = self
         .current_route()
         .is_some_and(|r| r.name == nav::APP_SETTINGS);
      match (on_app_settings, self.app_settings.is_some()) {
         (true, false) => {
            self.app_settings = Some(AppSettingsScreen::mount(&self.store));
            self.rebind_host();
         },
         (false, true) => {
            self.app_settings = None;
            self.rebind_host();
         },
         _ => {},
      }
   }

   pub fn dispatch(&mut self, message: Message) -> Result<()> {
      debug!("Dispatching {message:?}");
      match message {
         Message::RequestPermissions => self.request_permissions(),
         Message::OpenOverlaySettings => {
            self.emit(CompanionEvent::OverlaySettingsRequested);
            Ok(())
         },
         Message::SkipOverlay => self.skip_overlay(),
         Message::Navigate { route } => self.navigate(&route, &NavOptions::default()),
         Message::Back => self.back().map(|_| ()),
         other => self.dispatch_to_screen(&other),
      }
   }

   fn dispatch_to_screen(&mut self, message: &Message) -> Result<()> {
      self.ensure_unlocked()?;
      let Some(screen) = self.app_settings.as_mut() else {
         return self.apply_to_store(message);
      };
      let effects = screen.update(message, &self.hooks)?;
      for effect in effects {
         match effect {
            Effect::Toast(toast) => self.toast(toast),
            Effect::Navigate { route, options } => self.navigate(&route, &options)?,
         }
      }
      Ok(())
   }

   /// Handles setting messages while no screen owning them is mounted.
   fn apply_to_store(&mut self, message: &Message) -> Result<()> {
      match message {
         Message::Toggle { key } => {
            let current = self.switch_value(key)?;
            self.write_switch(key, !current)
         },
         Message::SetToggle { key, value } => self.write_switch(key, *value),
         Message::SetSlider { key, value } if key == keys::CONVERSATIONAL_AWARENESS_VOLUME.key => {
            let value = keys::clamp_volume(*value);
            self.store.write(&keys::CONVERSATIONAL_AWARENESS_VOLUME, value)
         },
         Message::SetSlider { key, .. } => Err(CompanionError::UnknownSetting(key.to_string())),
         other => {
            debug!("No mounted screen handles {other:?}");
            Ok(())
         },
      }
   }

   fn switch_value(&self, key: &str) -> Result<bool> {
      if key == keys::QS_CLICK_BEHAVIOR.key {
         return Ok(self.store.read(&keys::QS_CLICK_BEHAVIOR) == QsClickBehavior::Dialog);
      }
      match self.setting(key)? {
         PrefValue::Bool(value) => Ok(value),
         _ => Err(CompanionError::InvalidSettingValue {
            key: key.to_string(),
            reason: "not a switch".to_string(),
         }),
      }
   }

   fn write_switch(&mut self, key: &str, value: bool) -> Result<()> {
      let value = if key == keys::QS_CLICK_BEHAVIOR.key {
         let behavior = if value {
            QsClickBehavior::Dialog
         } else {
            QsClickBehavior::Cycle
         };
         serde_json::Value::from(<&'static str>::from(behavior))
      } else {
         serde_json::Value::Bool(value)
      };
      self.set_setting(key, &value)
   }

   /// Effective value of a known setting, falling back to its default.
   pub fn setting(&self, key: &str) -> Result<PrefValue> {
      let default =
         keys::default_value(key).ok_or_else(|| CompanionError::UnknownSetting(key.into()))?;
      Ok(self.store.get(key).unwrap_or(default))
   }

   /// Validates and stores an externally supplied value.
   pub fn set_setting(&mut self, key: &str, value: &serde_json::Value) -> Result<()> {
      let value = keys::coerce_value(key, value)?;
      let skip_overlay = key == keys::OVERLAY_PERMISSION_SKIPPED.key && value == PrefValue::Bool(true);
      self.store.edit().put(key, value).commit()?;
      if skip_overlay {
         let before = self.gate.state();
         self.gate.skip_overlay();
         self.after_gate_change(before)?;
      }
      Ok(())
   }

   pub fn view(&mut self) -> Node {
      let Self {
         host,
         gate,
         navigator,
         app_settings,
         theme,
         hooks,
         slot,
         store,
         is_connected,
         is_remotely_connected,
         ..
      } = self;
      host
         .render(|| {
            let route = match navigator {
               Some(navigator) if gate.is_unblocked() => navigator.current(),
               _ => return permissions::view(gate),
            };
            match route.name.as_str() {
               nav::SETTINGS => {
                  let service = slot.handle();
                  let stored_name = store.read(&keys::NAME);
                  device::view(DeviceViewModel {
                     service: service.as_ref(),
                     stored_name: &stored_name,
                     connected: is_connected.get(),
                     remotely_connected: is_remotely_connected.get(),
                  })
               },
               nav::APP_SETTINGS => match app_settings {
                  Some(screen) => screen.view(*theme),
                  None => screens::placeholder(&route),
               },
               nav::ONBOARDING => onboarding::view(hooks.load()),
               _ => screens::placeholder(&route),
            }
         })
         .clone()
   }

   /// Steps animations. Returns whether another frame is needed.
   pub fn advance(&mut self, elapsed: Duration) -> bool {
      let animating = self
         .app_settings
         .as_mut()
         .is_some_and(|screen| screen.advance(elapsed));
      if animating || self.animating {
         self.host.invalidate();
      }
      self.animating = animating;
      animating
   }

   fn refresh_remote(&self) {
      let available = self.store.read(&keys::CROSS_DEVICE_IS_AVAILABLE)
         || self.cross_device_external.load(Ordering::Acquire);
      self.is_remotely_connected.set(available);
   }

   fn emit_media(&self, action: MediaAction) {
      if action != MediaAction::Disconnect {
         self.emit(CompanionEvent::Media(action));
         return;
      }
      match self.slot.handle().and_then(|h| h.device()) {
         Some(device) => self.emit(CompanionEvent::DisconnectDevice(device.address)),
         None => debug!("No device to disconnect"),
      }
   }

   pub fn on_broadcast(&mut self, broadcast: DeviceBroadcast) {
      match broadcast {
         DeviceBroadcast::ConnectionStatus(connected) => {
            self.is_connected.set(connected);
         },
         DeviceBroadcast::EarDetection(status) => {
            let disconnect = self.store.read(&keys::DISCONNECT_WHEN_NOT_WEARING);
            for action in self.media.on_ear_detection(status, disconnect) {
               self.emit_media(action);
            }
         },
         DeviceBroadcast::Conversation(speaking) => {
            let settings = AwarenessSettings::load(&self.store);
            for action in self.media.on_conversation(speaking, settings) {
               self.emit_media(action);
            }
         },
         DeviceBroadcast::CrossDeviceAvailable(available) => {
            self.cross_device_external.store(available, Ordering::Release);
            self.refresh_remote();
         },
      }
   }

   /// Handles every queued broadcast. Returns how many were handled.
   pub fn pump_broadcasts(&mut self) -> usize {
      let pending = self.slot.drain();
      let count = pending.len();
      for broadcast in pending {
         self.on_broadcast(broadcast);
      }
      count
   }

   /// Rebinds the service after [`App::on_stop`].
   pub fn on_start(&mut self) {
      if self.navigator.is_some() {
         self.bind_service();
      }
   }

   /// Releases the service binding. Failures are logged.
   pub fn on_stop(&mut self) {
      if let Some(service) = &mut self.service {
         let failures = service.teardown();
         if failures > 0 {
            warn!("Service teardown finished with {failures} failure(s)");
         }
      }
      self.slot.clear();
   }

   pub fn on_destroy(&mut self) {
      self.on_stop();
      self.service = None;
      self.app_settings = None;
      self.subscriptions.clear();
      self.host.unbind_all();
      self.emit(CompanionEvent::DisconnectReceivers);
      info!("Companion destroyed");
   }
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;

   use super::*;
   use crate::{
      event::testing::EventLog,
      hook::HookOffset,
      media::EarDetectionStatus,
      screens::app_settings,
      service::testing::{BinderLog, Call, FakeBinder, FakeService, device},
   };

   struct Fixture {
      _dir: tempfile::TempDir,
      app: App,
      events: Arc<EventLog>,
      binder: Arc<BinderLog>,
      store: PreferenceStore,
      hooks: HookOffsetStore,
   }

   fn fixture(assume_granted: bool, with_hook: bool) -> Fixture {
      let dir = tempfile::tempdir().unwrap();
      let store = PreferenceStore::open(dir.path().join("settings.json")).unwrap();
      let hooks = HookOffsetStore::new(dir.path().join("hook_offset"));
      if with_hook {
         hooks.save(HookOffset(0x1234)).unwrap();
      }
      let events = EventLog::new();
      let config = Config {
         assume_permissions_granted: assume_granted,
         ..Config::default()
      };
      let mut app = App::new(config, store.clone(), hooks.clone(), events.clone());
      let (binder_box, binder) = FakeBinder::pair();
      app.start(binder_box).unwrap();
      Fixture {
         _dir: dir,
         app,
         events,
         binder,
         store,
         hooks,
      }
   }

   fn grant_all(app: &mut App) {
      for p in app.gate().required().to_vec() {
         app.permission_result(p.name(), true).unwrap();
      }
   }

   fn navigate(app: &mut App, route: &str) {
      app.dispatch(Message::Navigate {
         route: route.into(),
      })
      .unwrap();
   }

   #[test]
   fn test_locked_until_permissions_and_overlay() {
      let mut f = fixture(false, true);
      assert_eq!(f.app.view().title(), Some(permissions::TITLE));
      assert!(matches!(
         f.app.dispatch(Message::Navigate {
            route: "app_settings".into()
         }),
         Err(CompanionError::ContentLocked)
      ));
      assert!(f.binder.calls().is_empty());

      f.app.dispatch(Message::RequestPermissions).unwrap();
      assert!(f.events.take().iter().any(|e| matches!(
         e,
         CompanionEvent::PermissionsRequested(list) if list.len() == 8
      )));

      grant_all(&mut f.app);
      assert_eq!(f.app.gate().state(), GateState::FullyGranted);
      assert!(f.app.current_route().is_none());
      assert!(
         f.app
            .view()
            .find_button(permissions::SKIP_OVERLAY_LABEL)
            .is_some()
      );

      f.app.dispatch(Message::SkipOverlay).unwrap();
      assert!(f.store.read(&keys::OVERLAY_PERMISSION_SKIPPED));
      assert_eq!(f.app.current_route().unwrap().name, nav::SETTINGS);
      assert_eq!(f.binder.calls(), [Call::Bind, Call::Register]);
      assert!(
         f.events
            .take()
            .contains(&CompanionEvent::GateChanged(GateState::FullyGranted))
      );
   }

   #[test]
   fn test_unknown_permission() {
      let mut f = fixture(false, true);
      assert!(matches!(
         f.app.permission_result("android.permission.CAMERA", true),
         Err(CompanionError::UnknownPermission(_))
      ));
   }

   #[test]
   fn test_skipped_overlay_remembered() {
      let mut f = fixture(false, true);
      grant_all(&mut f.app);
      f.app.skip_overlay().unwrap();

      let mut app = App::new(
         Config {
            assume_permissions_granted: false,
            ..Config::default()
         },
         f.store.clone(),
         f.hooks.clone(),
         EventLog::new(),
      );
      let (binder, _log) = FakeBinder::pair();
      app.start(binder).unwrap();
      assert!(app.current_route().is_none());
      grant_all(&mut app);
      assert_eq!(app.current_route().unwrap().name, nav::SETTINGS);
   }

   #[test]
   fn test_overlay_grant_unlocks() {
      let mut f = fixture(false, false);
      grant_all(&mut f.app);
      f.app.set_overlay_granted(true).unwrap();
      assert_eq!(f.app.current_route().unwrap().name, nav::ONBOARDING);
      assert_eq!(f.app.view().title(), Some(onboarding::TITLE));
   }

   #[test]
   fn test_start_destination_follows_hook() {
      let f = fixture(true, true);
      assert_eq!(f.app.current_route().unwrap().name, nav::SETTINGS);
      let f = fixture(true, false);
      assert_eq!(f.app.current_route().unwrap().name, nav::ONBOARDING);
   }

   #[test]
   fn test_settings_roundtrip_through_screen() {
      let mut f = fixture(true, true);
      navigate(&mut f.app, "app_settings");
      assert_eq!(f.app.view().title(), Some(app_settings::TITLE));

      let key = keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key;
      f.app
         .dispatch(Message::Toggle { key: key.into() })
         .unwrap();
      assert!(f.store.read(&keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC));
      assert!(f.app.view().find_switch(key).unwrap().checked);
      assert!(f.events.take().contains(&CompanionEvent::SettingChanged(
         key.into(),
         Some(PrefValue::Bool(true))
      )));

      f.app
         .dispatch(Message::SetSlider {
            key: keys::CONVERSATIONAL_AWARENESS_VOLUME.key.into(),
            value: 200.0,
         })
         .unwrap();
      assert_eq!(f.app.setting("conversational_awareness_volume").unwrap(), PrefValue::Int(85));

      f.app.dispatch(Message::Back).unwrap();
      assert_eq!(f.app.current_route().unwrap().name, nav::SETTINGS);
      f.app.dispatch(Message::Back).unwrap();
      assert_eq!(f.app.current_route().unwrap().name, nav::SETTINGS);
   }

   #[test]
   fn test_setting_messages_persist_without_screen() {
      let mut f = fixture(true, true);
      assert_eq!(f.app.current_route().unwrap().name, nav::SETTINGS);

      let key = keys::DISCONNECT_WHEN_NOT_WEARING.key;
      f.app
         .dispatch(Message::Toggle { key: key.into() })
         .unwrap();
      assert!(f.store.read(&keys::DISCONNECT_WHEN_NOT_WEARING));
      f.app
         .dispatch(Message::SetToggle {
            key: key.into(),
            value: false,
         })
         .unwrap();
      assert!(!f.store.read(&keys::DISCONNECT_WHEN_NOT_WEARING));

      f.app
         .dispatch(Message::SetToggle {
            key: keys::QS_CLICK_BEHAVIOR.key.into(),
            value: false,
         })
         .unwrap();
      assert_eq!(f.store.get_string("qs_click_behavior", ""), "cycle");
      f.app
         .dispatch(Message::Toggle {
            key: keys::QS_CLICK_BEHAVIOR.key.into(),
         })
         .unwrap();
      assert_eq!(f.store.read(&keys::QS_CLICK_BEHAVIOR), QsClickBehavior::Dialog);

      f.app
         .dispatch(Message::SetSlider {
            key: keys::CONVERSATIONAL_AWARENESS_VOLUME.key.into(),
            value: 3.0,
         })
         .unwrap();
      assert_eq!(f.store.read(&keys::CONVERSATIONAL_AWARENESS_VOLUME), 10);

      assert!(matches!(
         f.app.dispatch(Message::Toggle { key: "bogus".into() }),
         Err(CompanionError::UnknownSetting(_))
      ));
      assert!(matches!(
         f.app.dispatch(Message::Toggle {
            key: keys::NAME.key.into()
         }),
         Err(CompanionError::InvalidSettingValue { .. })
      ));
   }

   #[test]
   fn test_reset_hook_offset_redirects() {
      let mut f = fixture(true, true);
      navigate(&mut f.app, "app_settings");
      f.app.dispatch(Message::ShowResetDialog).unwrap();
      assert!(f.app.view().contains_text(app_settings::RESET_DIALOG_TEXT));
      f.app.dispatch(Message::ConfirmResetHookOffset).unwrap();

      assert!(!f.hooks.is_available());
      assert_eq!(
         f.events.toasts(),
         [Toast::long(app_settings::RESET_DONE_TOAST)]
      );
      assert_eq!(f.app.current_route().unwrap().name, nav::ONBOARDING);
      assert!(!f.app.back().unwrap());
      assert!(
         f.events
            .take()
            .contains(&CompanionEvent::RouteChanged("onboarding".into()))
      );
   }

   #[test]
   fn test_magic_keys_link() {
      let mut f = fixture(true, true);
      f.app
         .handle_uri(
            "librepods://add-magic-keys?irk=00112233445566778899aabbccddeeff&enc_key=FFEEDDCCBBAA99887766554433221100",
         )
         .unwrap();
      assert_eq!(f.events.toasts(), [Toast::short(MAGIC_KEYS_ADDED_TOAST)]);
      assert!(!f.store.read(&keys::IRK).is_empty());

      f.events.take();
      assert!(f.app.handle_uri("librepods://add-magic-keys?irk=abc").is_err());
      let toasts = f.events.toasts();
      assert_eq!(toasts.len(), 1);
      assert!(toasts[0].text.starts_with("Error processing magic keys: "));

      f.events.take();
      f.app.handle_uri("https://example.com/add-magic-keys").unwrap();
      assert!(f.events.toasts().is_empty());
   }

   #[test]
   fn test_service_connection_and_broadcasts() {
      let mut f = fixture(true, true);
      let connection = f.binder.connection().unwrap();
      connection.on_service_connected(Arc::new(FakeService(Some(device("Pods", true)))));
      assert!(f.app.is_connected());
      assert!(f.app.view().contains_text("Connected"));

      f.store
         .set_bool(keys::DISCONNECT_WHEN_NOT_WEARING.key, true)
         .unwrap();
      f.events.take();
      connection.on_broadcast(DeviceBroadcast::EarDetection(EarDetectionStatus::new(true, true)));
      connection.on_broadcast(DeviceBroadcast::EarDetection(EarDetectionStatus::new(false, false)));
      assert_eq!(f.app.pump_broadcasts(), 2);
      let events = f.events.take();
      assert!(events.contains(&CompanionEvent::Media(MediaAction::Pause)));
      assert!(events.contains(&CompanionEvent::DisconnectDevice("AA:BB:CC:DD:EE:FF".into())));

      connection.on_broadcast(DeviceBroadcast::Conversation(true));
      connection.on_broadcast(DeviceBroadcast::ConnectionStatus(false));
      f.app.pump_broadcasts();
      assert!(f.events.take().contains(&CompanionEvent::Media(
         MediaAction::LowerVolume {
            percent: 43,
            relative: true
         }
      )));
      assert!(!f.app.is_connected());
   }

   #[test]
   fn test_cross_device_availability() {
      let mut f = fixture(true, true);
      assert!(!f.app.is_remotely_connected());
      f.store
         .set_bool(keys::CROSS_DEVICE_IS_AVAILABLE.key, true)
         .unwrap();
      assert!(f.app.is_remotely_connected());
      f.store
         .set_bool(keys::CROSS_DEVICE_IS_AVAILABLE.key, false)
         .unwrap();
      assert!(!f.app.is_remotely_connected());

      f.app
         .on_broadcast(DeviceBroadcast::CrossDeviceAvailable(true));
      assert!(f.app.is_remotely_connected());
   }

   #[test]
   fn test_external_setting_updates() {
      let mut f = fixture(true, true);
      f.app
         .set_setting("conversational_awareness_volume", &serde_json::json!(3))
         .unwrap();
      assert_eq!(f.store.read(&keys::CONVERSATIONAL_AWARENESS_VOLUME), 10);
      assert!(matches!(
         f.app.set_setting("bogus", &serde_json::json!(true)),
         Err(CompanionError::UnknownSetting(_))
      ));
      assert_eq!(f.app.setting("qs_click_behavior").unwrap(), PrefValue::from("dialog"));
      assert!(f.app.setting("bogus").is_err());
   }

   #[test]
   fn test_stop_and_destroy() {
      let mut f = fixture(true, true);
      let connection = f.binder.connection().unwrap();
      connection.on_service_connected(Arc::new(FakeService(None)));
      f.events.take();

      f.app.on_stop();
      assert!(f.app.service().is_none());
      assert_eq!(
         f.binder.calls(),
         [Call::Bind, Call::Register, Call::Unbind, Call::Unregister]
      );

      f.app.on_start();
      assert_eq!(f.binder.calls().len(), 6);

      f.app.on_destroy();
      assert_eq!(f.binder.calls().len(), 8);
      assert_eq!(f.store.listener_count(), 0);
      assert_eq!(f.events.take().last(), Some(&CompanionEvent::DisconnectReceivers));
   }

   #[test]
   fn test_view_cached_between_changes() {
      let mut f = fixture(true, true);
      f.app.view();
      let renders = f.app.host.render_count();
      f.app.view();
      assert_eq!(f.app.host.render_count(), renders);
      navigate(&mut f.app, "debug");
      assert_eq!(f.app.view().title(), Some("Debug"));
      assert_eq!(f.app.host.render_count(), renders + 1);
   }
}
