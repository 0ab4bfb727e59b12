//! kAirPods companion D-Bus service
//!
//! Hosts the settings, onboarding and permission state of the companion
//! UI on the session bus and forwards state changes to front-ends as
//! signals.

use std::{sync::Arc, time::Duration};

use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::{runtime::Handle, signal, sync::Notify, time};
use zbus::{Connection, connection, object_server::InterfaceRef};

use kairpods_companion::{
   app::App,
   config::Config,
   dbus::{CompanionService, CompanionServiceSignals},
   error::Result,
   event::{CompanionEvent, EventBus, Toast, ToastDuration},
   hook::HookOffsetStore,
   media::MprisController,
   prefs::store::PreferenceStore,
   remote::{self, DbusServiceBinder},
};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting kAirPods companion service...");

   let config = Config::load()?;
   let store = PreferenceStore::open(Config::settings_path()?)?;
   let hooks = HookOffsetStore::new(Config::hook_offset_path()?);
   info!(
      "Loaded settings from {}, hook offset {}",
      Config::settings_path()?.display(),
      if hooks.is_available() { "present" } else { "missing" }
   );

   let event_bus = EventProcessor::new(config.clone());

   let app = Arc::new(Mutex::new(App::new(
      config.clone(),
      store,
      hooks,
      event_bus.clone(),
   )));
   let service = CompanionService::new(app.clone());

   let connection = connection::Builder::session()?
      .name(config.bus_name.as_str())?
      .serve_at(config.object_path.as_str(), service)?
      .build()
      .await?;

   info!("Companion service started at {}", config.bus_name);

   event_bus.spawn_dispatcher(connection.clone()).await?;

   app.lock().start(Box::new(DbusServiceBinder::new(
      connection,
      Handle::current(),
      config.service_name.as_str(),
      config.service_path.as_str(),
   )))?;

   spawn_broadcast_pump(&app);

   signal::ctrl_c().await?;
   info!("Shutting down companion service...");
   app.lock().on_destroy();

   Ok(())
}

/// Feeds device broadcasts queued by the service binder into the app.
fn spawn_broadcast_pump(app: &Arc<Mutex<App>>) {
   let wake = app.lock().slot().wake();
   let app = Arc::downgrade(app);
   tokio::spawn(async move {
      loop {
         wake.notified().await;
         let Some(app) = app.upgrade() else {
            break;
         };
         let handled = app.lock().pump_broadcasts();
         debug!("Handled {handled} broadcast(s)");
      }
   });
}

struct EventProcessor {
   config: Config,
   queue: SegQueue<CompanionEvent>,
   notifier: Notify,
}

impl EventProcessor {
   fn new(config: Config) -> Arc<Self> {
      Arc::new(Self {
         config,
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }
}

impl EventProcessor {
   async fn recv(self: &Arc<Self>) -> Option<CompanionEvent> {
      loop {
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         let notify = self.notifier.notified();
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(Duration::from_secs(1), notify).await;
      }
   }

   async fn dispatch(
      &self,
      iface: &InterfaceRef<CompanionService>,
      media: &MprisController,
      connection: &Connection,
      event: CompanionEvent,
   ) -> Result<()> {
      match event {
         CompanionEvent::SettingChanged(key, value) => {
            let value = serde_json::to_string(&value)?;
            iface.setting_changed(&key, &value).await?;
         },
         CompanionEvent::RouteChanged(route) => {
            iface.route_changed(&route).await?;
         },
         CompanionEvent::GateChanged(state) => {
            iface.gate_changed(&state.to_string()).await?;
         },
         CompanionEvent::Toast(toast) => {
            iface
               .toast(&toast.text, toast.duration == ToastDuration::Long)
               .await?;
            tokio::task::spawn_blocking(move || desktop_notification(&toast));
         },
         CompanionEvent::ServiceConnected => {
            iface.service_connection_changed(true).await?;
         },
         CompanionEvent::ServiceDisconnected => {
            iface.service_connection_changed(false).await?;
         },
         CompanionEvent::Media(action) => {
            media.apply(action).await?;
         },
         CompanionEvent::DisconnectDevice(address) => {
            let done = remote::disconnect_device(
               connection,
               &self.config.service_name,
               &self.config.service_path,
               &address,
            )
            .await?;
            if !done {
               warn!("Service refused to disconnect {address}");
            }
         },
         CompanionEvent::PermissionsRequested(permissions) => {
            let names = permissions.iter().map(|p| p.name().to_owned()).collect();
            iface.permissions_requested(names).await?;
         },
         CompanionEvent::OverlaySettingsRequested => {
            iface.overlay_settings_requested().await?;
         },
         CompanionEvent::DisconnectReceivers => {
            iface.disconnect_receivers().await?;
         },
      }
      Ok(())
   }

   async fn spawn_dispatcher(self: Arc<Self>, connection: Connection) -> Result<()> {
      let iface = connection
         .object_server()
         .interface::<_, CompanionService>(self.config.object_path.as_str())
         .await?;
      let media = MprisController::new(connection.clone());
      tokio::spawn(async move {
         while let Some(event) = self.recv().await {
            if let Err(e) = self.dispatch(&iface, &media, &connection, event).await {
               warn!("Error dispatching event: {e}");
            }
         }
      });

      Ok(())
   }
}

impl EventBus for EventProcessor {
   fn emit(&self, event: CompanionEvent) {
      self.queue.push(event);
      self.notifier.notify_waiters();
   }
}

fn desktop_notification(toast: &Toast) {
   let timeout = toast.duration.as_duration().as_millis();
   match notify_rust::Notification::new()
      .summary("kAirPods")
      .body(&toast.text)
      .icon("audio-headphones")
      .timeout(i32::try_from(timeout).unwrap_or(i32::MAX))
      .show()
   {
      Ok(_) => {},
      Err(e) => warn!("Failed to send notification: {e}"),
   }
}
