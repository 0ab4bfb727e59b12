//! Binding to the kAirPods daemon over the session bus.
//!
//! The daemon counts as bound while its well-known name has an owner.
//! Device signals are translated into [`DeviceBroadcast`]s while the
//! receiver is registered.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::{runtime::Handle, task::JoinHandle};
use zbus::{Connection, fdo::DBusProxy, names::BusName, proxy};

use crate::{
   error::{CompanionError, Result},
   media::EarDetectionStatus,
   service::{AirPodsService, DeviceBroadcast, DeviceInfo, ServiceBinder, ServiceConnection},
};

#[proxy(
   interface = "org.kde.plasma.airpods",
   default_service = "org.kairpods",
   default_path = "/org/kairpods/manager"
)]
pub trait AirPodsManager {
   fn get_devices(&self) -> zbus::Result<String>;

   fn disconnect_device(&self, address: &str) -> zbus::Result<bool>;

   #[zbus(signal)]
   fn device_connected(&self, address: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   fn device_disconnected(&self, address: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   fn ear_detection_changed(&self, address: &str, ear_detection: &str) -> zbus::Result<()>;
}

async fn manager_proxy(
   connection: &Connection,
   name: &str,
   path: &str,
) -> Result<AirPodsManagerProxy<'static>> {
   Ok(AirPodsManagerProxy::builder(connection)
      .destination(name.to_string())?
      .path(path.to_string())?
      .build()
      .await?)
}

/// Snapshot of the daemon's devices, refreshed on device signals.
#[derive(Debug, Default)]
pub struct RemoteAirPods {
   devices: RwLock<Vec<DeviceInfo>>,
}

impl RemoteAirPods {
   pub fn from_json(json: &str) -> Result<Self> {
      Ok(Self {
         devices: RwLock::new(serde_json::from_str(json)?),
      })
   }

   pub async fn fetch(proxy: &AirPodsManagerProxy<'_>) -> Result<Self> {
      Self::from_json(&proxy.get_devices().await?)
   }

   pub fn set_connected(&self, address: &str, connected: bool) {
      if let Some(device) = self.devices.write().iter_mut().find(|d| d.address == address) {
         device.connected = connected;
      }
   }
}

impl AirPodsService for RemoteAirPods {
   /// The first connected device, else the first known one.
   fn device(&self) -> Option<DeviceInfo> {
      let devices = self.devices.read();
      devices
         .iter()
         .find(|d| d.connected)
         .or_else(|| devices.first())
         .cloned()
   }
}

/// Disconnects `address` through the daemon.
pub async fn disconnect_device(
   connection: &Connection,
   name: &str,
   path: &str,
   address: &str,
) -> Result<bool> {
   let proxy = manager_proxy(connection, name, path).await?;
   Ok(proxy.disconnect_device(address).await?)
}

pub struct DbusServiceBinder {
   connection: Connection,
   runtime: Handle,
   service_name: String,
   service_path: String,
   remote: Arc<RwLock<Option<Arc<RemoteAirPods>>>>,
   watch: Option<JoinHandle<()>>,
   receiver: Option<JoinHandle<()>>,
}

impl DbusServiceBinder {
   pub fn new(
      connection: Connection,
      runtime: Handle,
      service_name: impl Into<String>,
      service_path: impl Into<String>,
   ) -> Self {
      Self {
         connection,
         runtime,
         service_name: service_name.into(),
         service_path: service_path.into(),
         remote: Arc::default(),
         watch: None,
         receiver: None,
      }
   }
}

impl ServiceBinder for DbusServiceBinder {
   fn bind(&mut self, connection: Arc<dyn ServiceConnection>) -> Result<()> {
      if self.watch.is_some() {
         return Ok(());
      }
      let watcher = OwnerWatcher {
         connection: self.connection.clone(),
         name: self.service_name.clone(),
         path: self.service_path.clone(),
         remote: self.remote.clone(),
         sink: connection,
      };
      self.watch = Some(self.runtime.spawn(async move {
         if let Err(e) = watcher.run().await {
            warn!("Service watch for {} ended: {e}", watcher.name);
         }
      }));
      Ok(())
   }

   fn unbind(&mut self) -> Result<()> {
      let task = self.watch.take().ok_or(CompanionError::ServiceNotBound)?;
      task.abort();
      *self.remote.write() = None;
      info!("Unbound {}", self.service_name);
      Ok(())
   }

   fn register_receiver(&mut self, connection: Arc<dyn ServiceConnection>) -> Result<()> {
      if self.receiver.is_some() {
         return Ok(());
      }
      let conn = self.connection.clone();
      let (name, path) = (self.service_name.clone(), self.service_path.clone());
      let remote = self.remote.clone();
      self.receiver = Some(self.runtime.spawn(async move {
         if let Err(e) = receive_broadcasts(&conn, &name, &path, &remote, &*connection).await {
            warn!("Broadcast receiver ended: {e}");
         }
      }));
      Ok(())
   }

   fn unregister_receiver(&mut self) -> Result<()> {
      let task = self.receiver.take().ok_or(CompanionError::ReceiverNotRegistered)?;
      task.abort();
      Ok(())
   }
}

impl Drop for DbusServiceBinder {
   fn drop(&mut self) {
      for task in [self.watch.take(), self.receiver.take()].into_iter().flatten() {
         task.abort();
      }
   }
}

struct OwnerWatcher {
   connection: Connection,
   name: String,
   path: String,
   remote: Arc<RwLock<Option<Arc<RemoteAirPods>>>>,
   sink: Arc<dyn ServiceConnection>,
}

impl OwnerWatcher {
   async fn run(&self) -> Result<()> {
      let dbus = DBusProxy::new(&self.connection).await?;
      let mut changes = dbus
         .receive_name_owner_changed_with_args(&[(0, self.name.as_str())])
         .await?;

      let bus_name = BusName::try_from(self.name.as_str()).map_err(zbus::Error::from)?;
      if dbus.name_has_owner(bus_name).await? {
         self.connect().await;
      } else {
         info!("Waiting for {} to appear", self.name);
      }

      while let Some(signal) = changes.next().await {
         let Some(args) = signal_args(signal.args(), "NameOwnerChanged") else {
            continue;
         };
         if args.new_owner().is_some() {
            self.connect().await;
         } else {
            *self.remote.write() = None;
            self.sink.on_service_disconnected();
         }
      }
      Ok(())
   }

   async fn connect(&self) {
      let remote = match manager_proxy(&self.connection, &self.name, &self.path).await {
         Ok(proxy) => RemoteAirPods::fetch(&proxy).await,
         Err(e) => Err(e),
      };
      match remote {
         Ok(remote) => {
            let remote = Arc::new(remote);
            *self.remote.write() = Some(remote.clone());
            self.sink.on_service_connected(remote);
         },
         Err(e) => warn!("Failed to connect to {}: {e}", self.name),
      }
   }
}

async fn receive_broadcasts(
   connection: &Connection,
   name: &str,
   path: &str,
   remote: &RwLock<Option<Arc<RemoteAirPods>>>,
   sink: &dyn ServiceConnection,
) -> Result<()> {
   let proxy = manager_proxy(connection, name, path).await?;
   let mut connected = proxy.receive_device_connected().await?;
   let mut disconnected = proxy.receive_device_disconnected().await?;
   let mut ear_detection = proxy.receive_ear_detection_changed().await?;

   loop {
      tokio::select! {
         Some(signal) = connected.next() => {
            if let Some(args) = signal_args(signal.args(), "DeviceConnected") {
               on_connection_signal(remote, sink, args.address(), true);
            }
         },
         Some(signal) = disconnected.next() => {
            if let Some(args) = signal_args(signal.args(), "DeviceDisconnected") {
               on_connection_signal(remote, sink, args.address(), false);
            }
         },
         Some(signal) = ear_detection.next() => {
            if let Some(args) = signal_args(signal.args(), "EarDetectionChanged") {
               on_ear_detection_signal(sink, args.ear_detection());
            }
         },
         else => break,
      }
   }
   Ok(())
}

/// A malformed signal is logged and skipped; the stream stays alive.
fn signal_args<T>(args: zbus::Result<T>, signal: &str) -> Option<T> {
   args
      .map_err(|e| warn!("Skipping malformed {signal} signal: {e}"))
      .ok()
}

fn on_connection_signal(
   remote: &RwLock<Option<Arc<RemoteAirPods>>>,
   sink: &dyn ServiceConnection,
   address: &str,
   connected: bool,
) {
   if let Some(remote) = remote.read().as_ref() {
      remote.set_connected(address, connected);
   }
   sink.on_broadcast(DeviceBroadcast::ConnectionStatus(connected));
}

fn on_ear_detection_signal(sink: &dyn ServiceConnection, payload: &str) {
   match EarDetectionStatus::from_json(payload) {
      Ok(status) => sink.on_broadcast(DeviceBroadcast::EarDetection(status)),
      Err(e) => debug!("Ignoring ear detection payload: {e}"),
   }
}
