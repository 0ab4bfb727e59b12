//! Binding to the `AirPods` background service.
//!
//! A [`ServiceBinder`] connects to the service and delivers callbacks to a
//! [`ServiceConnection`]. [`BoundService`] owns one binding and releases it
//! exactly once, logging rather than propagating teardown failures.

use std::sync::Arc;

use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::Notify;

use crate::{error::Result, media::EarDetectionStatus, ui::state::State};

/// Snapshot of a device known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
   pub address: SmolStr,
   pub name: SmolStr,
   #[serde(default)]
   pub connected: bool,
}

/// Handle to a connected service.
pub trait AirPodsService: Send + Sync {
   /// The device the service is managing, if any.
   fn device(&self) -> Option<DeviceInfo>;

   fn is_connected_locally(&self) -> bool {
      self.device().is_some_and(|d| d.connected)
   }
}

pub type ServiceHandle = Arc<dyn AirPodsService>;

/// Broadcasts delivered while a receiver is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBroadcast {
   ConnectionStatus(bool),
   EarDetection(EarDetectionStatus),
   /// Whether the user is speaking.
   Conversation(bool),
   CrossDeviceAvailable(bool),
}

pub trait ServiceConnection: Send + Sync {
   fn on_service_connected(&self, handle: ServiceHandle);
   fn on_service_disconnected(&self);
   fn on_broadcast(&self, broadcast: DeviceBroadcast);
}

pub trait ServiceBinder: Send {
   fn bind(&mut self, connection: Arc<dyn ServiceConnection>) -> Result<()>;
   fn unbind(&mut self) -> Result<()>;
   fn register_receiver(&mut self, connection: Arc<dyn ServiceConnection>) -> Result<()>;
   fn unregister_receiver(&mut self) -> Result<()>;
}

/// Service handle compared by identity.
#[derive(Clone)]
pub struct HandleRef(pub ServiceHandle);

impl PartialEq for HandleRef {
   fn eq(&self, other: &Self) -> bool {
      Arc::ptr_eq(&self.0, &other.0)
   }
}

impl std::fmt::Debug for HandleRef {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_tuple("HandleRef").field(&self.0.device()).finish()
   }
}

/// Holds the current service handle and queues broadcasts for the owner.
///
/// Callbacks may arrive on any thread; broadcasts are drained on the
/// owner's side with [`ServiceSlot::drain`].
#[derive(Clone, Default)]
pub struct ServiceSlot {
   handle: State<Option<HandleRef>>,
   broadcasts: Arc<SegQueue<DeviceBroadcast>>,
   wake: Arc<Notify>,
}

impl ServiceSlot {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn handle(&self) -> Option<ServiceHandle> {
      self.handle.get().map(|h| h.0)
   }

   pub fn state(&self) -> &State<Option<HandleRef>> {
      &self.handle
   }

   pub fn clear(&self) {
      self.handle.set(None);
   }

   pub fn drain(&self) -> Vec<DeviceBroadcast> {
      std::iter::from_fn(|| self.broadcasts.pop()).collect()
   }

   /// Signalled after each queued broadcast.
   pub fn wake(&self) -> Arc<Notify> {
      self.wake.clone()
   }
}

impl ServiceConnection for ServiceSlot {
   fn on_service_connected(&self, handle: ServiceHandle) {
      info!("Service connected");
      self.handle.set(Some(HandleRef(handle)));
   }

   fn on_service_disconnected(&self) {
      info!("Service disconnected");
      self.handle.set(None);
   }

   fn on_broadcast(&self, broadcast: DeviceBroadcast) {
      debug!("Broadcast: {broadcast:?}");
      self.broadcasts.push(broadcast);
      self.wake.notify_one();
   }
}

/// An owned binding. Torn down once, on request or on drop.
pub struct BoundService {
   binder: Box<dyn ServiceBinder>,
   connection: Arc<dyn ServiceConnection>,
   bound: bool,
   receiver: bool,
}

impl BoundService {
   pub fn new(binder: Box<dyn ServiceBinder>, connection: Arc<dyn ServiceConnection>) -> Self {
      Self {
         binder,
         connection,
         bound: false,
         receiver: false,
      }
   }

   /// Binds the service and registers the broadcast receiver.
   pub fn bind(&mut self) -> Result<()> {
      if !self.bound {
         self.binder.bind(self.connection.clone())?;
         self.bound = true;
      }
      if !self.receiver {
         self.binder.register_receiver(self.connection.clone())?;
         self.receiver = true;
      }
      Ok(())
   }

   pub const fn is_bound(&self) -> bool {
      self.bound
   }

   pub const fn has_receiver(&self) -> bool {
      self.receiver
   }

   /// Unbinds and unregisters. Failures are logged and do not stop the
   /// remaining steps. Returns the number of failed steps.
   pub fn teardown(&mut self) -> usize {
      let mut failures = 0;
      if std::mem::take(&mut self.bound) {
         match self.binder.unbind() {
            Ok(()) => debug!("Unbound service"),
            Err(e) => {
               warn!("Error while unbinding service: {e}");
               failures += 1;
            },
         }
      }
      if std::mem::take(&mut self.receiver) {
         match self.binder.unregister_receiver() {
            Ok(()) => debug!("Unregistered receiver"),
            Err(e) => {
               warn!("Error while unregistering receiver: {e}");
               failures += 1;
            },
         }
      }
      failures
   }
}

impl Drop for BoundService {
   fn drop(&mut self) {
      self.teardown();
   }
}
