//! Runtime permission tracking.
//!
//! The companion refuses to show its main content until every required
//! runtime permission is granted and the overlay permission is either
//! granted or explicitly skipped.

use std::collections::HashMap;

use log::debug;

/// Runtime permissions the companion asks for.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Hash,
   PartialOrd,
   Ord,
   strum::Display,
   strum::EnumString,
   strum::IntoStaticStr,
   strum::EnumIter,
)]
pub enum Permission {
   #[strum(serialize = "android.permission.BLUETOOTH_CONNECT")]
   BluetoothConnect,
   #[strum(serialize = "android.permission.BLUETOOTH_SCAN")]
   BluetoothScan,
   #[strum(serialize = "android.permission.BLUETOOTH")]
   Bluetooth,
   #[strum(serialize = "android.permission.BLUETOOTH_ADMIN")]
   BluetoothAdmin,
   #[strum(serialize = "android.permission.BLUETOOTH_ADVERTISE")]
   BluetoothAdvertise,
   #[strum(serialize = "android.permission.ACCESS_FINE_LOCATION")]
   AccessFineLocation,
   #[strum(serialize = "android.permission.POST_NOTIFICATIONS")]
   PostNotifications,
   #[strum(serialize = "android.permission.READ_PHONE_STATE")]
   ReadPhoneState,
   #[strum(serialize = "android.permission.ANSWER_PHONE_CALLS")]
   AnswerPhoneCalls,
}

impl Permission {
   pub fn name(self) -> &'static str {
      self.into()
   }

   pub const fn group(self) -> PermissionGroup {
      match self {
         Self::BluetoothConnect
         | Self::BluetoothScan
         | Self::Bluetooth
         | Self::BluetoothAdmin
         | Self::BluetoothAdvertise
         | Self::AccessFineLocation => PermissionGroup::Bluetooth,
         Self::PostNotifications => PermissionGroup::Notifications,
         Self::ReadPhoneState | Self::AnswerPhoneCalls => PermissionGroup::Phone,
      }
   }
}

/// Logical permission groups shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum PermissionGroup {
   Bluetooth,
   Notifications,
   Phone,
   Overlay,
}

impl PermissionGroup {
   pub const fn title(self) -> &'static str {
      match self {
         Self::Bluetooth => "Bluetooth Permissions",
         Self::Notifications => "Notification Permission",
         Self::Phone => "Phone Permissions",
         Self::Overlay => "Display Over Other Apps",
      }
   }

   pub const fn description(self) -> &'static str {
      match self {
         Self::Bluetooth => "Required to communicate with your AirPods",
         Self::Notifications => "To show battery status",
         Self::Phone => "For answering calls with Head Gestures",
         Self::Overlay => "For popup animations when AirPods connect",
      }
   }
}

/// First API level with the split Bluetooth permissions.
const SDK_SPLIT_BLUETOOTH: u32 = 31;

/// Returns the permissions required on the given API level.
pub fn required_permissions(sdk_level: u32) -> Vec<Permission> {
   let mut required = if sdk_level >= SDK_SPLIT_BLUETOOTH {
      vec![
         Permission::BluetoothConnect,
         Permission::BluetoothScan,
         Permission::Bluetooth,
         Permission::BluetoothAdmin,
         Permission::BluetoothAdvertise,
      ]
   } else {
      vec![
         Permission::Bluetooth,
         Permission::BluetoothAdmin,
         Permission::AccessFineLocation,
      ]
   };
   required.extend([
      Permission::PostNotifications,
      Permission::ReadPhoneState,
      Permission::AnswerPhoneCalls,
   ]);
   required
}

/// Aggregate state of the required runtime permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum GateState {
   /// No request launched and no result reported yet.
   Unrequested,
   PartiallyGranted,
   FullyGranted,
}

/// Tracks grant results and decides when the main content may be shown.
#[derive(Debug, Clone)]
pub struct PermissionGate {
   required: Vec<Permission>,
   results: HashMap<Permission, bool>,
   requested: bool,
   overlay_granted: bool,
   overlay_skipped: bool,
}

impl PermissionGate {
   pub fn new(mut required: Vec<Permission>) -> Self {
      required.sort_unstable();
      required.dedup();
      Self {
         required,
         results: HashMap::new(),
         requested: false,
         overlay_granted: false,
         overlay_skipped: false,
      }
   }

   pub fn for_sdk(sdk_level: u32) -> Self {
      Self::new(required_permissions(sdk_level))
   }

   pub fn required(&self) -> &[Permission] {
      &self.required
   }

   /// Records that a permission request was launched.
   pub fn mark_requested(&mut self) -> GateState {
      self.requested = true;
      self.state()
   }

   /// Records a grant callback. Results for permissions outside the
   /// required set are ignored.
   pub fn on_permission_result(&mut self, permission: Permission, granted: bool) -> GateState {
      if !self.required.contains(&permission) {
         debug!("Ignoring result for unrequired permission {permission}");
      } else {
         debug!("Permission {permission} granted={granted}");
         self.results.insert(permission, granted);
      }
      self.state()
   }

   pub fn on_permission_results(
      &mut self,
      results: impl IntoIterator<Item = (Permission, bool)>,
   ) -> GateState {
      for (permission, granted) in results {
         self.on_permission_result(permission, granted);
      }
      self.state()
   }

   /// Reports every required permission as granted.
   pub fn grant_all(&mut self) -> GateState {
      let required = self.required.clone();
      self.on_permission_results(required.into_iter().map(|p| (p, true)))
   }

   pub fn is_granted(&self, permission: Permission) -> bool {
      self.results.get(&permission).copied().unwrap_or(false)
   }

   pub fn state(&self) -> GateState {
      if self.all_required_granted() {
         GateState::FullyGranted
      } else if self.requested || !self.results.is_empty() {
         GateState::PartiallyGranted
      } else {
         GateState::Unrequested
      }
   }

   fn all_required_granted(&self) -> bool {
      self.required.iter().all(|p| self.is_granted(*p))
   }

   /// Whether every required permission of `group` is granted.
   ///
   /// A group with no required members reports `false`.
   pub fn group_granted(&self, group: PermissionGroup) -> bool {
      if group == PermissionGroup::Overlay {
         return self.overlay_granted;
      }
      let mut members = self.required.iter().filter(|p| p.group() == group).peekable();
      members.peek().is_some() && members.all(|p| self.is_granted(*p))
   }

   pub fn set_overlay_granted(&mut self, granted: bool) {
      self.overlay_granted = granted;
   }

   pub fn overlay_granted(&self) -> bool {
      self.overlay_granted
   }

   pub fn skip_overlay(&mut self) {
      self.overlay_skipped = true;
   }

   pub fn overlay_skipped(&self) -> bool {
      self.overlay_skipped
   }

   /// Skipping the overlay is offered once everything else is granted.
   pub fn can_skip_overlay(&self) -> bool {
      !self.overlay_granted && self.all_required_granted()
   }

   pub fn is_unblocked(&self) -> bool {
      self.state() == GateState::FullyGranted && (self.overlay_granted || self.overlay_skipped)
   }
}
