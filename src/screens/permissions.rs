//! Permission request screen shown until the gate opens.

use strum::IntoEnumIterator;

use crate::{
   permissions::{PermissionGate, PermissionGroup},
   ui::{Message, Node},
};

pub const TITLE: &str = "Permission Required";
pub const REQUEST_LABEL: &str = "Ask for regular permissions";
pub const GRANT_OVERLAY_LABEL: &str = "Grant Overlay Permission";
pub const OVERLAY_GRANTED_LABEL: &str = "Overlay Permission Granted";
pub const SKIP_OVERLAY_LABEL: &str = "Continue without overlay";

pub fn view(gate: &PermissionGate) -> Node {
   let mut children = vec![Node::text(
      "The following permissions are required to use the app. Please grant them to continue.",
   )];
   children.extend(PermissionGroup::iter().map(|group| Node::PermissionCard {
      title: group.title().into(),
      description: group.description().into(),
      granted: gate.group_granted(group),
   }));

   children.push(Node::button(REQUEST_LABEL, Message::RequestPermissions));
   let overlay = if gate.overlay_granted() {
      Node::button(OVERLAY_GRANTED_LABEL, Message::OpenOverlaySettings).enabled(false)
   } else {
      Node::button(GRANT_OVERLAY_LABEL, Message::OpenOverlaySettings)
   };
   children.push(overlay);
   if gate.can_skip_overlay() {
      children.push(Node::button(SKIP_OVERLAY_LABEL, Message::SkipOverlay));
   }

   Node::screen(TITLE, false, children)
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::permissions::Permission;

   fn cards(node: &Node) -> Vec<(String, bool)> {
      node
         .descendants()
         .into_iter()
         .filter_map(|n| match n {
            Node::PermissionCard { title, granted, .. } => Some((title.to_string(), *granted)),
            _ => None,
         })
         .collect()
   }

   #[test]
   fn test_initial_view() {
      let gate = PermissionGate::for_sdk(34);
      let node = view(&gate);
      assert_eq!(node.title(), Some(TITLE));
      assert_eq!(cards(&node).len(), 4);
      assert!(cards(&node).iter().all(|(_, granted)| !granted));
      assert!(node.find_button(REQUEST_LABEL).is_some());
      assert!(node.find_button(GRANT_OVERLAY_LABEL).is_some());
      assert!(node.find_button(SKIP_OVERLAY_LABEL).is_none());
   }

   #[test]
   fn test_skip_offered_after_grants() {
      let mut gate = PermissionGate::for_sdk(34);
      gate.on_permission_result(Permission::PostNotifications, true);
      let node = view(&gate);
      assert!(cards(&node).contains(&("Notification Permission".to_string(), true)));
      assert!(node.find_button(SKIP_OVERLAY_LABEL).is_none());

      gate.grant_all();
      assert!(view(&gate).find_button(SKIP_OVERLAY_LABEL).is_some());

      gate.set_overlay_granted(true);
      let node = view(&gate);
      assert!(node.find_button(SKIP_OVERLAY_LABEL).is_none());
      assert!(matches!(
         node.find_button(OVERLAY_GRANTED_LABEL),
         Some(Node::Button { enabled: false, .. })
      ));
   }
}
