//! Start destination: the connected device and entry points to the other
//! screens.

use crate::{
   service::ServiceHandle,
   ui::{Message, Node, nav},
};

pub const TITLE: &str = "AirPods";

#[derive(Clone, Copy)]
pub struct DeviceViewModel<'a> {
   pub service: Option<&'a ServiceHandle>,
   /// Name stored in settings, used when the service has none.
   pub stored_name: &'a str,
   pub connected: bool,
   pub remotely_connected: bool,
}

fn navigate(route: &str) -> Message {
   Message::Navigate {
      route: route.into(),
   }
}

pub fn view(model: DeviceViewModel<'_>) -> Node {
   let Some(service) = model.service else {
      return Node::screen(
         TITLE,
         false,
         vec![Node::text("Waiting for the AirPods service...")],
      );
   };

   let device = service.device();
   let name = device
      .as_ref()
      .map(|d| d.name.as_str())
      .filter(|n| !n.is_empty())
      .unwrap_or(model.stored_name);
   let title = if name.is_empty() { TITLE } else { name };

   let status = if model.connected {
      "Connected"
   } else if model.remotely_connected {
      "Connected to another device"
   } else {
      "Not connected"
   };

   let mut children = vec![Node::text(status)];
   if let Some(device) = &device {
      children.push(Node::row("Address").with_subtitle(device.address.clone()));
   }
   children.push(Node::section(
      "Controls",
      vec![
         Node::row("Press and Hold (left)").with_tap(navigate("long_press/left")),
         Node::row("Press and Hold (right)").with_tap(navigate("long_press/right")),
         Node::row("Head Tracking").with_tap(navigate(nav::HEAD_TRACKING)),
         Node::row("Rename").with_tap(navigate(nav::RENAME)),
      ],
   ));
   children.push(Node::section(
      "More",
      vec![
         Node::row("App Settings").with_tap(navigate(nav::APP_SETTINGS)),
         Node::row("Debug").with_tap(navigate(nav::DEBUG)),
      ],
   ));
   Node::screen(title, false, children)
}
