//! Screen renderers and the state they own.

pub mod app_settings;
pub mod device;
pub mod onboarding;
pub mod permissions;

use smol_str::SmolStr;

use crate::{
   event::Toast,
   ui::{
      Message, Node,
      nav::{self, NavOptions, NavRoute},
   },
};

/// Side effect requested by a screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
   Toast(Toast),
   Navigate { route: SmolStr, options: NavOptions },
}

/// Renders destinations without state of their own.
pub fn placeholder(route: &NavRoute) -> Node {
   let title = match route.name.as_str() {
      nav::DEBUG => "Debug".to_string(),
      nav::LONG_PRESS => match route.arg("bud") {
         Some(bud) => format!("Press and Hold ({bud})"),
         None => "Press and Hold".to_string(),
      },
      nav::RENAME => "Rename".to_string(),
      nav::TROUBLESHOOTING => "Troubleshooting".to_string(),
      nav::HEAD_TRACKING => "Head Tracking".to_string(),
      other => other.to_string(),
   };
   Node::screen(title, true, vec![Node::button("Back", Message::Back)])
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::ui::nav::RouteTable;

   #[test]
   fn test_placeholder_titles() {
      let table = RouteTable::default();
      let node = placeholder(&table.resolve("long_press/left").unwrap());
      assert_eq!(node.title(), Some("Press and Hold (left)"));
      let node = placeholder(&table.resolve("troubleshooting").unwrap());
      assert_eq!(node.title(), Some("Troubleshooting"));
      assert!(node.find_button("Back").is_some());
   }
}
