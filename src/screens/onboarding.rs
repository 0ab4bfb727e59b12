//! Setup destination shown while no hook offset is stored.

use crate::{
   hook::HookOffset,
   ui::{Message, Node, nav},
};

pub const TITLE: &str = "Setup";
pub const CONTINUE_LABEL: &str = "Continue";

pub fn view(offset: Option<HookOffset>) -> Node {
   let children = match offset {
      Some(offset) => vec![
         Node::text(format!("Hook offset found at {offset}.")),
         Node::button(
            CONTINUE_LABEL,
            Message::Navigate {
               route: nav::SETTINGS.into(),
            },
         ),
      ],
      None => vec![Node::text(
         "No hook offset is stored. Run the setup to locate it before using the app.",
      )],
   };
   Node::screen(TITLE, false, children)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_continue_only_with_offset() {
      assert!(view(None).find_button(CONTINUE_LABEL).is_none());
      let node = view(Some(HookOffset(0x1f00)));
      assert!(node.contains_text("Hook offset found at 0x1f00."));
      assert!(node.find_button(CONTINUE_LABEL).is_some());
   }
}
