//! Stateless view tree handed to front-ends.
//!
//! Screens render into [`Node`]s; front-ends draw them and report
//! interactions back as [`Message`]s. The tree serializes to JSON tagged
//! by `kind`.

use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;

use super::{message::Message, theme::Color};

/// Rendered state of a styled switch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchView {
   pub key: SmolStr,
   pub checked: bool,
   /// Horizontal thumb offset from the left edge of the track.
   pub thumb_offset: f32,
   pub track_color: Color,
   pub thumb_color: Color,
   pub on_tap: Message,
}

/// Rendered state of an integer slider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliderView {
   pub key: SmolStr,
   pub value: i64,
   pub min: i64,
   pub max: i64,
   /// Thumb position in `0.0..=1.0`.
   pub fraction: f32,
   pub min_label: SmolStr,
   pub max_label: SmolStr,
   pub track_color: Color,
   pub active_track_color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
   Screen {
      title: SmolStr,
      /// Whether a back affordance is shown.
      back: bool,
      children: Vec<Node>,
   },
   Section {
      title: SmolStr,
      children: Vec<Node>,
   },
   Text {
      text: SmolStr,
   },
   Row {
      title: SmolStr,
      subtitle: Option<SmolStr>,
      trailing: Option<Box<Node>>,
      on_tap: Option<Message>,
   },
   Switch(SwitchView),
   Slider(SliderView),
   Button {
      label: SmolStr,
      enabled: bool,
      destructive: bool,
      on_tap: Option<Message>,
   },
   PermissionCard {
      title: SmolStr,
      description: SmolStr,
      granted: bool,
   },
   Dialog {
      title: SmolStr,
      text: SmolStr,
      confirm: Box<Node>,
      dismiss: Box<Node>,
   },
}

impl Node {
   pub fn screen(title: impl Into<SmolStr>, back: bool, children: Vec<Self>) -> Self {
      Self::Screen {
         title: title.into(),
         back,
         children,
      }
   }

   pub fn section(title: impl Into<SmolStr>, children: Vec<Self>) -> Self {
      Self::Section {
         title: title.into(),
         children,
      }
   }

   pub fn text(text: impl Into<SmolStr>) -> Self {
      Self::Text { text: text.into() }
   }

   pub fn row(title: impl Into<SmolStr>) -> Self {
      Self::Row {
         title: title.into(),
         subtitle: None,
         trailing: None,
         on_tap: None,
      }
   }

   pub fn button(label: impl Into<SmolStr>, on_tap: Message) -> Self {
      Self::Button {
         label: label.into(),
         enabled: true,
         destructive: false,
         on_tap: Some(on_tap),
      }
   }

   /// Sets the subtitle of a row. No-op on other nodes.
   #[must_use]
   pub fn with_subtitle(mut self, text: impl Into<SmolStr>) -> Self {
      if let Self::Row { subtitle, .. } = &mut self {
         *subtitle = Some(text.into());
      }
      self
   }

   #[must_use]
   pub fn with_trailing(mut self, node: Self) -> Self {
      if let Self::Row { trailing, .. } = &mut self {
         *trailing = Some(Box::new(node));
      }
      self
   }

   /// Sets the tap action of a row or button.
   #[must_use]
   pub fn with_tap(mut self, message: Message) -> Self {
      match &mut self {
         Self::Row { on_tap, .. } | Self::Button { on_tap, .. } => *on_tap = Some(message),
         _ => {},
      }
      self
   }

   #[must_use]
   pub fn enabled(mut self, value: bool) -> Self {
      if let Self::Button { enabled, .. } = &mut self {
         *enabled = value;
      }
      self
   }

   #[must_use]
   pub fn destructive(mut self) -> Self {
      if let Self::Button { destructive, .. } = &mut self {
         *destructive = true;
      }
      self
   }

   /// Direct children, including row trailers and dialog buttons.
   pub fn children(&self) -> Vec<&Self> {
      match self {
         Self::Screen { children, .. } | Self::Section { children, .. } => children.iter().collect(),
         Self::Row { trailing, .. } => trailing.as_deref().into_iter().collect(),
         Self::Dialog {
            confirm, dismiss, ..
         } => vec![confirm.as_ref(), dismiss.as_ref()],
         _ => Vec::new(),
      }
   }

   /// Depth-first pre-order traversal starting at `self`.
   pub fn descendants(&self) -> Vec<&Self> {
      let mut out = Vec::new();
      let mut stack = vec![self];
      while let Some(node) = stack.pop() {
         out.push(node);
         stack.extend(node.children().into_iter().rev());
      }
      out
   }

   pub fn find(&self, pred: impl Fn(&Self) -> bool) -> Option<&Self> {
      self.descendants().into_iter().find(|n| pred(n))
   }

   pub fn find_switch(&self, key: &str) -> Option<&SwitchView> {
      self.descendants().into_iter().find_map(|n| match n {
         Self::Switch(view) if view.key == key => Some(view),
         _ => None,
      })
   }

   pub fn find_slider(&self, key: &str) -> Option<&SliderView> {
      self.descendants().into_iter().find_map(|n| match n {
         Self::Slider(view) if view.key == key => Some(view),
         _ => None,
      })
   }

   pub fn find_button(&self, label: &str) -> Option<&Self> {
      self.find(|n| matches!(n, Self::Button { label: l, .. } if l == label))
   }

   pub fn find_row(&self, title: &str) -> Option<&Self> {
      self.find(|n| matches!(n, Self::Row { title: t, .. } if t == title))
   }

   pub fn title(&self) -> Option<&str> {
      let title = match self {
         Self::Screen { title, .. }
         | Self::Section { title, .. }
         | Self::Row { title, .. }
         | Self::PermissionCard { title, .. }
         | Self::Dialog { title, .. } => title,
         Self::Button { label, .. } => label,
         Self::Text { text } => text,
         Self::Switch(_) | Self::Slider(_) => return None,
      };
      Some(title.as_str())
   }

   /// Whether any node carries `text` as its title, label or body.
   pub fn contains_text(&self, text: &str) -> bool {
      self.descendants().into_iter().any(|n| {
         n.title() == Some(text)
            || matches!(n, Self::Row { subtitle: Some(s), .. } if s == text)
            || matches!(n, Self::Dialog { text: t, .. } if t == text)
      })
   }

   fn write_outline(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
      let indent = depth * 2;
      match self {
         Self::Screen { title, back, .. } => {
            writeln!(f, "{:indent$}[{}]{}", "", title, if *back { " <" } else { "" })?;
         },
         Self::Section { title, .. } => writeln!(f, "{:indent$}## {}", "", title)?,
         Self::Text { text } => writeln!(f, "{:indent$}{}", "", text)?,
         Self::Row {
            title, subtitle, ..
         } => match subtitle {
            Some(subtitle) => writeln!(f, "{:indent$}- {} ({})", "", title, subtitle)?,
            None => writeln!(f, "{:indent$}- {}", "", title)?,
         },
         Self::Switch(view) => writeln!(
            f,
            "{:indent$}({}) {}",
            "",
            if view.checked { "on" } else { "off" },
            view.key
         )?,
         Self::Slider(view) => writeln!(
            f,
            "{:indent$}{} [{}..{}] = {}",
            "", view.key, view.min, view.max, view.value
         )?,
         Self::Button { label, enabled, .. } => writeln!(
            f,
            "{:indent$}<{}>{}",
            "",
            label,
            if *enabled { "" } else { " (disabled)" }
         )?,
         Self::PermissionCard { title, granted, .. } => writeln!(
            f,
            "{:indent$}{} {}",
            "",
            if *granted { "[x]" } else { "[ ]" },
            title
         )?,
         Self::Dialog { title, text, .. } => writeln!(f, "{:indent$}!! {}: {}", "", title, text)?,
      }
      for child in self.children() {
         child.write_outline(f, depth + 1)?;
      }
      Ok(())
   }
}

impl fmt::Display for Node {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.write_outline(f, 0)
   }
}
