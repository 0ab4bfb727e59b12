//! Colours shared by the screens.

use std::fmt;

use serde::{Serialize, Serializer};

/// ARGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
   pub const WHITE: Self = Self(0xFFFF_FFFF);
   pub const BLACK: Self = Self(0xFF00_0000);
   pub const GRAY: Self = Self(0xFF88_8888);
}

impl fmt::Display for Color {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "#{:08X}", self.0)
   }
}

impl Serialize for Color {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.collect_str(self)
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
   #[default]
   Light,
   Dark,
}

impl Theme {
   pub const fn from_dark(dark: bool) -> Self {
      if dark { Self::Dark } else { Self::Light }
   }

   pub const fn is_dark(self) -> bool {
      matches!(self, Self::Dark)
   }

   pub const fn background(self) -> Color {
      match self {
         Self::Dark => Color(0xFF1C_1C1E),
         Self::Light => Color::WHITE,
      }
   }

   pub const fn text(self) -> Color {
      match self {
         Self::Dark => Color::WHITE,
         Self::Light => Color::BLACK,
      }
   }

   pub const fn accent(self) -> Color {
      match self {
         Self::Dark => Color(0xFF00_7AFF),
         Self::Light => Color(0xFF3C_6DF5),
      }
   }

   pub const fn slider_track(self) -> Color {
      match self {
         Self::Dark => Color(0xFFB3_B3B3),
         Self::Light => Color(0xFFD9_D9D9),
      }
   }
}
