//! iOS styled toggle switch.
//!
//! The switch never mutates its own checked state on tap: it reports the
//! requested value and waits for the owner to call
//! [`StyledSwitch::set_checked`] once the change is persisted. The thumb
//! then slides to its new position on a critically damped spring.

use std::time::Duration;

use smol_str::SmolStr;

use super::{
   message::Message,
   theme::{Color, Theme},
   view::SwitchView,
};

pub const TRACK_WIDTH: f32 = 51.0;
pub const TRACK_HEIGHT: f32 = 31.0;
pub const TRACK_CORNER_RADIUS: f32 = 15.0;
pub const TRACK_PADDING: f32 = 3.0;
pub const THUMB_SIZE: f32 = 27.0;
/// Thumb offset when checked.
pub const THUMB_TRAVEL: f32 = 20.0;

pub const TRACK_CHECKED: Color = Color(0xFF34_C759);
pub const TRACK_UNCHECKED_DARK: Color = Color(0xFF5B_5B5E);
pub const TRACK_UNCHECKED_LIGHT: Color = Color(0xFFD1_D1D6);
pub const THUMB_COLOR: Color = Color::WHITE;

const SPRING_STIFFNESS: f32 = 1500.0;
/// Distance and speed below which the thumb snaps to its target.
const VISIBILITY_THRESHOLD: f32 = 0.1;
const MAX_STEP: f32 = 0.001;

/// Thumb position driven by a critically damped spring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbAnimation {
   position: f32,
   velocity: f32,
   target: f32,
}

impl ThumbAnimation {
   pub const fn at_rest(position: f32) -> Self {
      Self {
         position,
         velocity: 0.0,
         target: position,
      }
   }

   pub const fn position(&self) -> f32 {
      self.position
   }

   pub const fn target(&self) -> f32 {
      self.target
   }

   pub fn is_running(&self) -> bool {
      self.position != self.target || self.velocity != 0.0
   }

   /// Changes the target, keeping current position and velocity.
   pub fn retarget(&mut self, target: f32) {
      self.target = target;
   }

   pub fn advance(&mut self, elapsed: Duration) {
      let omega = SPRING_STIFFNESS.sqrt();
      let mut remaining = elapsed.as_secs_f32();
      while remaining > 0.0 && self.is_running() {
         let h = remaining.min(MAX_STEP);
         let accel =
            -SPRING_STIFFNESS * (self.position - self.target) - 2.0 * omega * self.velocity;
         self.velocity += accel * h;
         self.position += self.velocity * h;
         remaining -= h;

         if (self.position - self.target).abs() < VISIBILITY_THRESHOLD
            && self.velocity.abs() < omega * VISIBILITY_THRESHOLD
         {
            self.position = self.target;
            self.velocity = 0.0;
         }
      }
   }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyledSwitch {
   checked: bool,
   thumb: ThumbAnimation,
}

impl StyledSwitch {
   pub const fn new(checked: bool) -> Self {
      Self {
         checked,
         thumb: ThumbAnimation::at_rest(Self::offset_for(checked)),
      }
   }

   const fn offset_for(checked: bool) -> f32 {
      if checked { THUMB_TRAVEL } else { 0.0 }
   }

   pub const fn checked(&self) -> bool {
      self.checked
   }

   pub const fn thumb_offset(&self) -> f32 {
      self.thumb.position()
   }

   pub fn is_animating(&self) -> bool {
      self.thumb.is_running()
   }

   /// Reports a tap as a request for the opposite value.
   pub fn tap(&self, on_checked_change: impl FnOnce(bool)) {
      on_checked_change(!self.checked);
   }

   /// Returns whether the value changed.
   pub fn set_checked(&mut self, checked: bool) -> bool {
      if self.checked == checked {
         return false;
      }
      self.checked = checked;
      self.thumb.retarget(Self::offset_for(checked));
      true
   }

   pub fn advance(&mut self, elapsed: Duration) {
      self.thumb.advance(elapsed);
   }

   pub const fn track_color(&self, theme: Theme) -> Color {
      match (self.checked, theme) {
         (true, _) => TRACK_CHECKED,
         (false, Theme::Dark) => TRACK_UNCHECKED_DARK,
         (false, Theme::Light) => TRACK_UNCHECKED_LIGHT,
      }
   }

   pub fn view(&self, key: impl Into<SmolStr>, theme: Theme) -> SwitchView {
      let key = key.into();
      SwitchView {
         on_tap: Message::Toggle { key: key.clone() },
         key,
         checked: self.checked,
         thumb_offset: self.thumb_offset(),
         track_color: self.track_color(theme),
         thumb_color: THUMB_COLOR,
      }
   }
}
