//! Integer slider over an inclusive range.

use std::ops::RangeInclusive;

use smol_str::{SmolStr, format_smolstr};

use super::{theme::Theme, view::SliderView};

/// Clamps a raw slider position into `range`, truncating fractions.
/// NaN maps to the lower bound.
pub fn clamp_to_range(raw: f64, range: &RangeInclusive<i64>) -> i64 {
   let (lo, hi) = (*range.start(), *range.end());
   if raw.is_nan() {
      return lo;
   }
   (raw.clamp(lo as f64, hi as f64).trunc() as i64).clamp(lo, hi)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slider {
   value: i64,
   range: RangeInclusive<i64>,
}

impl Slider {
   pub fn new(value: i64, range: RangeInclusive<i64>) -> Self {
      let value = value.clamp(*range.start(), *range.end());
      Self { value, range }
   }

   pub const fn value(&self) -> i64 {
      self.value
   }

   pub const fn range(&self) -> &RangeInclusive<i64> {
      &self.range
   }

   /// Moves the thumb, returning the clamped value.
   pub fn set(&mut self, raw: f64) -> i64 {
      self.value = clamp_to_range(raw, &self.range);
      self.value
   }

   pub fn fraction(&self) -> f32 {
      let (lo, hi) = (*self.range.start(), *self.range.end());
      if hi == lo {
         return 0.0;
      }
      (self.value - lo) as f32 / (hi - lo) as f32
   }

   pub fn view(&self, key: impl Into<SmolStr>, theme: Theme) -> SliderView {
      SliderView {
         key: key.into(),
         value: self.value,
         min: *self.range.start(),
         max: *self.range.end(),
         fraction: self.fraction(),
         min_label: format_smolstr!("{}%", self.range.start()),
         max_label: format_smolstr!("{}%", self.range.end()),
         track_color: theme.slider_track(),
         active_track_color: theme.accent(),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::ui::theme::Color;

   #[test]
   fn test_clamping() {
      let range = 10..=85;
      assert_eq!(clamp_to_range(-3.0, &range), 10);
      assert_eq!(clamp_to_range(9.99, &range), 10);
      assert_eq!(clamp_to_range(42.7, &range), 42);
      assert_eq!(clamp_to_range(85.0, &range), 85);
      assert_eq!(clamp_to_range(1e12, &range), 85);
      assert_eq!(clamp_to_range(f64::NAN, &range), 10);
      assert_eq!(clamp_to_range(f64::NEG_INFINITY, &range), 10);
   }

   #[test]
   fn test_view() {
      let mut slider = Slider::new(200, 10..=85);
      assert_eq!(slider.value(), 85);
      assert_eq!(slider.set(10.0), 10);
      assert_eq!(slider.fraction(), 0.0);

      let view = slider.view("volume", Theme::Dark);
      assert_eq!(view.min_label, "10%");
      assert_eq!(view.max_label, "85%");
      assert_eq!(view.active_track_color, Color(0xFF00_7AFF));
      assert_eq!(view.track_color, Color(0xFFB3_B3B3));

      let view = slider.view("volume", Theme::Light);
      assert_eq!(view.active_track_color, Color(0xFF3C_6DF5));
      assert_eq!(view.track_color, Color(0xFFD9_D9D9));
   }
}
