//! App settings screen.
//!
//! Every control writes the store first and only reflects the new value
//! once the write succeeded. The screen also follows the store, so values
//! changed elsewhere show up while it is mounted.

use std::{collections::BTreeMap, time::Duration};

use log::warn;
use smol_str::SmolStr;

use super::Effect;
use crate::{
   error::{CompanionError, Result},
   event::Toast,
   hook::HookOffsetStore,
   prefs::{
      keys::{self, QsClickBehavior},
      store::PreferenceStore,
   },
   ui::{
      Message, Node,
      host::ViewHost,
      nav::{self, NavOptions},
      slider::Slider,
      state::{State, Subscription},
      switch::StyledSwitch,
      theme::Theme,
   },
};

pub const TITLE: &str = "App Settings";
pub const RESET_LABEL: &str = "Reset Hook Offset";
pub const RESET_DIALOG_TEXT: &str = "This will clear the current hook offset and require you to go through the setup process again. Are you sure you want to continue?";
pub const RESET_CONFIRM_LABEL: &str = "Reset";
pub const RESET_CANCEL_LABEL: &str = "Cancel";
pub const RESET_DONE_TOAST: &str = "Hook offset has been reset. Redirecting to setup...";
pub const RESET_FAILED_TOAST: &str = "Failed to reset hook offset";
pub const SAVE_FAILED_TOAST: &str = "Failed to save setting";

/// Boolean controls, in display order.
const TOGGLES: [&str; 5] = [
   keys::SHOW_PHONE_BATTERY_IN_WIDGET.key,
   keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key,
   keys::RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME.key,
   keys::QS_CLICK_BEHAVIOR.key,
   keys::DISCONNECT_WHEN_NOT_WEARING.key,
];

fn read_toggle(store: &PreferenceStore, key: &str) -> bool {
   if key == keys::QS_CLICK_BEHAVIOR.key {
      return store.read(&keys::QS_CLICK_BEHAVIOR) == QsClickBehavior::Dialog;
   }
   let default = match key {
      k if k == keys::SHOW_PHONE_BATTERY_IN_WIDGET.key => {
         keys::SHOW_PHONE_BATTERY_IN_WIDGET.default
      },
      k if k == keys::RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME.key => {
         keys::RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME.default
      },
      _ => false,
   };
   store.get_bool(key, default)
}

fn read_volume(store: &PreferenceStore) -> i64 {
   keys::clamp_volume(store.read(&keys::CONVERSATIONAL_AWARENESS_VOLUME) as f64)
}

pub struct AppSettingsScreen {
   store: PreferenceStore,
   toggles: BTreeMap<&'static str, State<bool>>,
   switches: BTreeMap<&'static str, StyledSwitch>,
   volume: State<i64>,
   slider: Slider,
   show_reset_dialog: State<bool>,
   _store_listener: Subscription,
}

impl AppSettingsScreen {
   /// Reads the current settings; defaults fill absent keys.
   pub fn mount(store: &PreferenceStore) -> Self {
      let toggles: BTreeMap<_, _> = TOGGLES
         .iter()
         .map(|key| (*key, State::new(read_toggle(store, key))))
         .collect();
      let switches = toggles
         .iter()
         .map(|(key, state)| (*key, StyledSwitch::new(state.get())))
         .collect();
      let volume = State::new(read_volume(store));
      let slider = Slider::new(volume.get(), keys::CONVERSATIONAL_AWARENESS_VOLUME_RANGE);

      let listener = {
         let (reader, toggles, volume) = (store.clone(), toggles.clone(), volume.clone());
         store.subscribe(move |key| {
            if let Some(state) = toggles.get(key) {
               state.set(read_toggle(&reader, key));
            } else if key == keys::CONVERSATIONAL_AWARENESS_VOLUME.key {
               volume.set(read_volume(&reader));
            }
         })
      };

      Self {
         store: store.clone(),
         toggles,
         switches,
         volume,
         slider,
         show_reset_dialog: State::new(false),
         _store_listener: listener,
      }
   }

   /// Re-renders `host` whenever a value shown here changes.
   pub fn bind(&self, host: &mut ViewHost) {
      for state in self.toggles.values() {
         host.bind(state);
      }
      host.bind(&self.volume);
      host.bind(&self.show_reset_dialog);
   }

   pub fn toggle_value(&self, key: &str) -> Option<bool> {
      self.toggles.get(key).map(State::get)
   }

   pub fn volume(&self) -> i64 {
      self.volume.get()
   }

   pub fn is_reset_dialog_shown(&self) -> bool {
      self.show_reset_dialog.get()
   }

   pub fn set_toggle(&mut self, key: &str, value: bool) -> Result<()> {
      let state = self
         .toggles
         .get(key)
         .ok_or_else(|| CompanionError::UnknownSetting(key.to_string()))?;
      if key == keys::QS_CLICK_BEHAVIOR.key {
         let behavior = if value {
            QsClickBehavior::Dialog
         } else {
            QsClickBehavior::Cycle
         };
         self.store.write(&keys::QS_CLICK_BEHAVIOR, behavior)?;
      } else {
         self.store.set_bool(key, value)?;
      }
      state.set(value);
      Ok(())
   }

   pub fn toggle(&mut self, key: &str) -> Result<()> {
      let current = self
         .toggle_value(key)
         .ok_or_else(|| CompanionError::UnknownSetting(key.to_string()))?;
      self.set_toggle(key, !current)
   }

   /// Stores the clamped slider value and returns it.
   pub fn set_volume(&mut self, raw: f64) -> Result<i64> {
      let value = keys::clamp_volume(raw);
      self.store.write(&keys::CONVERSATIONAL_AWARENESS_VOLUME, value)?;
      self.volume.set(value);
      Ok(value)
   }

   pub fn update(&mut self, message: &Message, hooks: &HookOffsetStore) -> Result<Vec<Effect>> {
      let result = match message {
         Message::Toggle { key } => self.toggle(key),
         Message::SetToggle { key, value } => self.set_toggle(key, *value),
         Message::SetSlider { key, value } if key == keys::CONVERSATIONAL_AWARENESS_VOLUME.key => {
            self.set_volume(*value).map(|_| ())
         },
         Message::SetSlider { key, .. } => Err(CompanionError::UnknownSetting(key.to_string())),
         Message::ShowResetDialog => {
            self.show_reset_dialog.set(true);
            Ok(())
         },
         Message::DismissResetDialog => {
            self.show_reset_dialog.set(false);
            Ok(())
         },
         Message::ConfirmResetHookOffset => {
            self.show_reset_dialog.set(false);
            return Ok(Self::reset_hook_offset(hooks));
         },
         _ => return Ok(Vec::new()),
      };

      match result {
         Ok(()) => Ok(Vec::new()),
         Err(e @ CompanionError::UnknownSetting(_)) => Err(e),
         Err(e) => {
            warn!("Failed to save setting: {e}");
            Ok(vec![Effect::Toast(Toast::short(SAVE_FAILED_TOAST))])
         },
      }
   }

   fn reset_hook_offset(hooks: &HookOffsetStore) -> Vec<Effect> {
      match hooks.clear() {
         Ok(()) => vec![
            Effect::Toast(Toast::long(RESET_DONE_TOAST)),
            Effect::Navigate {
               route: nav::ONBOARDING.into(),
               options: NavOptions::pop_up_to(nav::SETTINGS, true),
            },
         ],
         Err(_) => vec![Effect::Toast(Toast::short(RESET_FAILED_TOAST))],
      }
   }

   /// Steps switch animations. Returns whether any switch is still moving.
   pub fn advance(&mut self, elapsed: Duration) -> bool {
      self.sync_switches();
      let mut animating = false;
      for switch in self.switches.values_mut() {
         switch.advance(elapsed);
         animating |= switch.is_animating();
      }
      animating
   }

   fn sync_switches(&mut self) {
      for (key, switch) in &mut self.switches {
         if let Some(state) = self.toggles.get(key) {
            switch.set_checked(state.get());
         }
      }
      self.slider = Slider::new(self.volume.get(), keys::CONVERSATIONAL_AWARENESS_VOLUME_RANGE);
   }

   fn toggle_row(&self, key: &'static str, title: &str, subtitle: &str, theme: Theme) -> Node {
      let row = Node::row(title)
         .with_subtitle(subtitle)
         .with_tap(Message::Toggle { key: key.into() });
      match self.switches.get(key) {
         Some(switch) => row.with_trailing(Node::Switch(switch.view(key, theme))),
         None => row,
      }
   }

   pub fn view(&mut self, theme: Theme) -> Node {
      self.sync_switches();

      let qs_subtitle = if self.toggle_value(keys::QS_CLICK_BEHAVIOR.key) == Some(true) {
         "If enabled, it will show a dialog for controlling noise control mode and conversational awareness"
      } else {
         "If disabled, clicking on the QS will cycle through modes"
      };

      let mut children = vec![
         Node::section(
            "Widget",
            vec![self.toggle_row(
               keys::SHOW_PHONE_BATTERY_IN_WIDGET.key,
               "Show phone battery in widget",
               "Display your phone's battery level in the widget alongside AirPods battery",
               theme,
            )],
         ),
         Node::section(
            "Conversational Awareness",
            vec![
               self.toggle_row(
                  keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key,
                  "Pause Music",
                  "When you start speaking, music will be paused",
                  theme,
               ),
               self.toggle_row(
                  keys::RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME.key,
                  "Relative volume",
                  "Reduces to a percentage of the current volume instead of the maximum volume.",
                  theme,
               ),
               Node::text("Conversational Awareness Volume"),
               Node::Slider(
                  self
                     .slider
                     .view(keys::CONVERSATIONAL_AWARENESS_VOLUME.key, theme),
               ),
            ],
         ),
         Node::section(
            "Quick Settings Tile",
            vec![self.toggle_row(
               keys::QS_CLICK_BEHAVIOR.key,
               "Open dialog for controlling",
               qs_subtitle,
               theme,
            )],
         ),
         Node::section(
            "Ear Detection",
            vec![self.toggle_row(
               keys::DISCONNECT_WHEN_NOT_WEARING.key,
               "Disconnect AirPods when not wearing",
               "You will still be able to control them with the app - this just disconnects the audio.",
               theme,
            )],
         ),
         Node::section(
            "Advanced Options",
            vec![
               Node::row("Troubleshooting")
                  .with_subtitle("Collect logs and diagnose connection issues")
                  .with_tap(Message::Navigate {
                     route: nav::TROUBLESHOOTING.into(),
                  }),
               Node::button(RESET_LABEL, Message::ShowResetDialog).destructive(),
            ],
         ),
      ];

      if self.show_reset_dialog.get() {
         children.push(Node::Dialog {
            title: SmolStr::new_static(RESET_LABEL),
            text: SmolStr::new_static(RESET_DIALOG_TEXT),
            confirm: Box::new(
               Node::button(RESET_CONFIRM_LABEL, Message::ConfirmResetHookOffset).destructive(),
            ),
            dismiss: Box::new(Node::button(RESET_CANCEL_LABEL, Message::DismissResetDialog)),
         });
      }

      Node::screen(TITLE, true, children)
   }
}

#[cfg(test)]
mod tests {
   use std::fs;

   use super::*;
   use crate::hook::HookOffset;

   fn hooks() -> (tempfile::TempDir, HookOffsetStore) {
      let dir = tempfile::tempdir().unwrap();
      let hooks = HookOffsetStore::new(dir.path().join("hook_offset"));
      (dir, hooks)
   }

   #[test]
   fn test_defaults_when_store_empty() {
      let store = PreferenceStore::in_memory();
      let mut screen = AppSettingsScreen::mount(&store);
      assert_eq!(
         screen.toggle_value(keys::SHOW_PHONE_BATTERY_IN_WIDGET.key),
         Some(true)
      );
      assert_eq!(
         screen.toggle_value(keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key),
         Some(false)
      );
      assert_eq!(
         screen.toggle_value(keys::RELATIVE_CONVERSATIONAL_AWARENESS_VOLUME.key),
         Some(true)
      );
      assert_eq!(screen.toggle_value(keys::QS_CLICK_BEHAVIOR.key), Some(true));
      assert_eq!(
         screen.toggle_value(keys::DISCONNECT_WHEN_NOT_WEARING.key),
         Some(false)
      );
      assert_eq!(screen.volume(), 43);

      let node = screen.view(Theme::Light);
      assert_eq!(node.title(), Some(TITLE));
      assert_eq!(
         node
            .find_slider(keys::CONVERSATIONAL_AWARENESS_VOLUME.key)
            .unwrap()
            .value,
         43
      );
      assert!(node.contains_text(
         "If enabled, it will show a dialog for controlling noise control mode and conversational awareness"
      ));
   }

   #[test]
   fn test_toggle_persists_then_reflects() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("settings.json");
      let store = PreferenceStore::open(&path).unwrap();
      let (_hook_dir, hooks) = hooks();
      let mut screen = AppSettingsScreen::mount(&store);

      let key = keys::DISCONNECT_WHEN_NOT_WEARING.key;
      let effects = screen
         .update(&Message::Toggle { key: key.into() }, &hooks)
         .unwrap();
      assert!(effects.is_empty());
      assert_eq!(screen.toggle_value(key), Some(true));

      let reopened = PreferenceStore::open(&path).unwrap();
      assert!(reopened.read(&keys::DISCONNECT_WHEN_NOT_WEARING));

      let node = screen.view(Theme::Dark);
      assert!(node.find_switch(key).unwrap().checked);
   }

   #[test]
   fn test_qs_switch_writes_behavior_name() {
      let store = PreferenceStore::in_memory();
      let (_dir, hooks) = hooks();
      let mut screen = AppSettingsScreen::mount(&store);
      screen
         .update(
            &Message::SetToggle {
               key: keys::QS_CLICK_BEHAVIOR.key.into(),
               value: false,
            },
            &hooks,
         )
         .unwrap();
      assert_eq!(store.get_string("qs_click_behavior", ""), "cycle");
      let node = screen.view(Theme::Light);
      assert!(node.contains_text("If disabled, clicking on the QS will cycle through modes"));
   }

   #[test]
   fn test_failed_write_does_not_reflect() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("settings.json");
      let store = PreferenceStore::open(&path).unwrap();
      let (_hook_dir, hooks) = hooks();
      let mut screen = AppSettingsScreen::mount(&store);

      fs::create_dir(path.with_extension("json.tmp")).unwrap();
      let key = keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key;
      let effects = screen
         .update(&Message::Toggle { key: key.into() }, &hooks)
         .unwrap();
      assert_eq!(effects, [Effect::Toast(Toast::short(SAVE_FAILED_TOAST))]);
      assert_eq!(screen.toggle_value(key), Some(false));
      assert!(!store.read(&keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC));
   }

   #[test]
   fn test_slider_clamps() {
      let store = PreferenceStore::in_memory();
      let mut screen = AppSettingsScreen::mount(&store);
      assert_eq!(screen.set_volume(5.0).unwrap(), 10);
      assert_eq!(screen.set_volume(99.9).unwrap(), 85);
      assert_eq!(screen.set_volume(60.6).unwrap(), 60);
      assert_eq!(store.read(&keys::CONVERSATIONAL_AWARENESS_VOLUME), 60);
   }

   #[test]
   fn test_unknown_keys_rejected() {
      let store = PreferenceStore::in_memory();
      let (_dir, hooks) = hooks();
      let mut screen = AppSettingsScreen::mount(&store);
      assert!(matches!(
         screen.update(&Message::Toggle { key: "bogus".into() }, &hooks),
         Err(CompanionError::UnknownSetting(_))
      ));
      assert!(matches!(
         screen.update(
            &Message::SetSlider {
               key: "bogus".into(),
               value: 1.0
            },
            &hooks
         ),
         Err(CompanionError::UnknownSetting(_))
      ));
   }

   #[test]
   fn test_external_change_reflected() {
      let store = PreferenceStore::in_memory();
      let screen = AppSettingsScreen::mount(&store);
      store
         .set_bool(keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key, true)
         .unwrap();
      store
         .set_int(keys::CONVERSATIONAL_AWARENESS_VOLUME.key, 70)
         .unwrap();
      assert_eq!(
         screen.toggle_value(keys::CONVERSATIONAL_AWARENESS_PAUSE_MUSIC.key),
         Some(true)
      );
      assert_eq!(screen.volume(), 70);

      drop(screen);
      assert_eq!(store.listener_count(), 0);
   }

   #[test]
   fn test_reset_dialog_flow() {
      let store = PreferenceStore::in_memory();
      let (_dir, hooks) = hooks();
      hooks.save(HookOffset(0x42)).unwrap();
      let mut screen = AppSettingsScreen::mount(&store);

      screen.update(&Message::ShowResetDialog, &hooks).unwrap();
      let node = screen.view(Theme::Light);
      assert!(node.contains_text(RESET_DIALOG_TEXT));
      assert!(node.find_button(RESET_CANCEL_LABEL).is_some());

      screen.update(&Message::DismissResetDialog, &hooks).unwrap();
      assert!(!screen.is_reset_dialog_shown());
      assert!(hooks.is_available());

      screen.update(&Message::ShowResetDialog, &hooks).unwrap();
      let effects = screen
         .update(&Message::ConfirmResetHookOffset, &hooks)
         .unwrap();
      assert!(!hooks.is_available());
      assert!(!screen.is_reset_dialog_shown());
      assert_eq!(
         effects,
         [
            Effect::Toast(Toast::long(RESET_DONE_TOAST)),
            Effect::Navigate {
               route: nav::ONBOARDING.into(),
               options: NavOptions::pop_up_to(nav::SETTINGS, true),
            }
         ]
      );
   }

   #[test]
   fn test_reset_failure_toast() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("hook_offset");
      fs::create_dir(&path).unwrap();
      let hooks = HookOffsetStore::new(path);
      let store = PreferenceStore::in_memory();
      let mut screen = AppSettingsScreen::mount(&store);
      let effects = screen
         .update(&Message::ConfirmResetHookOffset, &hooks)
         .unwrap();
      assert_eq!(effects, [Effect::Toast(Toast::short(RESET_FAILED_TOAST))]);
   }

   #[test]
   fn test_repeated_taps_persist_last_value() {
      let key = keys::DISCONNECT_WHEN_NOT_WEARING.key;
      let initial = keys::DISCONNECT_WHEN_NOT_WEARING.default;
      for taps in 0..6 {
         let dir = tempfile::tempdir().unwrap();
         let path = dir.path().join("settings.json");
         let store = PreferenceStore::open(&path).unwrap();
         let (_hook_dir, hooks) = hooks();
         let mut screen = AppSettingsScreen::mount(&store);

         let mut last = initial;
         for _ in 0..taps {
            let mut requested = None;
            screen.switches[key].tap(|checked| requested = Some(checked));
            let value = requested.unwrap();
            screen
               .update(&Message::SetToggle { key: key.into(), value }, &hooks)
               .unwrap();
            screen.advance(Duration::from_millis(16));
            last = value;
         }

         assert_eq!(last, initial ^ (taps % 2 == 1));
         assert_eq!(screen.toggle_value(key), Some(last));
         let reopened = PreferenceStore::open(&path).unwrap();
         assert_eq!(reopened.read(&keys::DISCONNECT_WHEN_NOT_WEARING), last);
      }
   }

   #[test]
   fn test_switch_animates_after_toggle() {
      let store = PreferenceStore::in_memory();
      let (_dir, hooks) = hooks();
      let mut screen = AppSettingsScreen::mount(&store);
      let key = keys::DISCONNECT_WHEN_NOT_WEARING.key;
      screen
         .update(&Message::Toggle { key: key.into() }, &hooks)
         .unwrap();
      assert!(screen.advance(Duration::from_millis(16)));
      assert!(!screen.advance(Duration::from_secs(1)));
      let node = screen.view(Theme::Light);
      assert_eq!(node.find_switch(key).unwrap().thumb_offset, 20.0);
   }
}
