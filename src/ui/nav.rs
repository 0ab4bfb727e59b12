//! Route table and back stack.
//!
//! Routes are slash-separated patterns whose `{name}` segments capture
//! arguments, e.g. `long_press/{bud}`.

use std::{collections::BTreeMap, fmt};

use log::debug;
use serde::Serialize;
use smol_str::SmolStr;

use super::state::State;
use crate::error::{CompanionError, Result};

pub const SETTINGS: &str = "settings";
pub const DEBUG: &str = "debug";
pub const LONG_PRESS: &str = "long_press/{bud}";
pub const RENAME: &str = "rename";
pub const APP_SETTINGS: &str = "app_settings";
pub const TROUBLESHOOTING: &str = "troubleshooting";
pub const HEAD_TRACKING: &str = "head_tracking";
pub const ONBOARDING: &str = "onboarding";

pub const ROUTES: &[&str] = &[
   SETTINGS,
   DEBUG,
   LONG_PRESS,
   RENAME,
   APP_SETTINGS,
   TROUBLESHOOTING,
   HEAD_TRACKING,
   ONBOARDING,
];

/// A resolved destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavRoute {
   /// Pattern the route was resolved against.
   pub name: SmolStr,
   pub args: BTreeMap<SmolStr, SmolStr>,
}

impl NavRoute {
   pub fn arg(&self, name: &str) -> Option<&str> {
      self.args.get(name).map(SmolStr::as_str)
   }

   /// Concrete path with arguments substituted.
   pub fn path(&self) -> String {
      self
         .name
         .split('/')
         .map(|segment| match placeholder(segment) {
            Some(arg) => self.arg(arg).unwrap_or_default(),
            None => segment,
         })
         .collect::<Vec<_>>()
         .join("/")
   }
}

impl fmt::Display for NavRoute {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.path())
   }
}

fn placeholder(segment: &str) -> Option<&str> {
   segment.strip_prefix('{')?.strip_suffix('}')
}

#[derive(Debug, Clone)]
pub struct RouteTable {
   patterns: Vec<SmolStr>,
}

impl Default for RouteTable {
   fn default() -> Self {
      Self::new(ROUTES.iter().copied())
   }
}

impl RouteTable {
   pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
      Self {
         patterns: patterns.into_iter().map(SmolStr::new).collect(),
      }
   }

   pub fn patterns(&self) -> impl Iterator<Item = &str> {
      self.patterns.iter().map(SmolStr::as_str)
   }

   /// Resolves a concrete path such as `long_press/left`.
   pub fn resolve(&self, path: &str) -> Result<NavRoute> {
      let segments: Vec<&str> = path.split('/').collect();
      for pattern in &self.patterns {
         let parts: Vec<&str> = pattern.split('/').collect();
         if let Some(args) = match_pattern(&parts, &segments) {
            return Ok(NavRoute {
               name: pattern.clone(),
               args,
            });
         }

         // A literal prefix followed by absent arguments.
         if segments.len() < parts.len()
            && parts[..segments.len()] == segments[..]
            && let Some(arg) = parts[segments.len()..].iter().find_map(|p| placeholder(p))
         {
            return Err(CompanionError::MissingRouteArgument {
               route: pattern.to_string(),
               arg: arg.to_string(),
            });
         }
      }
      Err(CompanionError::UnknownRoute(path.to_string()))
   }
}

fn match_pattern(parts: &[&str], segments: &[&str]) -> Option<BTreeMap<SmolStr, SmolStr>> {
   if parts.len() != segments.len() {
      return None;
   }
   let mut args = BTreeMap::new();
   for (part, segment) in parts.iter().zip(segments) {
      match placeholder(part) {
         Some(_) if segment.is_empty() => return None,
         Some(name) => {
            args.insert(SmolStr::new(name), SmolStr::new(segment));
         },
         None if part != segment => return None,
         None => {},
      }
   }
   Some(args)
}

/// Back stack manipulation applied when navigating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavOptions {
   /// Pop entries above the last entry with this route name first.
   pub pop_up_to: Option<SmolStr>,
   /// Also pop the `pop_up_to` entry itself.
   pub inclusive: bool,
}

impl NavOptions {
   pub fn pop_up_to(route: impl Into<SmolStr>, inclusive: bool) -> Self {
      Self {
         pop_up_to: Some(route.into()),
         inclusive,
      }
   }
}

/// Back stack over a [`RouteTable`]. Never empty.
#[derive(Debug)]
pub struct Navigator {
   table: RouteTable,
   stack: Vec<NavRoute>,
   current: State<NavRoute>,
}

impl Navigator {
   pub fn new(table: RouteTable, start: &str) -> Result<Self> {
      let route = table.resolve(start)?;
      Ok(Self {
         table,
         stack: vec![route.clone()],
         current: State::new(route),
      })
   }

   pub fn current(&self) -> NavRoute {
      self.current.get()
   }

   /// Observable current route.
   pub fn route(&self) -> &State<NavRoute> {
      &self.current
   }

   pub fn depth(&self) -> usize {
      self.stack.len()
   }

   pub fn stack(&self) -> &[NavRoute] {
      &self.stack
   }

   pub fn navigate(&mut self, path: &str) -> Result<()> {
      self.navigate_with(path, &NavOptions::default())
   }

   /// Pushes `path`. An unresolvable path leaves the stack untouched.
   pub fn navigate_with(&mut self, path: &str, options: &NavOptions) -> Result<()> {
      let route = self.table.resolve(path)?;
      if let Some(target) = &options.pop_up_to {
         match self.stack.iter().rposition(|r| r.name == *target) {
            Some(idx) => {
               let keep = if options.inclusive { idx } else { idx + 1 };
               self.stack.truncate(keep);
            },
            None => debug!("popUpTo target {target} not on the back stack"),
         }
      }
      debug!("Navigating to {route}");
      self.stack.push(route.clone());
      self.current.set(route);
      Ok(())
   }

   /// Pops the top entry. The last entry is never popped.
   pub fn pop_back(&mut self) -> bool {
      if self.stack.len() <= 1 {
         return false;
      }
      self.stack.pop();
      if let Some(top) = self.stack.last() {
         self.current.set(top.clone());
      }
      true
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_resolve() {
      let table = RouteTable::default();
      let route = table.resolve("long_press/left").unwrap();
      assert_eq!(route.name, LONG_PRESS);
      assert_eq!(route.arg("bud"), Some("left"));
      assert_eq!(route.path(), "long_press/left");
      assert_eq!(route.to_string(), "long_press/left");

      assert_eq!(table.resolve("app_settings").unwrap().name, APP_SETTINGS);
      assert!(matches!(
         table.resolve("long_press"),
         Err(CompanionError::MissingRouteArgument { ref arg, .. }) if arg == "bud"
      ));
      assert!(matches!(
         table.resolve("long_press/"),
         Err(CompanionError::UnknownRoute(_))
      ));
      assert!(matches!(
         table.resolve("nowhere"),
         Err(CompanionError::UnknownRoute(_))
      ));
   }

   #[test]
   fn test_navigate_and_pop() {
      let mut nav = Navigator::new(RouteTable::default(), SETTINGS).unwrap();
      nav.navigate(APP_SETTINGS).unwrap();
      nav.navigate(TROUBLESHOOTING).unwrap();
      assert_eq!(nav.depth(), 3);
      assert_eq!(nav.current().name, TROUBLESHOOTING);

      assert!(nav.pop_back());
      assert_eq!(nav.current().name, APP_SETTINGS);
      assert!(nav.pop_back());
      assert!(!nav.pop_back());
      assert_eq!(nav.depth(), 1);
      assert_eq!(nav.current().name, SETTINGS);
   }

   #[test]
   fn test_unknown_route_keeps_stack() {
      let mut nav = Navigator::new(RouteTable::default(), SETTINGS).unwrap();
      assert!(nav.navigate("bogus").is_err());
      assert_eq!(nav.depth(), 1);
      assert!(Navigator::new(RouteTable::default(), "bogus").is_err());
   }

   #[test]
   fn test_pop_up_to_inclusive() {
      let mut nav = Navigator::new(RouteTable::default(), SETTINGS).unwrap();
      nav.navigate(APP_SETTINGS).unwrap();
      nav
         .navigate_with(ONBOARDING, &NavOptions::pop_up_to(SETTINGS, true))
         .unwrap();
      assert_eq!(nav.depth(), 1);
      assert_eq!(nav.current().name, ONBOARDING);
      assert!(!nav.pop_back());
   }

   #[test]
   fn test_pop_up_to_exclusive_and_missing() {
      let mut nav = Navigator::new(RouteTable::default(), SETTINGS).unwrap();
      nav.navigate(APP_SETTINGS).unwrap();
      nav.navigate(DEBUG).unwrap();
      nav
         .navigate_with(RENAME, &NavOptions::pop_up_to(SETTINGS, false))
         .unwrap();
      let names: Vec<_> = nav.stack().iter().map(|r| r.name.as_str()).collect();
      assert_eq!(names, [SETTINGS, RENAME]);

      nav
         .navigate_with(DEBUG, &NavOptions::pop_up_to(HEAD_TRACKING, true))
         .unwrap();
      assert_eq!(nav.depth(), 3);
   }

   #[test]
   fn test_route_state_notifies() {
      use std::sync::{
         Arc,
         atomic::{AtomicUsize, Ordering},
      };

      let mut nav = Navigator::new(RouteTable::default(), SETTINGS).unwrap();
      let hits = Arc::new(AtomicUsize::new(0));
      let counter = hits.clone();
      let _sub = nav.route().subscribe(move |_| {
         counter.fetch_add(1, Ordering::SeqCst);
      });
      nav.navigate(DEBUG).unwrap();
      nav.pop_back();
      nav.pop_back();
      assert_eq!(hits.load(Ordering::SeqCst), 2);
   }
}
