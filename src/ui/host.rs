//! Lazy re-rendering of the view tree.
//!
//! A [`ViewHost`] caches the last rendered tree and rebuilds it only after
//! one of its bound observables changed.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use super::{
   state::{State, Subscription},
   view::Node,
};
use crate::prefs::store::PreferenceStore;

#[derive(Debug)]
pub struct ViewHost {
   dirty: Arc<AtomicBool>,
   cached: Option<Node>,
   bindings: Vec<Subscription>,
   renders: u64,
}

impl Default for ViewHost {
   fn default() -> Self {
      Self::new()
   }
}

impl ViewHost {
   pub fn new() -> Self {
      Self {
         dirty: Arc::new(AtomicBool::new(true)),
         cached: None,
         bindings: Vec::new(),
         renders: 0,
      }
   }

   /// Re-renders whenever `state` changes.
   pub fn bind<T: Clone + PartialEq + Send + 'static>(&mut self, state: &State<T>) {
      let dirty = self.dirty.clone();
      self
         .bindings
         .push(state.subscribe(move |_| dirty.store(true, Ordering::Release)));
   }

   /// Re-renders whenever any stored setting changes.
   pub fn bind_store(&mut self, store: &PreferenceStore) {
      let dirty = self.dirty.clone();
      self
         .bindings
         .push(store.subscribe(move |_| dirty.store(true, Ordering::Release)));
   }

   pub fn unbind_all(&mut self) {
      self.bindings.clear();
   }

   pub fn binding_count(&self) -> usize {
      self.bindings.len()
   }

   pub fn invalidate(&self) {
      self.dirty.store(true, Ordering::Release);
   }

   pub fn is_dirty(&self) -> bool {
      self.dirty.load(Ordering::Acquire)
   }

   pub const fn render_count(&self) -> u64 {
      self.renders
   }

   /// Returns the cached tree, rebuilding it with `build` if stale.
   pub fn render(&mut self, build: impl FnOnce() -> Node) -> &Node {
      let stale = self.dirty.swap(false, Ordering::AcqRel);
      let node = match self.cached.take() {
         Some(node) if !stale => node,
         _ => {
            self.renders += 1;
            build()
         },
      };
      self.cached.insert(node)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_renders_only_when_dirty() {
      let state = State::new(1);
      let mut host = ViewHost::new();
      host.bind(&state);

      let build = |s: &State<i32>| Node::text(s.get().to_string());
      assert_eq!(host.render(|| build(&state)).title(), Some("1"));
      assert_eq!(host.render(|| build(&state)).title(), Some("1"));
      assert_eq!(host.render_count(), 1);

      state.set(2);
      assert!(host.is_dirty());
      assert_eq!(host.render(|| build(&state)).title(), Some("2"));
      assert_eq!(host.render_count(), 2);

      // Setting an equal value does not notify.
      state.set(2);
      host.render(|| build(&state));
      assert_eq!(host.render_count(), 2);

      host.invalidate();
      host.render(|| build(&state));
      assert_eq!(host.render_count(), 3);
   }

   #[test]
   fn test_store_binding() {
      let store = PreferenceStore::in_memory();
      let mut host = ViewHost::new();
      host.bind_store(&store);
      host.render(|| Node::text("x"));
      assert!(!host.is_dirty());

      store.set_bool("disconnect_when_not_wearing", true).unwrap();
      assert!(host.is_dirty());

      host.unbind_all();
      assert_eq!(store.listener_count(), 0);
   }
}
