//! Observable state cells.
//!
//! A [`State`] holds a value and notifies every attached observer after the
//! value changes. Views bind to cells and recompute when notified.

use std::{
   fmt,
   sync::{
      Arc,
      atomic::{AtomicU64, Ordering},
   },
};

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Guard for a registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a subscription unregisters the listener"]
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

impl Subscription {
   pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
      Self(Some(Box::new(cancel)))
   }

   /// Unregisters the listener now.
   pub fn cancel(self) {
      drop(self);
   }
}

impl Drop for Subscription {
   fn drop(&mut self) {
      if let Some(cancel) = self.0.take() {
         cancel();
      }
   }
}

impl fmt::Debug for Subscription {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Subscription")
         .field("active", &self.0.is_some())
         .finish()
   }
}

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct StateInner<T> {
   value: Mutex<T>,
   observers: Mutex<Vec<(u64, Observer<T>)>>,
   next_id: AtomicU64,
}

/// Observable value cell.
///
/// This type is cheaply cloneable; clones share the same value and
/// observers.
pub struct State<T>(Arc<StateInner<T>>);

impl<T> Clone for State<T> {
   fn clone(&self) -> Self {
      Self(self.0.clone())
   }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("State").field(&*self.0.value.lock()).finish()
   }
}

impl<T: Default + Clone + PartialEq + Send + 'static> Default for State<T> {
   fn default() -> Self {
      Self::new(T::default())
   }
}

impl<T: Clone + PartialEq + Send + 'static> State<T> {
   pub fn new(value: T) -> Self {
      Self(Arc::new(StateInner {
         value: Mutex::new(value),
         observers: Mutex::new(Vec::new()),
         next_id: AtomicU64::new(0),
      }))
   }

   /// Returns a copy of the current value.
   pub fn get(&self) -> T {
      self.0.value.lock().clone()
   }

   pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
      f(&self.0.value.lock())
   }

   /// Replaces the value. Observers run only if the value changed.
   ///
   /// Returns whether the value changed.
   pub fn set(&self, value: T) -> bool {
      {
         let mut lock = self.0.value.lock();
         if *lock == value {
            return false;
         }
         *lock = value.clone();
      }
      self.notify(&value);
      true
   }

   /// Mutates the value in place, notifying observers if it changed.
   pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
      let new = {
         let mut lock = self.0.value.lock();
         let mut next = lock.clone();
         f(&mut next);
         if *lock == next {
            return false;
         }
         *lock = next.clone();
         next
      };
      self.notify(&new);
      true
   }

   /// Attaches an observer that runs after every change.
   pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
      let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
      self.0.observers.lock().push((id, Arc::new(observer)));

      let weak = Arc::downgrade(&self.0);
      Subscription::new(move || {
         if let Some(inner) = weak.upgrade() {
            inner.observers.lock().retain(|(i, _)| *i != id);
         }
      })
   }

   pub fn observer_count(&self) -> usize {
      self.0.observers.lock().len()
   }

   fn notify(&self, value: &T) {
      // Observers may subscribe or set other cells; never call them under the lock.
      let observers: SmallVec<[Observer<T>; 4]> = self
         .0
         .observers
         .lock()
         .iter()
         .map(|(_, o)| o.clone())
         .collect();
      for observer in observers {
         observer(value);
      }
   }
}
