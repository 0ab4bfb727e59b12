//! Persistent settings.
//!
//! This module contains the file-backed preference store and the typed keys
//! the companion reads and writes.

pub mod keys;
pub mod store;
