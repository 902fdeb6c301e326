// src/store/locks.rs

//! Per-key writer locks.
//!
//! Engines that implement `append` as read-modify-write (files, redis) take
//! the lock for one key only, so writers to distinct keys never wait on each
//! other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `key`. Callers hold `handle.lock()` for the duration
    /// of the write.
    pub fn for_key(&self, key: &str) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(table.entry(key.to_string()).or_default())
    }

    /// Run `f` while holding the writer lock for `key`.
    pub fn with_key<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.for_key(key);
        let _guard = handle.lock().unwrap_or_else(|p| p.into_inner());
        f()
    }
}
