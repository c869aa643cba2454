use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Advisory per-topic copy of the last observed NextOffsetCounter.
///
/// Only ever fed confirmed values (successful read or CAS) and only moves
/// forward. The lock covers the map access alone and is never held across
/// a store call.
#[derive(Debug, Default)]
pub struct OffsetCache {
    entries: RwLock<HashMap<String, u64>>,
}

impl OffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topic: &str) -> Option<u64> {
        self.shared().get(topic).copied()
    }

    /// Record a confirmed counter value; older observations are ignored.
    pub fn observe(&self, topic: &str, next_offset: u64) {
        let mut entries = self.exclusive();
        match entries.get_mut(topic) {
            Some(cached) if *cached >= next_offset => {}
            Some(cached) => *cached = next_offset,
            None => {
                entries.insert(topic.to_string(), next_offset);
            }
        }
    }

    fn shared(&self) -> RwLockReadGuard<'_, HashMap<String, u64>> {
        match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("offset cache read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, HashMap<String, u64>> {
        match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("offset cache write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
