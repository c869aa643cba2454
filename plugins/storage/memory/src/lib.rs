use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use log_api::{KvStore, StoreError};

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

/// In-process linearizable store for the single-node deployment.
///
/// One table behind one read/write lock: `read` takes shared access,
/// `write` and `compare_and_swap` take exclusive access. The guard covers
/// only the map lookup or mutation and is dropped before the future
/// completes, so it is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.shared().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared().is_empty()
    }

    fn shared(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        match self.table.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory store read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        match self.table.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory store write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn cas_locked(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
        create_if_absent: bool,
    ) -> Result<(), StoreError> {
        let mut table = self.exclusive();
        match table.get_mut(key) {
            None if create_if_absent => {
                table.insert(key.to_string(), new);
                Ok(())
            }
            None => Err(StoreError::NotFound),
            Some(current) => match expected {
                Some(exp) if exp == current => {
                    *current = new;
                    Ok(())
                }
                _ => Err(StoreError::PreconditionFailed),
            },
        }
    }
}

impl KvStore for MemoryStore {
    fn read(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Value, StoreError>> + Send + '_>> {
        let result = self.shared().get(key).cloned().ok_or(StoreError::NotFound);
        Box::pin(async move { result })
    }

    fn write(&self, key: &str, value: Value) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        self.exclusive().insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Value,
        create_if_absent: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let result = self.cas_locked(key, expected.as_ref(), new, create_if_absent);
        Box::pin(async move { result })
    }
}
