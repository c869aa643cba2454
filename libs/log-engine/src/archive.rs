use serde_json::Value;

use log_api::StoreError;

use crate::error::LogError;
use crate::keys;
use crate::store::TimedStore;

/// Write-once payload cells addressed by `(topic, offset)`.
///
/// Writes are unconditional: the offset was already uniquely reserved.
/// A missing cell is a gap (reservation landed, payload write did not,
/// or not yet), never corruption.
#[derive(Clone)]
pub struct MessageArchive {
    store: TimedStore,
}

impl MessageArchive {
    pub fn new(store: TimedStore) -> Self {
        Self { store }
    }

    pub async fn write(&self, topic: &str, offset: u64, payload: Value) -> Result<(), LogError> {
        let key = keys::message(topic, offset);
        self.store
            .write(&key, payload)
            .await
            .map_err(|e| LogError::store("write", &key, e))
    }

    /// Payload at `offset`, or `None` for a gap.
    pub async fn read(&self, topic: &str, offset: u64) -> Result<Option<Value>, LogError> {
        let key = keys::message(topic, offset);
        match self.store.read(&key).await {
            Ok(payload) => Ok(Some(payload)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(LogError::store("read", &key, e)),
        }
    }
}
