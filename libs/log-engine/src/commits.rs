use std::collections::BTreeMap;

use serde_json::json;

use log_api::{decode_offset, StoreError};

use crate::error::LogError;
use crate::keys;
use crate::store::TimedStore;

/// Per-topic consumer commit pointers.
///
/// A commit is a plain overwrite: it is neither required to move forward
/// nor checked against the topic's allocated range.
pub struct CommitTracker {
    store: TimedStore,
}

impl CommitTracker {
    pub fn new(store: TimedStore) -> Self {
        Self { store }
    }

    pub async fn commit(&self, topic: &str, offset: u64) -> Result<(), LogError> {
        let key = keys::commit(topic);
        self.store
            .write(&key, json!(offset))
            .await
            .map_err(|e| LogError::store("write", &key, e))
    }

    /// Recorded pointers for `topics`; topics without one are omitted.
    pub async fn list(&self, topics: &[String]) -> Result<BTreeMap<String, u64>, LogError> {
        let mut offsets = BTreeMap::new();
        for topic in topics {
            let key = keys::commit(topic);
            match self.store.read(&key).await {
                Ok(value) => {
                    let offset = decode_offset(&value)
                        .map_err(|detail| LogError::InvalidValue { key: key.clone(), detail })?;
                    offsets.insert(topic.clone(), offset);
                }
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(LogError::store("read", &key, e)),
            }
        }
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use storage_memory::MemoryStore;

    use super::*;

    fn tracker() -> CommitTracker {
        CommitTracker::new(TimedStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn unknown_topics_are_omitted() {
        let commits = tracker();
        commits.commit("k1", 10).await.unwrap();

        let listed = commits.list(&["k1".into(), "unknown".into()]).await.unwrap();
        assert_eq!(listed, BTreeMap::from([("k1".to_string(), 10)]));
    }

    #[tokio::test]
    async fn commit_pointer_may_move_backwards() {
        let commits = tracker();
        commits.commit("k1", 10).await.unwrap();
        commits.commit("k1", 3).await.unwrap();

        let listed = commits.list(&["k1".into()]).await.unwrap();
        assert_eq!(listed.get("k1"), Some(&3));
    }
}
