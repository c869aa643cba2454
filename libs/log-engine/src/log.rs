use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use log_api::Entry;

use crate::allocator::OffsetAllocator;
use crate::archive::MessageArchive;
use crate::error::LogError;

/// Range reads over all topics.
///
/// Scans are bound-aware and gap-tolerant: every offset in
/// `[start, upper_bound)` is read and missing cells are skipped, so a gap
/// never hides entries written after it.
pub struct LogStore {
    allocator: Arc<OffsetAllocator>,
    archive: MessageArchive,
    chunk_size: usize,
    max_messages: Option<usize>,
    cached_bounds: bool,
}

impl LogStore {
    pub fn new(
        allocator: Arc<OffsetAllocator>,
        archive: MessageArchive,
        chunk_size: usize,
        max_messages: Option<usize>,
    ) -> Self {
        Self {
            allocator,
            archive,
            chunk_size: chunk_size.max(1),
            max_messages,
            cached_bounds: true,
        }
    }

    /// When off, every poll reads each topic's register instead of serving
    /// the bound from the allocator cache.
    pub fn with_cached_bounds(mut self, enabled: bool) -> Self {
        self.cached_bounds = enabled;
        self
    }

    /// Entries at or after each requested start offset, in offset order.
    ///
    /// Topics never allocated from, and topics with nothing in range, are
    /// left out of the result.
    pub async fn poll(
        &self,
        offsets: &BTreeMap<String, u64>,
    ) -> Result<BTreeMap<String, Vec<Entry>>, LogError> {
        let mut msgs = BTreeMap::new();
        for (topic, &start) in offsets {
            let bound = if self.cached_bounds {
                self.allocator.upper_bound(topic, start).await?
            } else {
                self.allocator.fresh_upper_bound(topic).await?
            };
            let Some(bound) = bound else {
                continue;
            };
            let entries = self.scan(topic, start, bound).await?;
            if !entries.is_empty() {
                msgs.insert(topic.clone(), entries);
            }
        }
        Ok(msgs)
    }

    /// Read `[start, bound)` chunk by chunk; offsets within a chunk are
    /// read concurrently and put back in order before the next chunk.
    async fn scan(&self, topic: &str, start: u64, bound: u64) -> Result<Vec<Entry>, LogError> {
        let mut entries = Vec::new();
        let mut chunk_start = start;

        while chunk_start < bound {
            let chunk_end = bound.min(chunk_start.saturating_add(self.chunk_size as u64));

            let mut reads = JoinSet::new();
            for offset in chunk_start..chunk_end {
                let archive = self.archive.clone();
                let topic = topic.to_string();
                reads.spawn(async move { (offset, archive.read(&topic, offset).await) });
            }

            let mut chunk = Vec::with_capacity((chunk_end - chunk_start) as usize);
            while let Some(joined) = reads.join_next().await {
                let (offset, read) = joined?;
                if let Some(payload) = read? {
                    chunk.push((offset, payload));
                }
            }
            chunk.sort_unstable_by_key(|(offset, _)| *offset);
            entries.extend(chunk);

            if let Some(max) = self.max_messages {
                if entries.len() >= max {
                    entries.truncate(max);
                    break;
                }
            }
            chunk_start = chunk_end;
        }

        tracing::trace!(topic, start, bound, found = entries.len(), "scanned topic");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use storage_memory::MemoryStore;

    use super::*;
    use crate::allocator::RetryPolicy;
    use crate::store::TimedStore;

    fn log_store(store: Arc<MemoryStore>, chunk_size: usize, max: Option<usize>) -> LogStore {
        let timed = TimedStore::new(store, Duration::from_secs(1));
        let retry = RetryPolicy {
            max_attempts: 10,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        };
        let allocator = Arc::new(OffsetAllocator::new(timed.clone(), retry));
        LogStore::new(allocator, MessageArchive::new(timed), chunk_size, max)
    }

    async fn seed(store: &MemoryStore, topic: &str, bound: u64, present: &[u64]) {
        use log_api::KvStore;
        store.write(&format!("next:{topic}"), json!(bound)).await.unwrap();
        for &offset in present {
            store.write(&format!("msg:{topic}:{offset}"), json!(offset * 10)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn skips_gaps_and_keeps_scanning() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "k1", 8, &[5, 7]).await;
        let log = log_store(store, 5, None);

        let msgs = log.poll(&BTreeMap::from([("k1".to_string(), 5)])).await.unwrap();
        assert_eq!(msgs["k1"], vec![(5, json!(50)), (7, json!(70))]);
    }

    #[tokio::test]
    async fn chunk_size_does_not_change_result() {
        let store = Arc::new(MemoryStore::new());
        let present: Vec<u64> = (0..23).filter(|o| o % 3 != 1).collect();
        seed(&store, "k1", 23, &present).await;

        let request = BTreeMap::from([("k1".to_string(), 2)]);
        let expected: Vec<Entry> = present.iter().filter(|&&o| o >= 2).map(|&o| (o, json!(o * 10))).collect();
        for chunk_size in [1, 2, 5, 7, 64] {
            let log = log_store(store.clone(), chunk_size, None);
            let msgs = log.poll(&request).await.unwrap();
            assert_eq!(msgs["k1"], expected, "chunk size {chunk_size}");
        }
    }

    #[tokio::test]
    async fn omits_unknown_and_empty_topics() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "k1", 3, &[0, 1, 2]).await;
        let log = log_store(store, 5, None);

        let request = BTreeMap::from([
            ("k1".to_string(), 3),
            ("missing".to_string(), 0),
        ]);
        assert!(log.poll(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uncached_bounds_pick_up_later_appends() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "k1", 1, &[0]).await;
        let cached = log_store(store.clone(), 5, None);
        let fresh = log_store(store.clone(), 5, None).with_cached_bounds(false);

        let request = BTreeMap::from([("k1".to_string(), 0)]);
        assert_eq!(cached.poll(&request).await.unwrap()["k1"].len(), 1);
        assert_eq!(fresh.poll(&request).await.unwrap()["k1"].len(), 1);

        // Another node appends offset 1.
        seed(&store, "k1", 2, &[1]).await;
        assert_eq!(cached.poll(&request).await.unwrap()["k1"].len(), 1);
        assert_eq!(fresh.poll(&request).await.unwrap()["k1"].len(), 2);
    }

    #[tokio::test]
    async fn caught_up_reader_refreshes_cached_bound() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "k1", 1, &[0]).await;
        let log = log_store(store.clone(), 5, None);

        let from_zero = BTreeMap::from([("k1".to_string(), 0)]);
        assert_eq!(log.poll(&from_zero).await.unwrap()["k1"], vec![(0, json!(0))]);

        // Another node appends 1 and 2; polling past the cached bound sees them.
        seed(&store, "k1", 3, &[1, 2]).await;
        let from_one = BTreeMap::from([("k1".to_string(), 1)]);
        let msgs = log.poll(&from_one).await.unwrap();
        assert_eq!(msgs["k1"], vec![(1, json!(10)), (2, json!(20))]);

        // The refreshed bound is cached for later polls from earlier offsets.
        assert_eq!(log.poll(&from_zero).await.unwrap()["k1"].len(), 3);
    }

    #[tokio::test]
    async fn max_messages_truncates_tail_only() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "k1", 10, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).await;
        let log = log_store(store, 3, Some(4));

        let msgs = log.poll(&BTreeMap::from([("k1".to_string(), 1)])).await.unwrap();
        let offsets: Vec<u64> = msgs["k1"].iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4]);
    }
}
