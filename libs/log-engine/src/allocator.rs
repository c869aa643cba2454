use std::time::Duration;

use serde_json::{json, Value};

use log_api::{decode_offset, StoreError};

use crate::cache::OffsetCache;
use crate::error::LogError;
use crate::keys;
use crate::store::TimedStore;

/// Bounds the optimistic CAS loop of [`OffsetAllocator::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// CAS attempts allowed per reservation, the cached fast path included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before the `retry`-th contended retry (1-based): base doubled
    /// per retry, capped at `backoff_max`.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Allocates per-topic offsets on a linearizable register.
///
/// Each topic's register (`next:<topic>`) holds the exclusive upper bound of
/// offsets handed out so far. An offset is claimed by CAS-ing the register
/// from `v` to `v + 1`; whoever wins the CAS owns `v`. Losing a CAS means
/// another caller advanced the register, so the loop re-reads and tries
/// again, up to [`RetryPolicy::max_attempts`] CAS attempts.
pub struct OffsetAllocator {
    store: TimedStore,
    cache: OffsetCache,
    retry: RetryPolicy,
}

impl OffsetAllocator {
    pub fn new(store: TimedStore, retry: RetryPolicy) -> Self {
        Self {
            store,
            cache: OffsetCache::new(),
            retry,
        }
    }

    /// Claim the next offset of `topic`.
    ///
    /// The returned offset equals the register value immediately before
    /// this call's successful CAS, so no two calls anywhere ever receive
    /// the same offset for a topic.
    pub async fn reserve(&self, topic: &str) -> Result<u64, LogError> {
        let key = keys::next_offset(topic);
        let mut attempts = 0u32;

        // Fast path: trust the cache and skip the read round trip.
        if let Some(cached) = self.cache.get(topic) {
            attempts += 1;
            if self.try_claim(&key, topic, Some((cached, json!(cached)))).await? {
                return Ok(cached);
            }
            tracing::debug!(topic, cached, "cached offset is stale, reading register");
        }

        let mut retries = 0u32;
        loop {
            if attempts >= self.retry.max_attempts {
                tracing::warn!(topic, attempts, "offset reservation retry limit reached");
                return Err(LogError::RetryExhausted {
                    topic: topic.to_string(),
                    attempts,
                });
            }
            if retries > 0 {
                let delay = self.retry.delay(retries);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            // Keep the register value as read: the CAS must expect that
            // exact representation, not our canonical re-encoding of it.
            let observed = match self.store.read(&key).await {
                Ok(value) => Some((decode_counter(&key, &value)?, value)),
                Err(StoreError::NotFound) => None,
                Err(e) => return Err(LogError::store("read", &key, e)),
            };
            let current = observed.as_ref().map(|(v, _)| *v);

            attempts += 1;
            if self.try_claim(&key, topic, observed).await? {
                return Ok(current.unwrap_or(0));
            }
            retries += 1;
            tracing::debug!(topic, ?current, attempts, "offset CAS lost, retrying");
        }
    }

    /// Exclusive upper bound of allocated offsets for `topic`, or `None` if
    /// the topic was never allocated from.
    ///
    /// Served from the cache while it still covers something at or after
    /// `from`; once a reader has caught up with the cached bound the
    /// register is read (and cached) instead, so appends made by other
    /// nodes become visible to a reader that keeps moving forward.
    pub async fn upper_bound(&self, topic: &str, from: u64) -> Result<Option<u64>, LogError> {
        match self.cache.get(topic) {
            Some(cached) if cached > from => Ok(Some(cached)),
            _ => self.fresh_upper_bound(topic).await,
        }
    }

    /// Like [`upper_bound`](Self::upper_bound) but always reads the register.
    pub async fn fresh_upper_bound(&self, topic: &str) -> Result<Option<u64>, LogError> {
        let key = keys::next_offset(topic);
        match self.store.read(&key).await {
            Ok(value) => {
                let bound = decode_counter(&key, &value)?;
                self.cache.observe(topic, bound);
                Ok(Some(bound))
            }
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(LogError::store("read", &key, e)),
        }
    }

    /// Last confirmed counter value this node has seen for `topic`.
    pub fn cached(&self, topic: &str) -> Option<u64> {
        self.cache.get(topic)
    }

    /// One CAS attempt moving the register from `current` to `current + 1`
    /// (`None` = register absent, create it at 1). `current` pairs the
    /// decoded counter with the value the CAS expects to find.
    ///
    /// `Ok(false)` means the attempt lost to a concurrent writer. The cache
    /// is only touched after a confirmed success.
    async fn try_claim(&self, key: &str, topic: &str, current: Option<(u64, Value)>) -> Result<bool, LogError> {
        let (expected, create, offset) = match current {
            Some((v, raw)) => (Some(raw), false, v),
            None => (None, true, 0),
        };
        match self.store.compare_and_swap(key, expected, json!(offset + 1), create).await {
            Ok(()) => {
                self.cache.observe(topic, offset + 1);
                Ok(true)
            }
            // NotFound can only answer a non-creating CAS; re-reading
            // takes the creation branch.
            Err(StoreError::PreconditionFailed | StoreError::NotFound) => Ok(false),
            Err(e) => Err(LogError::store("cas", key, e)),
        }
    }
}

fn decode_counter(key: &str, value: &Value) -> Result<u64, LogError> {
    decode_offset(value).map_err(|detail| LogError::InvalidValue {
        key: key.to_string(),
        detail,
    })
}
