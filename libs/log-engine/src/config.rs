use std::time::Duration;

use serde::Deserialize;

use crate::allocator::RetryPolicy;
use crate::error::LogError;

/// Engine tuning, read from the `[engine]` table of the node config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Deadline for every individual store call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Upper bound on compare-and-swap attempts per `reserve`.
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,

    /// First backoff delay after a contended CAS; doubles per retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Offsets read concurrently per poll chunk.
    #[serde(default = "default_poll_chunk_size")]
    pub poll_chunk_size: usize,

    /// Cap on entries returned per topic in one poll. Unlimited if unset.
    #[serde(default)]
    pub max_poll_messages: Option<usize>,

    /// Serve poll bounds from the allocator cache while the cached bound is
    /// past the requested start. Turning this off costs one register read
    /// per polled topic on every poll.
    #[serde(default = "default_poll_cached_bound")]
    pub poll_cached_bound: bool,
}

fn default_store_timeout_ms() -> u64 {
    1000
}
fn default_max_cas_attempts() -> u32 {
    100
}
fn default_backoff_base_ms() -> u64 {
    1
}
fn default_backoff_max_ms() -> u64 {
    50
}
fn default_poll_chunk_size() -> usize {
    5
}
fn default_poll_cached_bound() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            max_cas_attempts: default_max_cas_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            poll_chunk_size: default_poll_chunk_size(),
            max_poll_messages: None,
            poll_cached_bound: default_poll_cached_bound(),
        }
    }
}

impl EngineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_cas_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        if self.store_timeout_ms == 0 {
            return Err(LogError::Config("store_timeout_ms must be positive".into()));
        }
        if self.max_cas_attempts == 0 {
            return Err(LogError::Config("max_cas_attempts must be positive".into()));
        }
        if self.poll_chunk_size == 0 {
            return Err(LogError::Config("poll_chunk_size must be positive".into()));
        }
        if self.max_poll_messages == Some(0) {
            return Err(LogError::Config("max_poll_messages must be positive when set".into()));
        }
        Ok(())
    }
}
