use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Outcome of a failed store call.
///
/// `NotFound` and `PreconditionFailed` are ordinary answers from a healthy
/// store; `Timeout` and `Unavailable` mean the call's effect is unknown.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    PreconditionFailed,
    Timeout,
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => f.write_str("key does not exist"),
            StoreError::PreconditionFailed => f.write_str("precondition failed"),
            StoreError::Timeout => f.write_str("store call timed out"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Linearizable key-value store.
///
/// Every operation on a single key appears to take effect atomically at
/// some point between its call and its return. Implementations: in-process
/// table (single-node), RPC client for the harness `lin-kv` service.
pub trait KvStore: Send + Sync {
    /// Read the current value. `NotFound` if the key was never written.
    fn read(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Value, StoreError>> + Send + '_>>;

    /// Unconditionally set the value.
    fn write(&self, key: &str, value: Value) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Set `key` to `new` only if its current value equals `expected`.
    ///
    /// - key absent, `create_if_absent` → created with `new` regardless of `expected`
    /// - key absent, otherwise → `NotFound`
    /// - key present, value differs from `expected` (or `expected` is `None`)
    ///   → `PreconditionFailed`
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Value,
        create_if_absent: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}
