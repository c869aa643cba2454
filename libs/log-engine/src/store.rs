use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use log_api::{KvStore, StoreError};

/// `KvStore` handle that bounds every call by a deadline.
///
/// A call that misses the deadline resolves to `StoreError::Timeout`; the
/// remote effect, if any, is unknown.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn KvStore>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub async fn read(&self, key: &str) -> Result<Value, StoreError> {
        self.bounded(self.inner.read(key)).await
    }

    pub async fn write(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.bounded(self.inner.write(key, value)).await
    }

    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Value,
        create_if_absent: bool,
    ) -> Result<(), StoreError> {
        self.bounded(self.inner.compare_and_swap(key, expected, new, create_if_absent))
            .await
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}
