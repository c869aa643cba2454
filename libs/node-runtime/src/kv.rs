use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use log_api::{ErrorCode, KvStore, StoreError};

use crate::error::RuntimeError;
use crate::node::Node;

/// Name of the harness's linearizable key-value service.
pub const LIN_KV: &str = "lin-kv";

/// `KvStore` backed by RPCs to a harness key-value service.
pub struct LinKvStore {
    node: Arc<Node>,
    service: String,
    timeout: Duration,
}

impl LinKvStore {
    pub fn new(node: Arc<Node>, timeout: Duration) -> Self {
        Self::with_service(node, LIN_KV, timeout)
    }

    pub fn with_service(node: Arc<Node>, service: impl Into<String>, timeout: Duration) -> Self {
        Self {
            node,
            service: service.into(),
            timeout,
        }
    }

    async fn call(&self, body: Value) -> Result<Value, StoreError> {
        self.node
            .rpc(&self.service, body, self.timeout)
            .await
            .map_err(into_store_error)
    }
}

fn into_store_error(err: RuntimeError) -> StoreError {
    match err {
        RuntimeError::Rpc(e) => match e.code() {
            ErrorCode::KeyDoesNotExist => StoreError::NotFound,
            ErrorCode::PreconditionFailed => StoreError::PreconditionFailed,
            ErrorCode::Timeout => StoreError::Timeout,
            _ => StoreError::Unavailable(e.to_string()),
        },
        RuntimeError::Timeout { .. } => StoreError::Timeout,
        other => StoreError::Unavailable(other.to_string()),
    }
}

impl KvStore for LinKvStore {
    fn read(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Value, StoreError>> + Send + '_>> {
        let body = json!({"type": "read", "key": key});
        Box::pin(async move {
            let mut reply = self.call(body).await?;
            match reply.get_mut("value") {
                Some(value) => Ok(value.take()),
                None => Err(StoreError::unavailable("read_ok without value")),
            }
        })
    }

    fn write(&self, key: &str, value: Value) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let body = json!({"type": "write", "key": key, "value": value});
        Box::pin(async move {
            self.call(body).await?;
            Ok(())
        })
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Value,
        create_if_absent: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let body = json!({
            "type": "cas",
            "key": key,
            "from": expected.unwrap_or(Value::Null),
            "to": new,
            "create_if_not_exists": create_if_absent,
        });
        Box::pin(async move {
            self.call(body).await?;
            Ok(())
        })
    }
}
