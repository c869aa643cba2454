use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::RpcError;

/// Service that answers client requests delivered by the node runtime.
///
/// Receives the raw request body (including `type` and `msg_id`) and returns
/// the reply body. The runtime adds correlation fields (`in_reply_to`) and
/// encodes `Err` as an error body.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, body: Value) -> Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send + '_>>;
}
