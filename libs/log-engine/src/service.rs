use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use log_api::{Entry, KvStore, Request, RequestHandler, Response, RpcError};

use crate::allocator::OffsetAllocator;
use crate::archive::MessageArchive;
use crate::commits::CommitTracker;
use crate::config::EngineConfig;
use crate::error::LogError;
use crate::log::LogStore;
use crate::store::TimedStore;

/// The log workload: `send`, `poll`, `commit_offsets`,
/// `list_committed_offsets` over one injected store.
///
/// Holds no topic state of its own besides the allocator's advisory cache;
/// everything authoritative lives in the store.
pub struct LogService {
    allocator: Arc<OffsetAllocator>,
    archive: MessageArchive,
    log: LogStore,
    commits: CommitTracker,
}

impl LogService {
    pub fn new(store: Arc<dyn KvStore>, config: &EngineConfig) -> Result<Self, LogError> {
        config.validate()?;
        let timed = TimedStore::new(store, config.store_timeout());
        let allocator = Arc::new(OffsetAllocator::new(timed.clone(), config.retry_policy()));
        let archive = MessageArchive::new(timed.clone());
        let log = LogStore::new(
            allocator.clone(),
            archive.clone(),
            config.poll_chunk_size,
            config.max_poll_messages,
        )
        .with_cached_bounds(config.poll_cached_bound);
        Ok(Self {
            allocator,
            archive,
            log,
            commits: CommitTracker::new(timed),
        })
    }

    /// Reserve an offset, then store the payload under it.
    ///
    /// If the payload write fails after the reservation succeeded, the
    /// offset stays allocated and reads as a gap.
    pub async fn send(&self, topic: &str, payload: Value) -> Result<u64, LogError> {
        let offset = self.allocator.reserve(topic).await?;
        if let Err(e) = self.archive.write(topic, offset, payload).await {
            tracing::warn!(topic, offset, error = %e, "payload write failed after reservation, leaving gap");
            return Err(e);
        }
        tracing::debug!(topic, offset, "appended");
        Ok(offset)
    }

    pub async fn poll(&self, offsets: &BTreeMap<String, u64>) -> Result<BTreeMap<String, Vec<Entry>>, LogError> {
        self.log.poll(offsets).await
    }

    /// Apply commits one topic at a time.
    ///
    /// Stops at the first failure; commits already applied in this batch
    /// stay applied.
    pub async fn commit_offsets(&self, offsets: &BTreeMap<String, u64>) -> Result<(), LogError> {
        for (applied, (topic, &offset)) in offsets.iter().enumerate() {
            if let Err(e) = self.commits.commit(topic, offset).await {
                tracing::warn!(topic, offset, applied, error = %e, "commit batch aborted partway");
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn list_committed_offsets(&self, topics: &[String]) -> Result<BTreeMap<String, u64>, LogError> {
        self.commits.list(topics).await
    }

    pub async fn execute(&self, request: Request) -> Result<Response, LogError> {
        match request {
            Request::Send { key, msg } => {
                let offset = self.send(&key, msg).await?;
                Ok(Response::SendOk { offset })
            }
            Request::Poll { offsets } => {
                let msgs = self.poll(&offsets).await?;
                Ok(Response::PollOk { msgs })
            }
            Request::CommitOffsets { offsets } => {
                self.commit_offsets(&offsets).await?;
                Ok(Response::CommitOffsetsOk)
            }
            Request::ListCommittedOffsets { keys } => {
                let offsets = self.list_committed_offsets(&keys).await?;
                Ok(Response::ListCommittedOffsetsOk { offsets })
            }
        }
    }
}

/// Decode a raw request body. Unknown `type` tags are reported as
/// unsupported, everything else that fails to decode (a missing or
/// non-string `type` included) as malformed.
pub fn decode_request(body: Value) -> Result<Request, LogError> {
    let Some(kind) = body.get("type").and_then(Value::as_str) else {
        return Err(LogError::Malformed("missing or non-string 'type'".into()));
    };
    if !Request::TYPES.contains(&kind) {
        return Err(LogError::NotSupported(kind.to_string()));
    }
    serde_json::from_value(body).map_err(|e| LogError::Malformed(e.to_string()))
}

impl RequestHandler for LogService {
    fn handle(&self, body: Value) -> Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send + '_>> {
        Box::pin(async move {
            let request = decode_request(body).map_err(LogError::into_rpc_error)?;
            let kind = request.kind();
            let response = self.execute(request).await.map_err(|e| {
                tracing::warn!(request = kind, error = %e, "request failed");
                e.into_rpc_error()
            })?;
            serde_json::to_value(response).map_err(|e| RpcError::crash(format!("encode reply: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storage_memory::MemoryStore;

    use log_api::ErrorCode;

    use super::*;

    fn service() -> LogService {
        LogService::new(Arc::new(MemoryStore::new()), &EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn send_then_poll_round_trip() {
        let svc = service();
        let reply = svc.handle(json!({"type": "send", "msg_id": 1, "key": "k1", "msg": 123})).await.unwrap();
        assert_eq!(reply, json!({"type": "send_ok", "offset": 0}));

        let reply = svc.handle(json!({"type": "poll", "offsets": {"k1": 0}})).await.unwrap();
        assert_eq!(reply, json!({"type": "poll_ok", "msgs": {"k1": [[0, 123]]}}));
    }

    #[tokio::test]
    async fn commit_then_list() {
        let svc = service();
        let reply = svc.handle(json!({"type": "commit_offsets", "offsets": {"k1": 10}})).await.unwrap();
        assert_eq!(reply, json!({"type": "commit_offsets_ok"}));

        let reply = svc
            .handle(json!({"type": "list_committed_offsets", "keys": ["k1", "unknown"]}))
            .await
            .unwrap();
        assert_eq!(reply, json!({"type": "list_committed_offsets_ok", "offsets": {"k1": 10}}));
    }

    #[tokio::test]
    async fn malformed_body_mutates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let svc = LogService::new(store.clone(), &EngineConfig::default()).unwrap();

        let err = svc.handle(json!({"type": "send", "msg": 1})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
        let err = svc.handle(json!({"type": "poll", "offsets": {"k1": 0.5}})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_type_is_not_supported() {
        let err = service().handle(json!({"type": "txn", "txn": []})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }

    #[tokio::test]
    async fn missing_or_non_string_type_is_malformed() {
        let svc = service();
        let err = svc.handle(json!({"msg_id": 1, "key": "k1", "msg": 1})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
        let err = svc.handle(json!({"type": 7})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
        let err = svc.handle(json!("send")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = EngineConfig { max_cas_attempts: 0, ..EngineConfig::default() };
        assert!(LogService::new(Arc::new(MemoryStore::new()), &config).is_err());
    }
}
