use log_api::RpcError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rpc to '{dest}' (msg_id {msg_id}) timed out")]
    Timeout { dest: String, msg_id: u64 },

    #[error("outbound channel closed")]
    Closed,

    #[error("remote error: {0}")]
    Rpc(RpcError),
}
