use log_api::{ErrorCode, RpcError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unsupported request type '{0}'")]
    NotSupported(String),

    #[error("store {op} on '{key}': {source}")]
    Store {
        op: &'static str,
        key: String,
        source: StoreError,
    },

    #[error("store {op} on '{key}' timed out")]
    Timeout { op: &'static str, key: String },

    #[error("offset reservation for topic '{topic}' gave up after {attempts} contended attempts")]
    RetryExhausted { topic: String, attempts: u32 },

    #[error("invalid value at '{key}': {detail}")]
    InvalidValue { key: String, detail: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LogError {
    /// Classify a failed store call. Timeouts get their own variant so the
    /// caller can tell "outcome unknown, deadline hit" from a store fault.
    pub fn store(op: &'static str, key: &str, source: StoreError) -> Self {
        match source {
            StoreError::Timeout => LogError::Timeout { op, key: key.to_string() },
            source => LogError::Store { op, key: key.to_string(), source },
        }
    }

    /// Convert to the error body sent back to the client.
    ///
    /// Store faults and timeouts are indefinite: a CAS may have been applied
    /// before the failure was observed, burning an offset that then shows up
    /// as a permanent gap.
    pub fn into_rpc_error(self) -> RpcError {
        let code = match &self {
            LogError::Malformed(_) => ErrorCode::MalformedRequest,
            LogError::NotSupported(_) => ErrorCode::NotSupported,
            LogError::Timeout { .. } => ErrorCode::Timeout,
            LogError::RetryExhausted { .. } => ErrorCode::Abort,
            LogError::Store { .. }
            | LogError::InvalidValue { .. }
            | LogError::Config(_)
            | LogError::Task(_) => ErrorCode::Crash,
        };
        RpcError::new(code, self.to_string())
    }
}
