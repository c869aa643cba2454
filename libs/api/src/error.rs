use serde_json::{json, Value};

/// Numeric error codes understood by the test harness.
///
/// Definite codes promise the operation did not happen; indefinite ones
/// (timeout, crash) leave the outcome unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Timeout,
    NodeNotFound,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Abort,
    KeyDoesNotExist,
    KeyAlreadyExists,
    PreconditionFailed,
    TxnConflict,
    /// Any code this node does not know by name.
    Other(u64),
}

impl ErrorCode {
    pub fn code(self) -> u64 {
        match self {
            ErrorCode::Timeout => 0,
            ErrorCode::NodeNotFound => 1,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::KeyDoesNotExist => 20,
            ErrorCode::KeyAlreadyExists => 21,
            ErrorCode::PreconditionFailed => 22,
            ErrorCode::TxnConflict => 30,
            ErrorCode::Other(code) => code,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            0 => ErrorCode::Timeout,
            1 => ErrorCode::NodeNotFound,
            10 => ErrorCode::NotSupported,
            11 => ErrorCode::TemporarilyUnavailable,
            12 => ErrorCode::MalformedRequest,
            13 => ErrorCode::Crash,
            14 => ErrorCode::Abort,
            20 => ErrorCode::KeyDoesNotExist,
            21 => ErrorCode::KeyAlreadyExists,
            22 => ErrorCode::PreconditionFailed,
            30 => ErrorCode::TxnConflict,
            other => ErrorCode::Other(other),
        }
    }

    pub fn is_definite(self) -> bool {
        !matches!(self, ErrorCode::Timeout | ErrorCode::Crash | ErrorCode::Other(_))
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Timeout => f.write_str("timeout"),
            ErrorCode::NodeNotFound => f.write_str("node-not-found"),
            ErrorCode::NotSupported => f.write_str("not-supported"),
            ErrorCode::TemporarilyUnavailable => f.write_str("temporarily-unavailable"),
            ErrorCode::MalformedRequest => f.write_str("malformed-request"),
            ErrorCode::Crash => f.write_str("crash"),
            ErrorCode::Abort => f.write_str("abort"),
            ErrorCode::KeyDoesNotExist => f.write_str("key-does-not-exist"),
            ErrorCode::KeyAlreadyExists => f.write_str("key-already-exists"),
            ErrorCode::PreconditionFailed => f.write_str("precondition-failed"),
            ErrorCode::TxnConflict => f.write_str("txn-conflict"),
            ErrorCode::Other(code) => write!(f, "error-{code}"),
        }
    }
}

/// Error carried in an `{"type": "error"}` body, in either direction.
#[derive(Clone, PartialEq)]
pub struct RpcError {
    code: ErrorCode,
    text: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self { code, text: text.into() }
    }

    pub fn malformed(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRequest, text)
    }

    pub fn not_supported(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, text)
    }

    pub fn crash(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::Crash, text)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse an error reply body. Returns `None` if the body is not an error.
    pub fn from_body(body: &Value) -> Option<Self> {
        if body.get("type").and_then(Value::as_str) != Some("error") {
            return None;
        }
        let code = body.get("code").and_then(Value::as_u64).unwrap_or(ErrorCode::Crash.code());
        let text = body.get("text").and_then(Value::as_str).unwrap_or_default();
        Some(Self::new(ErrorCode::from_code(code), text))
    }

    /// Encode as a reply body (without correlation fields).
    pub fn to_body(&self) -> Value {
        json!({
            "type": "error",
            "code": self.code.code(),
            "text": self.text,
        })
    }
}

impl std::fmt::Debug for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} ({})] {}", self.code, self.code.code(), self.text)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.text)
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip_through_numbers() {
        for code in [0, 1, 10, 11, 12, 13, 14, 20, 21, 22, 30] {
            assert_eq!(ErrorCode::from_code(code).code(), code);
        }
        assert_eq!(ErrorCode::from_code(99), ErrorCode::Other(99));
    }

    #[test]
    fn timeout_and_crash_are_indefinite() {
        assert!(!ErrorCode::Timeout.is_definite());
        assert!(!ErrorCode::Crash.is_definite());
        assert!(ErrorCode::Abort.is_definite());
        assert!(ErrorCode::PreconditionFailed.is_definite());
    }

    #[test]
    fn error_body_parses_back() {
        let err = RpcError::new(ErrorCode::KeyDoesNotExist, "no such key");
        let body = err.to_body();
        assert_eq!(body["type"], "error");
        assert_eq!(body["code"], 20);
        assert_eq!(RpcError::from_body(&body), Some(err));
    }

    #[test]
    fn non_error_body_is_not_an_error() {
        assert_eq!(RpcError::from_body(&json!({"type": "read_ok", "value": 1})), None);
    }
}
