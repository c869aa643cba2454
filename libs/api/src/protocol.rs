use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ════════════════════════════════════════════════════════════════
//  Log workload requests
// ════════════════════════════════════════════════════════════════

/// Client request body, tagged by `type`.
///
/// Offsets decode strictly as `u64`: negative or fractional numbers are
/// rejected by serde rather than coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Append `msg` to the log named `key`.
    Send { key: String, msg: Value },
    /// Read every log in `offsets` starting at the given offset.
    Poll { offsets: BTreeMap<String, u64> },
    /// Record consumer progress per log.
    CommitOffsets { offsets: BTreeMap<String, u64> },
    /// Look up recorded consumer progress.
    ListCommittedOffsets { keys: Vec<String> },
}

impl Request {
    /// Every `type` tag this enum accepts.
    pub const TYPES: [&'static str; 4] = ["send", "poll", "commit_offsets", "list_committed_offsets"];

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Send { .. } => "send",
            Request::Poll { .. } => "poll",
            Request::CommitOffsets { .. } => "commit_offsets",
            Request::ListCommittedOffsets { .. } => "list_committed_offsets",
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Replies
// ════════════════════════════════════════════════════════════════

/// One log entry on the wire: `[offset, payload]`.
pub type Entry = (u64, Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    SendOk { offset: u64 },
    PollOk { msgs: BTreeMap<String, Vec<Entry>> },
    CommitOffsetsOk,
    ListCommittedOffsetsOk { offsets: BTreeMap<String, u64> },
}
