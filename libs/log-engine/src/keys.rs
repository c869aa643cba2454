//! Store key layout, shared by the single-node and multi-node deployments.

/// Register holding the exclusive upper bound of allocated offsets.
pub fn next_offset(topic: &str) -> String {
    format!("next:{topic}")
}

/// Cell holding the payload written at `offset`.
pub fn message(topic: &str, offset: u64) -> String {
    format!("msg:{topic}:{offset}")
}

/// Consumer commit pointer.
pub fn commit(topic: &str) -> String {
    format!("commit:{topic}")
}
