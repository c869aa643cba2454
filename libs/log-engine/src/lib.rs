//! Replicated append-only log over a linearizable key-value store.
//!
//! Offsets are allocated with compare-and-swap on a per-topic counter
//! register, payloads live in write-once cells, and consumer progress in
//! per-topic commit pointers. The same engine serves the single-node
//! deployment (in-process store) and the multi-node one (`lin-kv`).

pub mod allocator;
pub mod archive;
pub mod cache;
pub mod commits;
pub mod config;
pub mod error;
pub mod keys;
pub mod log;
pub mod service;
pub mod store;

pub use allocator::{OffsetAllocator, RetryPolicy};
pub use archive::MessageArchive;
pub use commits::CommitTracker;
pub use config::EngineConfig;
pub use error::LogError;
pub use log::LogStore;
pub use service::{decode_request, LogService};
pub use store::TimedStore;
