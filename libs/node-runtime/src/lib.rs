//! Line-delimited JSON node runtime: init handshake, request dispatch,
//! reply correlation and outbound RPC.

pub mod error;
pub mod kv;
pub mod message;
pub mod node;

pub use error::RuntimeError;
pub use kv::{LinKvStore, LIN_KV};
pub use message::Message;
pub use node::{write_outbound, Identity, Node};
