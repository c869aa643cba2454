//! Contracts shared by the log engine, the node runtime and store backends.

pub mod error;
pub mod handler;
pub mod protocol;
pub mod store;
pub mod util;

pub use error::{ErrorCode, RpcError};
pub use handler::RequestHandler;
pub use protocol::{Entry, Request, Response};
pub use store::{KvStore, StoreError};
pub use util::decode_offset;
