#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

mod common;
mod config;
mod error;
mod protocol;
pub mod routing_table;
pub mod storage;
pub mod transport;

pub use crate::common::{Distance, Id, Method, Node, Request, Response, ID_SIZE, MAX_DISTANCE};
pub use bytes::Bytes;
pub use config::{Config, DEFAULT_BUCKET_REFRESH_INTERVAL, DEFAULT_MAX_VALUES};
pub use error::{CallError, Error};
pub use protocol::{should_replicate, PendingCall, Protocol, Replication};
pub use routing_table::{BucketRange, PeerDirectory, RoutingTable};
pub use storage::{MemoryStorage, Storage};
pub use transport::{CallResult, IncomingRequest, MemoryNetwork, MemoryTransport, Transport};

/// Alias for `Result<T, kadnode::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
