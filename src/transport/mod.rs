//! RPC transport consumed by the protocol.
//!
//! A transport correlates requests with responses and enforces a per-call
//! timeout. The protocol only sees typed [Request]s and [Response]s.

mod inflight;
mod memory;

use std::net::SocketAddr;

use crate::common::{Request, Response};
use crate::error::CallError;

pub use memory::{MemoryNetwork, MemoryTransport, DEFAULT_REQUEST_TIMEOUT};

/// Outcome of an outbound call.
pub type CallResult = Result<Response, CallError>;

#[derive(Debug, Clone, PartialEq)]
/// A request received from a remote node, waiting for [Transport::respond].
pub struct IncomingRequest {
    pub from: SocketAddr,
    pub transaction_id: u32,
    pub request: Request,
}

/// Request/response plumbing beneath the protocol.
pub trait Transport {
    /// Returns the address other nodes reach this transport at.
    fn local_addr(&self) -> SocketAddr;

    /// Send `request` to `to`.
    ///
    /// The returned receiver yields exactly one [CallResult]: the response,
    /// the remote error, or [CallError::Timeout] once the request timeout expires.
    fn call(&mut self, to: SocketAddr, request: Request) -> flume::Receiver<CallResult>;

    /// Returns the next incoming request, if any.
    ///
    /// Called repeatedly from [Protocol::tick](crate::Protocol::tick), so it is
    /// also where a transport should expire timed out calls.
    fn recv(&mut self) -> Option<IncomingRequest>;

    /// Answer a request previously returned from [Self::recv].
    ///
    /// `Err` carries a description of the handler failure for the requester.
    fn respond(&mut self, to: SocketAddr, transaction_id: u32, response: Result<Response, String>);
}
