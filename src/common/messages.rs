//! Requests and responses exchanged between nodes.
//!
//! These are the payload contract of the protocol, the transport decides
//! how (and if) they are encoded on the wire.

use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;

use bytes::Bytes;

use crate::common::{Id, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The remote procedures a node answers.
pub enum Method {
    Stun,
    Ping,
    Store,
    FindNode,
    FindValue,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Stun => "stun",
            Method::Ping => "ping",
            Method::Store => "store",
            Method::FindNode => "find_node",
            Method::FindValue => "find_value",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// An incoming or outgoing request.
///
/// Every request except [Request::Stun] carries the id the requester claims.
pub enum Request {
    Stun,
    Ping {
        requester_id: Id,
    },
    Store {
        requester_id: Id,
        key: Bytes,
        value: Bytes,
    },
    FindNode {
        requester_id: Id,
        target: Id,
    },
    FindValue {
        requester_id: Id,
        key: Bytes,
    },
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::Stun => Method::Stun,
            Request::Ping { .. } => Method::Ping,
            Request::Store { .. } => Method::Store,
            Request::FindNode { .. } => Method::FindNode,
            Request::FindValue { .. } => Method::FindValue,
        }
    }

    /// The id the requester claims, [None] for [Request::Stun].
    pub fn requester_id(&self) -> Option<&Id> {
        match self {
            Request::Stun => None,
            Request::Ping { requester_id }
            | Request::Store { requester_id, .. }
            | Request::FindNode { requester_id, .. }
            | Request::FindValue { requester_id, .. } => Some(requester_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A successful answer to a [Request].
pub enum Response {
    /// The address the request was observed coming from.
    Stun(SocketAddr),
    /// The responder's id.
    Ping(Id),
    /// Whether the value was stored.
    Store(bool),
    /// Closest known nodes to the target, closest first.
    Nodes(Vec<Node>),
    /// The value stored under the requested key.
    Value(Bytes),
}

impl Response {
    /// Returns the neighbor list if this is a [Response::Nodes].
    pub fn nodes(&self) -> Option<&[Node]> {
        match self {
            Response::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Returns the value if this is a [Response::Value].
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            Response::Value(value) => Some(value),
            _ => None,
        }
    }
}
