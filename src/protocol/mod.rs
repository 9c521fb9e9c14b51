//! Kademlia protocol engine.
//!
//! Answers incoming requests, issues outgoing calls, and keeps the peer directory
//! and the local store in line with what the network reports.

mod handle_request;
mod handle_response;
mod pending;

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::error;

use crate::common::{Id, Method, Node, Request};
use crate::config::Config;
use crate::error::CallError;
use crate::routing_table::{PeerDirectory, RoutingTable};
use crate::storage::{MemoryStorage, Storage};
use crate::transport::{CallResult, IncomingRequest, Transport};

pub use handle_response::should_replicate;
pub use pending::{PendingCall, Replication};

#[derive(Debug)]
/// A call waiting for its outcome from the transport.
struct OutstandingCall {
    node: Node,
    method: Method,
    outcome: flume::Receiver<CallResult>,
    caller: flume::Sender<CallResult>,
}

#[derive(Debug)]
/// The protocol side of a Kademlia node.
///
/// Owns its transport, local store and peer directory, and mutates them only
/// from `&mut self`, so none of them need locking. Drive it by calling
/// [Protocol::tick] in a loop.
pub struct Protocol<T, S = MemoryStorage, D = RoutingTable> {
    node: Node,
    transport: T,
    storage: S,
    router: D,
    outstanding: Vec<OutstandingCall>,
}

impl<T: Transport> Protocol<T> {
    /// Create a protocol with the default [RoutingTable] and [MemoryStorage].
    pub fn new(id: Id, transport: T, config: &Config) -> Self {
        let router = RoutingTable::new(id)
            .with_k(config.k)
            .with_refresh_interval(config.bucket_refresh_interval);
        let storage = MemoryStorage::new(config.max_values);

        Self::from_parts(id, transport, storage, router)
    }
}

impl<T, S, D> Protocol<T, S, D>
where
    T: Transport,
    S: Storage,
    D: PeerDirectory,
{
    /// Create a protocol from its collaborators.
    ///
    /// `router` is expected to measure distances from `id`.
    pub fn from_parts(id: Id, transport: T, storage: S, router: D) -> Self {
        Self {
            node: Node::new(id, transport.local_addr()),
            transport,
            storage,
            router,
            outstanding: Vec::new(),
        }
    }

    // === Getters ===

    /// Returns this node's Id.
    pub fn id(&self) -> &Id {
        self.node.id()
    }

    /// Returns this node, as other nodes see it.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Returns the address the transport is listening to.
    pub fn local_addr(&self) -> SocketAddr {
        self.node.address()
    }

    pub fn router(&self) -> &D {
        &self.router
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable access to the local store, for values this node publishes itself.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of calls waiting for an outcome.
    pub fn outstanding_calls(&self) -> usize {
        self.outstanding.len()
    }

    // === Public Methods ===

    /// Answer every pending incoming request, then process the outcome of every
    /// call that resolved since the last tick.
    pub fn tick(&mut self) {
        while let Some(IncomingRequest {
            from,
            transaction_id,
            request,
        }) = self.transport.recv()
        {
            let method = request.method();

            let response = self.handle_request(from, request).map_err(|error| {
                error!(?error, ?from, %method, "Failed to handle request");

                error.to_string()
            });

            self.transport.respond(from, transaction_id, response);
        }

        self.resolve_outstanding();
    }

    /// Ids to look up to keep lonely buckets populated, one per bucket.
    ///
    /// Issuing the lookups is left to the caller.
    pub fn refresh_ids(&self) -> Vec<Id> {
        self.router
            .lonely_buckets()
            .iter()
            .map(|range| Id::random_in_range(&range.low, &range.high))
            .collect()
    }

    // === Calls ===

    /// Ask `node_to_ask` for the nodes it knows closest to `target`.
    pub fn call_find_node(&mut self, node_to_ask: &Node, target: &Id) -> PendingCall {
        let request = Request::FindNode {
            requester_id: *self.id(),
            target: *target,
        };

        self.call(node_to_ask, request)
    }

    /// Ask `node_to_ask` for the value under `key`, or the nodes closest to it.
    pub fn call_find_value(&mut self, node_to_ask: &Node, key: Bytes) -> PendingCall {
        let request = Request::FindValue {
            requester_id: *self.id(),
            key,
        };

        self.call(node_to_ask, request)
    }

    pub fn call_ping(&mut self, node_to_ask: &Node) -> PendingCall {
        let request = Request::Ping {
            requester_id: *self.id(),
        };

        self.call(node_to_ask, request)
    }

    /// Ask `node_to_ask` to store `value` under `key`.
    pub fn call_store(&mut self, node_to_ask: &Node, key: Bytes, value: Bytes) -> PendingCall {
        let request = Request::Store {
            requester_id: *self.id(),
            key,
            value,
        };

        self.call(node_to_ask, request)
    }

    /// Ask `node_to_ask` what address this node's requests come from.
    pub fn call_stun(&mut self, node_to_ask: &Node) -> PendingCall {
        self.call(node_to_ask, Request::Stun)
    }

    // === Private Methods ===

    fn call(&mut self, node: &Node, request: Request) -> PendingCall {
        let method = request.method();
        let outcome = self.transport.call(node.address(), request);

        let (caller, receiver) = flume::bounded(1);

        self.outstanding.push(OutstandingCall {
            node: *node,
            method,
            outcome,
            caller,
        });

        PendingCall::new(receiver)
    }

    fn resolve_outstanding(&mut self) {
        // Handling a response may issue new calls, those are checked next tick.
        let outstanding = std::mem::take(&mut self.outstanding);

        for call in outstanding {
            let outcome = match call.outcome.try_recv() {
                Ok(outcome) => outcome,
                Err(flume::TryRecvError::Empty) => {
                    self.outstanding.push(call);
                    continue;
                }
                Err(flume::TryRecvError::Disconnected) => Err(CallError::Disconnected),
            };

            let outcome = self.handle_call_response(outcome, &call.node);

            if let Err(error) = &outcome {
                error!(?error, node = ?call.node, method = %call.method, "Call failed");
            }

            // The caller may have dropped its handle.
            let _ = call.caller.send(outcome);
        }
    }
}
