//! In process transport, connecting nodes that share a [MemoryNetwork].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, trace};

use crate::common::{Request, Response};
use crate::error::CallError;

use super::inflight::InflightCalls;
use super::{CallResult, IncomingRequest, Transport};

/// Default request timeout before abandoning an inflight request to a non-responding node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const FIRST_PORT: u16 = 10000;

#[derive(Debug)]
enum Envelope {
    Request {
        from: SocketAddr,
        transaction_id: u32,
        request: Request,
    },
    Response {
        from: SocketAddr,
        transaction_id: u32,
        response: Result<Response, String>,
    },
}

#[derive(Debug, Clone)]
/// A shared switchboard delivering messages between [MemoryTransport]s.
///
/// Cloning is cheap, all clones are the same network.
pub struct MemoryNetwork {
    inboxes: Arc<RwLock<HashMap<SocketAddr, flume::Sender<Envelope>>>>,
    next_port: Arc<AtomicU16>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            inboxes: Arc::new(RwLock::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(FIRST_PORT)),
        }
    }

    /// Bind a transport at a fresh loopback address.
    pub fn transport(&self) -> MemoryTransport {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);

        self.bind(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Bind a transport at `address`, replacing any transport bound there before.
    pub fn bind(&self, address: SocketAddr) -> MemoryTransport {
        let (sender, inbox) = flume::unbounded();

        self.inboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, sender);

        MemoryTransport {
            network: self.clone(),
            local_addr: address,
            inbox,
            next_tid: 0,
            inflight: InflightCalls::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Make `address` unreachable, requests to it fail immediately.
    ///
    /// A transport that is still bound but never polled is silent instead,
    /// and requests to it time out.
    pub fn disconnect(&self, address: &SocketAddr) {
        self.inboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }

    /// Returns `true` if a message was queued for `to`.
    fn deliver(&self, to: &SocketAddr, envelope: Envelope) -> bool {
        self.inboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(to)
            .map(|inbox| inbox.send(envelope).is_ok())
            .unwrap_or(false)
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
/// A [Transport] endpoint on a [MemoryNetwork].
///
/// Messages are delivered as typed values without any encoding.
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_addr: SocketAddr,
    inbox: flume::Receiver<Envelope>,
    next_tid: u32,
    inflight: InflightCalls,
    request_timeout: Duration,
}

impl MemoryTransport {
    // === Options ===

    /// Set how long to wait for a response before resolving a call with [CallError::Timeout].
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    // === Getters ===

    /// Number of calls still waiting for a response.
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    // === Private Methods ===

    fn tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }

    fn expire_inflight(&mut self) {
        for (transaction_id, call) in self.inflight.expire(self.request_timeout) {
            debug!(to = ?call.to, transaction_id, "Request timed out");

            let _ = call.outcome.send(Err(CallError::Timeout));
        }
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn call(&mut self, to: SocketAddr, request: Request) -> flume::Receiver<CallResult> {
        let (sender, receiver) = flume::bounded::<CallResult>(1);
        let transaction_id = self.tid();

        trace!(
            context = "transport_message_sending",
            ?to,
            transaction_id,
            ?request
        );

        let envelope = Envelope::Request {
            from: self.local_addr,
            transaction_id,
            request,
        };

        if self.network.deliver(&to, envelope) {
            self.inflight.add(transaction_id, to, sender);
        } else {
            debug!(?to, transaction_id, "Node is unreachable");

            let _ = sender.send(Err(CallError::Unreachable));
        }

        receiver
    }

    fn recv(&mut self) -> Option<IncomingRequest> {
        self.expire_inflight();

        while let Ok(envelope) = self.inbox.try_recv() {
            match envelope {
                Envelope::Request {
                    from,
                    transaction_id,
                    request,
                } => {
                    trace!(
                        context = "transport_message_receiving",
                        ?from,
                        transaction_id,
                        ?request,
                        "Received request message"
                    );

                    return Some(IncomingRequest {
                        from,
                        transaction_id,
                        request,
                    });
                }
                Envelope::Response {
                    from,
                    transaction_id,
                    response,
                } => match self.inflight.remove(transaction_id, &from) {
                    Some(call) => {
                        trace!(
                            context = "transport_message_receiving",
                            ?from,
                            transaction_id,
                            ?response,
                            "Received response message"
                        );

                        let _ = call.outcome.send(response.map_err(CallError::Remote));
                    }
                    None => {
                        trace!(
                            context = "transport_validation",
                            ?from,
                            transaction_id,
                            "Dropping unexpected or late response"
                        );
                    }
                },
            }
        }

        None
    }

    fn respond(&mut self, to: SocketAddr, transaction_id: u32, response: Result<Response, String>) {
        let envelope = Envelope::Response {
            from: self.local_addr,
            transaction_id,
            response,
        };

        if !self.network.deliver(&to, envelope) {
            debug!(?to, transaction_id, "Error sending response message");
        }
    }
}

#[cfg(test)]
mod test {
    use crate::common::Id;

    use super::*;

    #[test]
    fn request_response() {
        let network = MemoryNetwork::new();

        let mut client = network.transport();
        let mut server = network.transport();

        let requester_id = Id::random();
        let outcome = client.call(server.local_addr(), Request::Ping { requester_id });
        assert_eq!(client.inflight(), 1);

        let incoming = server.recv().unwrap();
        assert_eq!(incoming.from, client.local_addr());
        assert_eq!(incoming.request, Request::Ping { requester_id });
        assert!(server.recv().is_none());

        let responder_id = Id::random();
        server.respond(
            incoming.from,
            incoming.transaction_id,
            Ok(Response::Ping(responder_id)),
        );

        assert!(outcome.try_recv().is_err());
        assert!(client.recv().is_none());

        assert_eq!(outcome.try_recv().unwrap(), Ok(Response::Ping(responder_id)));
        assert_eq!(client.inflight(), 0);
    }

    #[test]
    fn remote_error() {
        let network = MemoryNetwork::new();

        let mut client = network.transport();
        let mut server = network.transport();

        let outcome = client.call(server.local_addr(), Request::Stun);

        let incoming = server.recv().unwrap();
        server.respond(incoming.from, incoming.transaction_id, Err("boom".into()));
        client.recv();

        assert_eq!(
            outcome.try_recv().unwrap(),
            Err(CallError::Remote("boom".into()))
        );
    }

    #[test]
    fn unreachable() {
        let network = MemoryNetwork::new();
        let mut client = network.transport();

        let outcome = client.call(SocketAddr::from(([10, 0, 0, 1], 1)), Request::Stun);

        assert_eq!(outcome.try_recv().unwrap(), Err(CallError::Unreachable));
        assert_eq!(client.inflight(), 0);
    }

    #[test]
    fn disconnect() {
        let network = MemoryNetwork::new();
        let mut client = network.transport();
        let server = network.transport();

        network.disconnect(&server.local_addr());

        let outcome = client.call(server.local_addr(), Request::Stun);
        assert_eq!(outcome.try_recv().unwrap(), Err(CallError::Unreachable));
    }

    #[test]
    fn timeout() {
        let network = MemoryNetwork::new();
        let mut client = network.transport().with_request_timeout(Duration::ZERO);
        let silent = network.transport();

        let outcome = client.call(silent.local_addr(), Request::Stun);
        assert!(outcome.try_recv().is_err());

        client.recv();

        assert_eq!(outcome.try_recv().unwrap(), Err(CallError::Timeout));
        assert_eq!(client.inflight(), 0);
    }

    #[test]
    fn late_response_is_dropped() {
        let network = MemoryNetwork::new();
        let mut client = network.transport().with_request_timeout(Duration::ZERO);
        let mut server = network.transport();

        let outcome = client.call(server.local_addr(), Request::Stun);
        let incoming = server.recv().unwrap();

        // Times out before the response arrives.
        client.recv();
        assert_eq!(outcome.try_recv().unwrap(), Err(CallError::Timeout));

        server.respond(
            incoming.from,
            incoming.transaction_id,
            Ok(Response::Stun(incoming.from)),
        );
        client.recv();

        assert!(outcome.try_recv().is_err());
    }
}
