//! Request handlers

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::common::{Id, Node, Request, Response};
use crate::routing_table::PeerDirectory;
use crate::storage::Storage;
use crate::transport::Transport;
use crate::Result;

use super::Protocol;

impl<T, S, D> Protocol<T, S, D>
where
    T: Transport,
    S: Storage,
    D: PeerDirectory,
{
    /// Dispatch an incoming request to its handler.
    ///
    /// An `Err` is a handler fault, to be reported back to the requester.
    pub fn handle_request(&mut self, from: SocketAddr, request: Request) -> Result<Response> {
        trace!(?from, method = %request.method(), "Handling request");

        match request {
            Request::Stun => Ok(self.handle_stun(from)),
            Request::Ping { requester_id } => Ok(self.handle_ping(from, requester_id)),
            Request::Store {
                requester_id,
                key,
                value,
            } => self.handle_store(from, requester_id, key, value),
            Request::FindNode {
                requester_id,
                target,
            } => Ok(self.handle_find_node(from, requester_id, &target)),
            Request::FindValue { requester_id, key } => {
                Ok(self.handle_find_value(from, requester_id, &key))
            }
        }
    }

    /// Echo the address the request came from.
    pub fn handle_stun(&self, from: SocketAddr) -> Response {
        Response::Stun(from)
    }

    pub fn handle_ping(&mut self, from: SocketAddr, requester_id: Id) -> Response {
        self.welcome_sender(from, requester_id);

        Response::Ping(*self.id())
    }

    /// Store `value` under `key`, overwriting whatever was there.
    ///
    /// Any node that can reach this one may store anything. A bounded [Storage]
    /// (like the default [MemoryStorage](crate::MemoryStorage)) may later drop the
    /// value to make room, even though this answered `Store(true)`.
    pub fn handle_store(
        &mut self,
        from: SocketAddr,
        requester_id: Id,
        key: Bytes,
        value: Bytes,
    ) -> Result<Response> {
        self.welcome_sender(from, requester_id);

        debug!(?from, ?key, "Got a store request, storing value");
        self.storage.set(key, value)?;

        Ok(Response::Store(true))
    }

    /// Closest known nodes to `target`, never including the requester.
    pub fn handle_find_node(&mut self, from: SocketAddr, requester_id: Id, target: &Id) -> Response {
        let source = self.welcome_sender(from, requester_id);

        self.neighbors(target, &source)
    }

    /// The value under `key` if stored here, otherwise the closest known nodes
    /// to `key`, never including the requester.
    ///
    /// A 20 byte key is looked up as an [Id] as is, like [Self::handle_find_node] would,
    /// any other key by its [Id::digest].
    pub fn handle_find_value(
        &mut self,
        from: SocketAddr,
        requester_id: Id,
        key: &[u8],
    ) -> Response {
        let source = self.welcome_sender(from, requester_id);

        if let Some(value) = self.storage.get(key) {
            return Response::Value(value);
        }

        let target = Id::from_bytes(key).unwrap_or_else(|_| Id::digest(key));

        self.neighbors(&target, &source)
    }

    /// Every request carrying a requester id may introduce a new node.
    fn welcome_sender(&mut self, from: SocketAddr, requester_id: Id) -> Node {
        let source = Node::new(requester_id, from);

        // Replication toward the sender is tracked as outstanding calls,
        // nobody waits for it here.
        self.welcome_if_new(&source);

        source
    }

    fn neighbors(&self, target: &Id, source: &Node) -> Response {
        trace!(?target, "Finding neighbors in local table");

        Response::Nodes(self.router.find_neighbors(target, Some(source)))
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use crate::common::Node;
    use crate::config::Config;
    use crate::routing_table::RoutingTable;
    use crate::storage::MemoryStorage;
    use crate::transport::{MemoryNetwork, MemoryTransport};

    use super::*;

    fn protocol(network: &MemoryNetwork) -> Protocol<MemoryTransport> {
        Protocol::new(Id::random(), network.transport(), &Config::default())
    }

    #[test]
    fn stun() {
        let network = MemoryNetwork::new();
        let mut protocol = protocol(&network);

        let from = SocketAddr::from(([1, 2, 3, 4], 5));

        assert_eq!(
            protocol.handle_request(from, Request::Stun).unwrap(),
            Response::Stun(from)
        );
        assert!(protocol.router().is_empty());
    }

    #[test]
    fn ping_welcomes_new_node() {
        let network = MemoryNetwork::new();
        let mut protocol = protocol(&network);

        let sender = Node::with_port(Id::random(), 7000);

        let response = protocol
            .handle_request(
                sender.address(),
                Request::Ping {
                    requester_id: sender.id,
                },
            )
            .unwrap();

        assert_eq!(response, Response::Ping(*protocol.id()));
        assert!(!protocol.router().is_new_node(&sender));
        // Nothing stored, nothing to replicate.
        assert_eq!(protocol.outstanding_calls(), 0);
    }

    #[test]
    fn store_overwrites() {
        let network = MemoryNetwork::new();
        let mut protocol = protocol(&network);

        let sender = Node::with_port(Id::random(), 7000);

        for value in ["v1", "v2"].iter() {
            let response = protocol
                .handle_request(
                    sender.address(),
                    Request::Store {
                        requester_id: sender.id,
                        key: Bytes::from_static(b"k1"),
                        value: Bytes::from(*value),
                    },
                )
                .unwrap();

            assert_eq!(response, Response::Store(true));
        }

        assert_eq!(
            protocol.storage_mut().get(b"k1"),
            Some(Bytes::from_static(b"v2"))
        );
        assert!(!protocol.router().is_new_node(&sender));
    }

    #[test]
    fn find_node_excludes_requester() {
        let network = MemoryNetwork::new();
        let mut protocol = protocol(&network);

        let known = Node::with_port(Id::random(), 7001);
        protocol.handle_ping(known.address(), known.id);

        let sender = Node::with_port(Id::random(), 7000);

        let response = protocol.handle_find_node(sender.address(), sender.id, &sender.id);

        assert_eq!(response, Response::Nodes(vec![known]));
        assert!(!protocol.router().is_new_node(&sender));
    }

    #[test]
    fn find_value_hit_and_miss() {
        let network = MemoryNetwork::new();
        let mut protocol = protocol(&network);

        let known = Node::with_port(Id::random(), 7001);
        protocol.handle_ping(known.address(), known.id);

        let sender = Node::with_port(Id::random(), 7000);
        let key = Id::from_str("58c65677e3833cb0f15733a6363cc4cb1352f90a").unwrap();

        let miss = protocol.handle_find_value(sender.address(), sender.id, key.as_bytes());
        let find_node = protocol.handle_find_node(sender.address(), sender.id, &key);

        assert_eq!(miss, find_node);
        assert_eq!(miss, Response::Nodes(vec![known]));

        protocol
            .storage_mut()
            .set(Bytes::copy_from_slice(key.as_bytes()), "v1".into())
            .unwrap();

        let hit = protocol.handle_find_value(sender.address(), sender.id, key.as_bytes());

        assert_eq!(hit, Response::Value("v1".into()));
    }

    #[test]
    fn find_value_miss_with_short_key() {
        let network = MemoryNetwork::new();
        let mut protocol = protocol(&network);

        let known = Node::with_port(Id::random(), 7001);
        protocol.handle_ping(known.address(), known.id);

        let sender = Node::with_port(Id::random(), 7000);

        let miss = protocol
            .handle_request(
                sender.address(),
                Request::FindValue {
                    requester_id: sender.id,
                    key: Bytes::from_static(b"k1"),
                },
            )
            .unwrap();

        assert_eq!(miss, Response::Nodes(vec![known]));
        assert_eq!(
            miss,
            protocol.handle_find_node(sender.address(), sender.id, &Id::digest(b"k1"))
        );
        assert!(!protocol.router().is_new_node(&sender));
    }

    #[test]
    fn find_value_welcomes_sender_once() {
        let network = MemoryNetwork::new();

        // Ids placed relative to the keynode of the stored key.
        let keynode = Id::digest(b"k1");
        let near = |byte: u8| {
            let mut bytes = keynode.0;
            bytes[19] ^= byte;
            Id(bytes)
        };

        let router = RoutingTable::new(near(2)).with_k(1);
        let mut protocol =
            Protocol::from_parts(near(2), network.transport(), MemoryStorage::default(), router);

        protocol
            .storage_mut()
            .set(Bytes::from_static(b"k1"), Bytes::from_static(b"v1"))
            .unwrap();

        // Fills the only slot of the bucket at log distance 4.
        protocol.router.add(Node::with_port(near(12), 7012));
        assert_eq!(protocol.router().size(), 1);

        // Same bucket, closer to the keynode, so it gets the value but is never added.
        let sender = Node::with_port(near(9), 7009);

        protocol.handle_find_value(sender.address(), sender.id, b"missing");

        assert!(protocol.router().is_new_node(&sender));
        assert_eq!(protocol.outstanding_calls(), 1);
    }
}
