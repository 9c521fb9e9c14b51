//! Reacting to call outcomes, and welcoming newly discovered nodes.

use tracing::{debug, info};

use crate::common::{Id, Node};
use crate::routing_table::PeerDirectory;
use crate::storage::Storage;
use crate::transport::{CallResult, Transport};

use super::{Protocol, Replication};

impl<T, S, D> Protocol<T, S, D>
where
    T: Transport,
    S: Storage,
    D: PeerDirectory,
{
    /// Update the peer directory from the outcome of a call to `node`.
    ///
    /// A response welcomes the node, a single failure of any kind evicts it.
    ///
    /// Returns `result` unchanged.
    pub fn handle_call_response(&mut self, result: CallResult, node: &Node) -> CallResult {
        match &result {
            Ok(_) => {
                info!(?node, "Got response, adding to router");

                self.welcome_if_new(node);
            }
            Err(error) => {
                debug!(?node, ?error, "Call failed, removing from router");

                self.router.remove_contact(node);
            }
        }

        result
    }

    /// Send a newly discovered node the values it should be storing,
    /// then add it to the peer directory.
    ///
    /// Does nothing for known nodes. The node is added as soon as the
    /// `store` calls are issued, the returned [Replication] tells when they settled.
    pub fn welcome_if_new(&mut self, node: &Node) -> Replication {
        let own_id = *self.id();

        if node.id() == &own_id || !self.router.is_new_node(node) {
            return Replication::default();
        }

        let mut calls = Vec::new();

        for (key, value) in self.storage.items() {
            let keynode = Id::digest(&key);
            let neighbors = self.router.find_neighbors(&keynode, None);

            if should_replicate(node.id(), &own_id, &keynode, &neighbors) {
                debug!(?node, ?key, "Replicating value to new node");

                calls.push(self.call_store(node, key, value));
            }
        }

        self.router.add_contact(*node);

        Replication::new(calls)
    }
}

/// Whether a node holding a key should push it to `new_node`.
///
/// `neighbors` are the known nodes closest to `keynode`, closest first.
/// With no neighbors, always replicate. Otherwise replicate only if `new_node`
/// is closer than the furthest neighbor AND `this_node` is closer than the
/// closest neighbor, so only the most responsible holder pushes the key, and only
/// to nodes that belong among its holders.
pub fn should_replicate(new_node: &Id, this_node: &Id, keynode: &Id, neighbors: &[Node]) -> bool {
    match (neighbors.first(), neighbors.last()) {
        (Some(closest), Some(furthest)) => {
            let new_node_is_close = new_node.xor(keynode) < furthest.distance_to(keynode);
            let this_node_is_closest = this_node.xor(keynode) < closest.distance_to(keynode);

            new_node_is_close && this_node_is_closest
        }
        _ => true,
    }
}
