//! Struct and implementation of the Node entry in the Kademlia routing table
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use crate::common::{Distance, Id};

#[derive(Debug, Clone, Copy)]
/// A peer as seen on the network: its claimed [Id] and the address it was seen at.
///
/// Two nodes are equal if their ids are equal, the address may change
/// between sightings of the same node.
pub struct Node {
    pub id: Id,
    pub address: SocketAddr,
}

impl Node {
    /// Creates a new Node from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Node {
        Node { id, address }
    }

    /// Creates a node with a random Id, and an unspecified address.
    #[cfg(test)]
    pub fn random() -> Node {
        Node {
            id: Id::random(),
            address: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }

    /// Creates a node with a given Id, and a loopback address at `port`.
    #[cfg(test)]
    pub fn with_port(id: Id, port: u16) -> Node {
        Node {
            id,
            address: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    // === Public Methods ===

    /// XOR distance between this node's id and `target`.
    pub fn distance_to(&self, target: &Id) -> Distance {
        self.id.xor(target)
    }

    /// The `(id, host, port)` shape used in neighbor lists.
    pub fn to_tuple(&self) -> (Id, String, u16) {
        (self.id, self.address.ip().to_string(), self.address.port())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
