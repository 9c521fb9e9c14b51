//! Peer directory consumed by the protocol, and a simplified Kademlia routing table implementing it.

use std::collections::BTreeMap;
use std::slice::Iter;
use std::time::{Duration, Instant};

use crate::common::{Id, Node, MAX_DISTANCE};
use crate::config::DEFAULT_BUCKET_REFRESH_INTERVAL;

/// K = the default maximum size of a k-bucket.
pub const MAX_BUCKET_SIZE_K: usize = 20;

/// The set of known contacts the protocol reads and maintains.
///
/// Implementations own bucket internals (splitting, replacement caches, ...),
/// the protocol only drives promotions and evictions through this interface.
pub trait PeerDirectory {
    /// Returns up to `k` known contacts closest to `target`, never including `exclude`.
    ///
    /// # Ordering contract
    ///
    /// The result MUST be sorted by ascending XOR distance to `target`,
    /// stable for equal distances. The replication heuristic reads the first
    /// element as the currently closest holder of a key and the last as the
    /// currently furthest one.
    fn find_neighbors(&self, target: &Id, exclude: Option<&Node>) -> Vec<Node>;

    /// Insert `node`, or refresh it if it is already known. Idempotent.
    fn add_contact(&mut self, node: Node);

    /// Remove `node` if it is known. Idempotent.
    fn remove_contact(&mut self, node: &Node);

    /// Returns `true` if `node` is not a known contact.
    fn is_new_node(&self, node: &Node) -> bool;

    /// Id ranges of buckets that need a refresh lookup.
    fn lonely_buckets(&self) -> Vec<BucketRange>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The span of Ids a bucket is responsible for, inclusive on both ends.
pub struct BucketRange {
    pub low: Id,
    pub high: Id,
}

impl BucketRange {
    pub fn contains(&self, id: &Id) -> bool {
        &self.low <= id && id <= &self.high
    }
}

#[derive(Debug, Clone)]
/// Simplified Kademlia routing table
///
/// Buckets are keyed by [Id::log_distance] from the local id, and never split.
pub struct RoutingTable {
    id: Id,
    k: usize,
    refresh_interval: Duration,
    buckets: BTreeMap<u8, KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id.
    pub fn new(id: Id) -> Self {
        RoutingTable {
            id,
            k: MAX_BUCKET_SIZE_K,
            refresh_interval: DEFAULT_BUCKET_REFRESH_INTERVAL,
            buckets: BTreeMap::new(),
        }
    }

    // === Options ===

    /// Set the maximum size of each bucket, and of [Self::closest] results.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Set how long a bucket can go without updates before it is lonely.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn k(&self) -> usize {
        self.k
    }

    // === Public Methods ===

    /// Attempts to add a node to this routing table, and return `true` if it did.
    ///
    /// Adding a known id refreshes its address and moves it to the tail of its bucket.
    pub fn add(&mut self, node: Node) -> bool {
        let distance = self.id.log_distance(node.id());

        if distance == 0 {
            // Do not add self to the routing_table
            return false;
        }

        let k = self.k;
        let bucket = self.buckets.entry(distance).or_default();

        bucket.add(node, k)
    }

    /// Remove a node from this routing table.
    pub fn remove(&mut self, node_id: &Id) {
        let distance = self.id.log_distance(node_id);

        if let Some(bucket) = self.buckets.get_mut(&distance) {
            bucket.remove(node_id)
        }
    }

    /// Returns `true` if a node with this id is in the table.
    pub fn contains(&self, node_id: &Id) -> bool {
        let distance = self.id.log_distance(node_id);

        self.buckets
            .get(&distance)
            .map(|bucket| bucket.contains(node_id))
            .unwrap_or(false)
    }

    /// Return the `k` closest nodes to the target, closest first.
    pub fn closest(&self, target: &Id, exclude: Option<&Id>) -> Vec<Node> {
        let mut closest: Vec<Node> = self
            .nodes()
            .filter(|node| Some(node.id()) != exclude)
            .collect();

        // Stable sort, ties keep table order.
        closest.sort_by_key(|node| node.distance_to(target));
        closest.truncate(self.k);

        closest
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.is_empty())
    }

    /// Return the number of nodes in this routing table.
    pub fn size(&self) -> usize {
        self.buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.nodes.len())
    }

    /// Returns an iterator over the nodes in this routing table.
    pub fn nodes(&self) -> RoutingTableIterator {
        RoutingTableIterator {
            bucket_index: 1,
            node_index: 0,
            table: self,
        }
    }

    /// Export an owned vector of nodes from this routing table.
    pub fn to_owned_nodes(&self) -> Vec<Node> {
        self.nodes().collect()
    }
}

impl PeerDirectory for RoutingTable {
    fn find_neighbors(&self, target: &Id, exclude: Option<&Node>) -> Vec<Node> {
        self.closest(target, exclude.map(|node| node.id()))
    }

    fn add_contact(&mut self, node: Node) {
        self.add(node);
    }

    fn remove_contact(&mut self, node: &Node) {
        self.remove(node.id());
    }

    fn is_new_node(&self, node: &Node) -> bool {
        !self.contains(node.id())
    }

    fn lonely_buckets(&self) -> Vec<BucketRange> {
        self.buckets
            .iter()
            .filter(|(_, bucket)| bucket.last_updated.elapsed() >= self.refresh_interval)
            .map(|(distance, _)| {
                let (low, high) = self.id.bucket_range(*distance);

                BucketRange { low, high }
            })
            .collect()
    }
}

pub struct RoutingTableIterator<'a> {
    bucket_index: u8,
    node_index: usize,
    table: &'a RoutingTable,
}

impl Iterator for RoutingTableIterator<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Self::Item> {
        while self.bucket_index <= MAX_DISTANCE {
            if let Some(current_bucket) = self.table.buckets.get(&self.bucket_index) {
                if let Some(current_node) = current_bucket.nodes.get(self.node_index) {
                    self.node_index += 1;

                    if self.node_index == current_bucket.nodes.len() {
                        self.node_index = 0;
                        self.bucket_index = self.bucket_index.saturating_add(1);
                    }

                    return Some(*current_node);
                }
            };

            self.node_index = 0;

            if self.bucket_index == MAX_DISTANCE {
                break;
            }
            self.bucket_index += 1;
        }

        None
    }
}

/// A bucket of up to `k` contacts, in the order they were last seen.
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Nodes in the k-bucket, sorted by the least recently seen.
    nodes: Vec<Node>,
    /// Last time a node was added or refreshed.
    last_updated: Instant,
}

impl KBucket {
    pub fn new() -> Self {
        KBucket {
            nodes: Vec::with_capacity(MAX_BUCKET_SIZE_K),
            last_updated: Instant::now(),
        }
    }

    // === Public Methods ===

    pub fn add(&mut self, incoming: Node, k: usize) -> bool {
        if let Some(index) = self.iter().position(|n| n.id() == incoming.id()) {
            // Move to the tail, possibly with a new address.
            self.nodes.remove(index);
            self.nodes.push(incoming);
        } else if self.nodes.len() < k {
            self.nodes.push(incoming);
        } else {
            return false;
        }

        self.last_updated = Instant::now();

        true
    }

    pub fn remove(&mut self, node_id: &Id) {
        self.nodes.retain(|node| node.id() != node_id);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Node> {
        self.nodes.iter()
    }

    fn contains(&self, id: &Id) -> bool {
        self.iter().any(|node| node.id() == id)
    }
}

impl Default for KBucket {
    fn default() -> Self {
        Self::new()
    }
}
