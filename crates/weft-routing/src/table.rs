//! The routing table: a bounded, distance-ordered view of known peers.
//!
//! Entries are kept sorted ascending by XOR distance from the local
//! id, so the first `group_size` entries are always the close group.
//! All operations take a single mutex and are linear in the (small,
//! bounded) table size.

use parking_lot::Mutex;
use tracing::debug;
use weft_core::Address;
use weft_proto::NodeInfo;

use crate::{DEFAULT_BUCKET_SIZE, DEFAULT_GROUP_SIZE, DEFAULT_TABLE_SIZE};

/// Routing table tunables.
#[derive(Debug, Clone)]
pub struct RoutingTableConfig {
    /// Maximum number of entries (K).
    pub capacity: usize,
    /// Close group size (G).
    pub group_size: usize,
    /// Maximum entries sharing one bucket (B).
    pub bucket_size: usize,
}

impl Default for RoutingTableConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TABLE_SIZE,
            group_size: DEFAULT_GROUP_SIZE,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

/// The local node's partial view of the overlay.
pub struct RoutingTable {
    our_id: Address,
    config: RoutingTableConfig,
    nodes: Mutex<Vec<NodeInfo>>,
}

impl RoutingTable {
    /// Creates an empty table centred on `our_id`.
    pub fn new(our_id: Address, config: RoutingTableConfig) -> Self {
        Self {
            our_id,
            config,
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Returns the local id the table is centred on.
    pub fn our_id(&self) -> Address {
        self.our_id
    }

    /// Returns the configured close group size.
    pub fn group_size(&self) -> usize {
        self.config.group_size
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the number of entries.
    pub fn size(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Returns true if `id` is present.
    pub fn contains(&self, id: &Address) -> bool {
        self.nodes.lock().iter().any(|n| n.id == *id)
    }

    /// Returns the stored record for `id`.
    pub fn get(&self, id: &Address) -> Option<NodeInfo> {
        self.nodes.lock().iter().find(|n| n.id == *id).cloned()
    }

    /// Offers a peer to the table.
    ///
    /// Returns whether the peer was added, and the entry that was
    /// evicted to make room, if any. Self and duplicates are rejected;
    /// a full table only accepts peers strictly closer than the
    /// candidate for removal.
    pub fn add(&self, info: NodeInfo) -> (bool, Option<NodeInfo>) {
        if info.id == self.our_id {
            return (false, None);
        }
        let mut nodes = self.nodes.lock();
        if nodes.iter().any(|n| n.id == info.id) {
            return (false, None);
        }

        let bucket = self
            .bucket_of(&info.id)
            .expect("id differs from ours, so it has a bucket");

        if nodes.len() < self.config.capacity
            && self.bucket_count(&nodes, bucket, None) < self.config.bucket_size
        {
            self.insert_sorted(&mut nodes, info);
            self.assert_invariants(&nodes);
            return (true, None);
        }

        // Table (or the newcomer's bucket) is full: displace the
        // candidate for removal if the newcomer beats it.
        let Some(candidate) = self.candidate_for_removal(&nodes) else {
            return (false, None);
        };
        if !self.our_id.closer(&info.id, &nodes[candidate].id) {
            return (false, None);
        }
        if self.bucket_count(&nodes, bucket, Some(candidate)) >= self.config.bucket_size {
            return (false, None);
        }

        let evicted = nodes.remove(candidate);
        self.insert_sorted(&mut nodes, info);
        self.assert_invariants(&nodes);
        debug!(evicted = %evicted.id, "displaced table entry");
        (true, Some(evicted))
    }

    /// Returns true if an [`add`](Self::add) of `id` would succeed.
    pub fn check(&self, id: &Address) -> bool {
        if *id == self.our_id {
            return false;
        }
        let nodes = self.nodes.lock();
        if nodes.iter().any(|n| n.id == *id) {
            return false;
        }
        let bucket = self.bucket_of(id).expect("id differs from ours");

        if nodes.len() < self.config.capacity
            && self.bucket_count(&nodes, bucket, None) < self.config.bucket_size
        {
            return true;
        }
        match self.candidate_for_removal(&nodes) {
            Some(candidate) => {
                self.our_id.closer(id, &nodes[candidate].id)
                    && self.bucket_count(&nodes, bucket, Some(candidate))
                        < self.config.bucket_size
            }
            None => false,
        }
    }

    /// Removes `id`; returns whether it was present.
    pub fn drop_node(&self, id: &Address) -> bool {
        let mut nodes = self.nodes.lock();
        let before = nodes.len();
        nodes.retain(|n| n.id != *id);
        before != nodes.len()
    }

    /// Returns the close group: the nearest `group_size` entries,
    /// ascending by distance.
    pub fn close_group(&self) -> Vec<NodeInfo> {
        let nodes = self.nodes.lock();
        nodes
            .iter()
            .take(self.config.group_size)
            .cloned()
            .collect()
    }

    /// Returns the peers a message for `destination` should go to.
    ///
    /// Inside our close group range that is the whole close group
    /// (swarm); outside it, the single entry nearest the destination.
    pub fn targets(&self, destination: &Address) -> Vec<NodeInfo> {
        let nodes = self.nodes.lock();
        if nodes.is_empty() {
            return Vec::new();
        }
        if self.in_range(&nodes, destination) {
            return nodes
                .iter()
                .take(self.config.group_size)
                .cloned()
                .collect();
        }
        nodes
            .iter()
            .min_by(|a, b| destination.cmp_distance(&a.id, &b.id))
            .cloned()
            .into_iter()
            .collect()
    }

    /// Returns true if `address` falls within our close group range.
    pub fn in_close_group_range(&self, address: &Address) -> bool {
        let nodes = self.nodes.lock();
        self.in_range(&nodes, address)
    }

    fn in_range(&self, nodes: &[NodeInfo], address: &Address) -> bool {
        if nodes.len() < self.config.group_size {
            return true;
        }
        let edge = &nodes[self.config.group_size - 1].id;
        self.our_id.xor_distance(address) <= self.our_id.xor_distance(edge)
    }

    fn bucket_of(&self, id: &Address) -> Option<usize> {
        self.our_id.bucket_index(id)
    }

    /// Counts entries in `bucket`, optionally pretending index
    /// `without` has already been removed.
    fn bucket_count(&self, nodes: &[NodeInfo], bucket: usize, without: Option<usize>) -> usize {
        nodes
            .iter()
            .enumerate()
            .filter(|(i, n)| without != Some(*i) && self.bucket_of(&n.id) == Some(bucket))
            .count()
    }

    /// The entry to displace: the farthest node outside the close
    /// group within the bucket holding the most such entries.
    fn candidate_for_removal(&self, nodes: &[NodeInfo]) -> Option<usize> {
        let group = self.config.group_size;
        if nodes.len() <= group {
            return None;
        }
        let max_count = (group..nodes.len())
            .map(|i| {
                let bucket = self.bucket_of(&nodes[i].id).expect("entry is not us");
                self.bucket_count(nodes, bucket, None)
            })
            .max()?;
        (group..nodes.len()).rev().find(|&i| {
            let bucket = self.bucket_of(&nodes[i].id).expect("entry is not us");
            self.bucket_count(nodes, bucket, None) == max_count
        })
    }

    fn insert_sorted(&self, nodes: &mut Vec<NodeInfo>, info: NodeInfo) {
        let position = nodes
            .iter()
            .position(|n| self.our_id.closer(&info.id, &n.id))
            .unwrap_or(nodes.len());
        nodes.insert(position, info);
    }

    fn assert_invariants(&self, nodes: &[NodeInfo]) {
        debug_assert!(nodes.len() <= self.config.capacity, "table over capacity");
        for pair in nodes.windows(2) {
            debug_assert!(
                self.our_id.closer(&pair[0].id, &pair[1].id),
                "table not sorted or ids not distinct"
            );
        }
        if cfg!(debug_assertions) {
            for node in nodes {
                let bucket = self.bucket_of(&node.id).expect("table never holds us");
                debug_assert!(
                    self.bucket_count(nodes, bucket, None) <= self.config.bucket_size,
                    "bucket over capacity"
                );
            }
        }
    }
}
