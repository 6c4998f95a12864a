//! Test network harness for multi-node integration testing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::info;

use weft_net::MemoryNetwork;
use weft_node::NodeConfig;
use weft_routing::RoutingTableConfig;

use crate::node::TestNode;

/// A loopback network of real overlay nodes.
pub struct TestNetwork {
    /// The shared loopback fabric.
    pub network: Arc<MemoryNetwork>,
    /// Nodes, in creation order; index 0 is the seed.
    pub nodes: Vec<TestNode>,
    config: NodeConfig,
}

impl TestNetwork {
    /// A node configuration sized for small test networks.
    ///
    /// Random 512-bit ids concentrate in the far buckets, so the
    /// per-bucket limit is opened up; quorum is 1 so a single seed
    /// can vouch for a group probe.
    pub fn small_config() -> NodeConfig {
        NodeConfig {
            table: RoutingTableConfig {
                capacity: 32,
                group_size: 8,
                bucket_size: 32,
            },
            quorum: 1,
            ..NodeConfig::default()
        }
    }

    /// Creates a network with one seed node.
    pub fn new() -> Self {
        Self::with_config(Self::small_config())
    }

    /// Creates a network with one seed node and a custom config.
    pub fn with_config(config: NodeConfig) -> Self {
        let network = MemoryNetwork::new();
        let seed = TestNode::start(&network, config.clone());
        Self {
            network,
            nodes: vec![seed],
            config,
        }
    }

    /// Creates a network of `count` nodes, joined through the seed.
    pub async fn with_nodes(count: usize) -> Self {
        let mut net = Self::new();
        for _ in 1..count {
            net.join_node().await;
        }
        net
    }

    /// Returns the seed node.
    pub fn seed(&self) -> &TestNode {
        &self.nodes[0]
    }

    /// Starts a node and bootstraps it through the seed.
    pub async fn join_node(&mut self) -> &TestNode {
        let node = TestNode::start(&self.network, self.config.clone());
        let seed_endpoint = self.seed().endpoint();
        node.node
            .bootstrap_from(seed_endpoint)
            .await
            .expect("bootstrap through seed");
        self.nodes.push(node);

        // Let the join protocol churn before the next arrival.
        sleep(Duration::from_millis(50)).await;
        let node = self.nodes.last().expect("just pushed");
        info!(id = %node.node.our_id(), "node joined");
        node
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Polls until `predicate` holds or the timeout elapses.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if predicate(self) {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        predicate(self)
    }

    /// Waits for every node to know at least `min_peers` others.
    pub async fn wait_for_convergence(&self, min_peers: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |net| {
            net.nodes.iter().all(|n| n.node.table_size() >= min_peers)
        })
        .await
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_starts_with_a_seed() {
        let net = TestNetwork::new();
        assert_eq!(net.node_count(), 1);
        assert_eq!(net.seed().node.table_size(), 0);
    }

    #[tokio::test]
    async fn joining_grows_the_network() {
        let mut net = TestNetwork::new();
        net.join_node().await;
        assert_eq!(net.node_count(), 2);
    }
}
