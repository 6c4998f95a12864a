//! Node configuration.

use std::time::Duration;

use weft_routing::{
    RoutingTableConfig, SentinelConfig, CACHE_CAPACITY, CACHE_TTL, DEFAULT_QUORUM,
    FILTER_CAPACITY, FILTER_TTL, SENTINEL_WINDOW,
};

/// Tunables for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Routing table shape (capacity, close group, buckets).
    pub table: RoutingTableConfig,
    /// Close-group signatures needed to accept a group message (Q).
    pub quorum: usize,
    /// How long duplicate-filter entries are remembered.
    pub filter_ttl: Duration,
    /// Bound on duplicate-filter entries.
    pub filter_capacity: usize,
    /// How long cached payloads are kept.
    pub cache_ttl: Duration,
    /// Bound on cached payloads.
    pub cache_capacity: usize,
    /// How long the sentinel waits for a quorum.
    pub sentinel_window: Duration,
    /// Answer `GetData` from the content cache instead of only
    /// forwarding. Off by default.
    pub serve_from_cache: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            table: RoutingTableConfig::default(),
            quorum: DEFAULT_QUORUM,
            filter_ttl: FILTER_TTL,
            filter_capacity: FILTER_CAPACITY,
            cache_ttl: CACHE_TTL,
            cache_capacity: CACHE_CAPACITY,
            sentinel_window: SENTINEL_WINDOW,
            serve_from_cache: false,
        }
    }
}

impl NodeConfig {
    /// Returns the sentinel configuration implied by this node config.
    pub fn sentinel(&self) -> SentinelConfig {
        SentinelConfig {
            quorum: self.quorum,
            group_size: self.table.group_size,
            window: self.sentinel_window,
        }
    }
}
