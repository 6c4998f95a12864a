//! Weft Routing - the local view of the overlay.
//!
//! Provides:
//! - The bounded, distance-ordered routing table and close group
//! - Timed LRU caches backing the duplicate filter and content cache
//! - The sentinel accumulating group-authority quorums

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod lru;
pub mod sentinel;
pub mod table;

pub use lru::TimedLru;
pub use sentinel::{Sentinel, SentinelConfig, Verdict};
pub use table::{RoutingTable, RoutingTableConfig};

use std::time::Duration;

/// Default routing table capacity (K).
pub const DEFAULT_TABLE_SIZE: usize = 64;

/// Default close group size (G).
pub const DEFAULT_GROUP_SIZE: usize = 8;

/// Default quorum (Q): signatures needed to accept a group message.
pub const DEFAULT_QUORUM: usize = 5;

/// Default per-bucket capacity (B).
pub const DEFAULT_BUCKET_SIZE: usize = 1;

/// How long a duplicate-filter entry is remembered.
pub const FILTER_TTL: Duration = Duration::from_secs(20 * 60);

/// How long a cached payload is served.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// How long the sentinel waits for a quorum to assemble.
pub const SENTINEL_WINDOW: Duration = Duration::from_secs(60);

/// Bound on duplicate-filter entries.
pub const FILTER_CAPACITY: usize = 1024;

/// Bound on content-cache entries.
pub const CACHE_CAPACITY: usize = 1024;
