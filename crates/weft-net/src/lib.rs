//! Weft Network - transport contract and connection management.
//!
//! This crate provides:
//! - The `Transport` trait the overlay core is written against
//! - The connection manager: routing table plus live sessions
//! - The persistent bootstrap contact store
//! - An in-process loopback transport for tests and simulations

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bootstrap;
pub mod conn;
pub mod memory;
pub mod transport;

pub use bootstrap::{BootstrapStore, StoreError};
pub use conn::{CloseGroupDifference, ConnectionManager};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use transport::{Transport, TransportError, TransportEvent};
