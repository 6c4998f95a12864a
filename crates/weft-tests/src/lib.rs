//! Integration and end-to-end tests for the weft overlay.
//!
//! This crate provides:
//! - A multi-node harness over the in-process loopback transport
//! - A recording application for observing deliveries and churn
//! - End-to-end tests for bootstrap, formation and the data path

pub mod harness;
pub mod node;

pub use harness::TestNetwork;
pub use node::{RecordingApplication, TestNode};
