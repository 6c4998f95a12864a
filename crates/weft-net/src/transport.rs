//! The transport contract the overlay is written against.
//!
//! The real reliable-UDP stack lives outside this workspace; the core
//! only assumes authenticated sessions with ordered reliable delivery
//! per peer pair. Failures are reported, never retried here.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use weft_core::Address;
use weft_proto::{Endpoint, NodeInfo};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("connection timeout")]
    Timeout,

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No session with the peer
    #[error("not connected to peer")]
    NotConnected,

    /// The transport has shut down
    #[error("transport closed")]
    Closed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upcalls delivered by the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A frame arrived from an authenticated peer.
    Frame {
        /// The sending peer.
        peer: Address,
        /// The raw frame bytes.
        bytes: Bytes,
    },
    /// A session was lost.
    Disconnected {
        /// The peer whose session dropped.
        peer: Address,
    },
}

/// An authenticated, reliable, ordered per-peer message transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the port the transport accepts sessions on.
    fn accepting_port(&self) -> u16;

    /// Returns the local endpoint the transport is bound to.
    fn local_endpoint(&self) -> Endpoint;

    /// Dials an endpoint and completes the handshake.
    ///
    /// Resolves to the authenticated peer's overlay address and the
    /// external endpoint the peer observed us on.
    async fn connect(&self, endpoint: Endpoint) -> Result<(Address, Endpoint), TransportError>;

    /// Establishes a session with a known peer (we initiate).
    async fn open(&self, peer: &NodeInfo) -> Result<(), TransportError>;

    /// Establishes a session with a known peer (the peer initiates).
    async fn accept(&self, peer: &NodeInfo) -> Result<(), TransportError>;

    /// Tears down the session with a peer.
    async fn disconnect(&self, peer: &Address) -> Result<(), TransportError>;

    /// Sends a frame to a connected peer.
    async fn send(&self, peer: &Address, bytes: Bytes) -> Result<(), TransportError>;

    /// Receives the next transport upcall.
    async fn recv(&self) -> Result<TransportEvent, TransportError>;

    /// Returns true if a session with the peer is live.
    fn is_connected(&self, peer: &Address) -> bool;

    /// Returns the peers with live sessions.
    fn connected_peers(&self) -> Vec<Address>;
}
