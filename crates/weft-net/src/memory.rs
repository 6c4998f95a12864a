//! In-process loopback transport.
//!
//! A registry of nodes keyed by endpoint, with per-node inboxes over
//! unbounded channels. Delivery is ordered and reliable per pair,
//! which is exactly the contract the overlay assumes of the real
//! transport, so multi-node behaviour can be exercised without
//! sockets.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use weft_core::Address;
use weft_proto::{Endpoint, NodeInfo};

use crate::transport::{Transport, TransportError, TransportEvent};

struct Slot {
    id: Address,
    endpoint: Endpoint,
    inbox: mpsc::UnboundedSender<TransportEvent>,
    links: Mutex<HashMap<Address, mpsc::UnboundedSender<TransportEvent>>>,
}

/// A simulated network: the registry all loopback transports share.
pub struct MemoryNetwork {
    slots: Mutex<HashMap<Endpoint, Arc<Slot>>>,
    next_port: Mutex<u16>,
}

impl MemoryNetwork {
    /// Creates an empty simulated network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            next_port: Mutex::new(5000),
        })
    }

    /// Attaches a node and returns its transport.
    ///
    /// Each node gets a distinct loopback endpoint standing in for its
    /// publicly reachable address.
    pub fn attach(self: &Arc<Self>, id: Address) -> MemoryTransport {
        let port = {
            let mut next = self.next_port.lock();
            *next += 1;
            *next
        };
        let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let slot = Arc::new(Slot {
            id,
            endpoint,
            inbox: inbox_tx,
            links: Mutex::new(HashMap::new()),
        });
        self.slots.lock().insert(endpoint, slot.clone());
        MemoryTransport {
            network: self.clone(),
            slot,
            inbox: tokio::sync::Mutex::new(inbox_rx),
        }
    }

    /// Returns the endpoint a node was attached on.
    pub fn endpoint_of(&self, id: &Address) -> Option<Endpoint> {
        self.slots
            .lock()
            .values()
            .find(|s| s.id == *id)
            .map(|s| s.endpoint)
    }

    fn slot_at(&self, endpoint: &Endpoint) -> Option<Arc<Slot>> {
        self.slots.lock().get(endpoint).cloned()
    }

    fn link(a: &Arc<Slot>, b: &Arc<Slot>) {
        a.links.lock().insert(b.id, b.inbox.clone());
        b.links.lock().insert(a.id, a.inbox.clone());
    }
}

/// One node's endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    slot: Arc<Slot>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn accepting_port(&self) -> u16 {
        self.slot.endpoint.port()
    }

    fn local_endpoint(&self) -> Endpoint {
        self.slot.endpoint
    }

    async fn connect(&self, endpoint: Endpoint) -> Result<(Address, Endpoint), TransportError> {
        let peer = self
            .network
            .slot_at(&endpoint)
            .ok_or_else(|| TransportError::ConnectionFailed(format!("no node at {endpoint}")))?;
        MemoryNetwork::link(&self.slot, &peer);
        Ok((peer.id, self.slot.endpoint))
    }

    async fn open(&self, peer: &NodeInfo) -> Result<(), TransportError> {
        let slot = self
            .network
            .slot_at(&peer.endpoints.external)
            .ok_or_else(|| {
                TransportError::ConnectionFailed(format!(
                    "no node at {}",
                    peer.endpoints.external
                ))
            })?;
        if slot.id != peer.id {
            return Err(TransportError::ConnectionFailed(format!(
                "endpoint {} answers as a different node",
                peer.endpoints.external
            )));
        }
        MemoryNetwork::link(&self.slot, &slot);
        Ok(())
    }

    async fn accept(&self, peer: &NodeInfo) -> Result<(), TransportError> {
        // Loopback sessions are symmetric; accepting is opening.
        self.open(peer).await
    }

    async fn disconnect(&self, peer: &Address) -> Result<(), TransportError> {
        let link = self.slot.links.lock().remove(peer);
        if let Some(inbox) = link {
            let _ = inbox.send(TransportEvent::Disconnected { peer: self.slot.id });
        }
        if let Some(endpoint) = self.network.endpoint_of(peer) {
            if let Some(slot) = self.network.slot_at(&endpoint) {
                slot.links.lock().remove(&self.slot.id);
            }
        }
        Ok(())
    }

    async fn send(&self, peer: &Address, bytes: Bytes) -> Result<(), TransportError> {
        let link = self
            .slot
            .links
            .lock()
            .get(peer)
            .cloned()
            .ok_or(TransportError::NotConnected)?;
        link.send(TransportEvent::Frame {
            peer: self.slot.id,
            bytes,
        })
        .map_err(|_| TransportError::SendFailed("peer inbox closed".into()))
    }

    async fn recv(&self) -> Result<TransportEvent, TransportError> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    fn is_connected(&self, peer: &Address) -> bool {
        self.slot.links.lock().contains_key(peer)
    }

    fn connected_peers(&self) -> Vec<Address> {
        self.slot.links.lock().keys().copied().collect()
    }
}
