//! Connection management: the routing table plus the live sessions
//! backing it.
//!
//! The manager keeps the table and the transport in step: a peer is
//! only added once its session is up, and dropping a peer tears the
//! session down. Mutations report how the close group changed so the
//! controller can propagate churn.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use weft_core::Address;
use weft_proto::{Endpoint, NodeInfo};
use weft_routing::{RoutingTable, RoutingTableConfig};

use crate::transport::{Transport, TransportError};

/// How a mutation changed the close group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseGroupDifference {
    /// Addresses now in the close group.
    pub joined: Vec<Address>,
    /// Addresses no longer in the close group.
    pub left: Vec<Address>,
}

impl CloseGroupDifference {
    /// Returns true if the close group did not change.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Façade over the routing table and transport sessions.
pub struct ConnectionManager {
    table: RoutingTable,
    transport: Arc<dyn Transport>,
}

impl ConnectionManager {
    /// Creates a manager for `our_id` over the given transport.
    pub fn new(
        our_id: Address,
        config: RoutingTableConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            table: RoutingTable::new(our_id, config),
            transport,
        }
    }

    /// Returns the local overlay address.
    pub fn our_id(&self) -> Address {
        self.table.our_id()
    }

    /// Returns the port new sessions are accepted on.
    pub fn accepting_port(&self) -> u16 {
        self.transport.accepting_port()
    }

    /// Returns the endpoint the transport is bound to.
    pub fn local_endpoint(&self) -> Endpoint {
        self.transport.local_endpoint()
    }

    /// Returns the transport for the receive loop.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Dials a bootstrap endpoint.
    pub async fn connect(
        &self,
        endpoint: Endpoint,
    ) -> Result<(Address, Endpoint), TransportError> {
        self.transport.connect(endpoint).await
    }

    /// Sends a frame to a connected peer.
    pub async fn send(&self, peer: &Address, bytes: Bytes) -> Result<(), TransportError> {
        self.transport.send(peer, bytes).await
    }

    /// Opens a session to `info` and adds it to the table.
    ///
    /// Returns the close group change, `None` when the table refused
    /// the peer (its session is torn down again).
    pub async fn add_node(
        &self,
        info: NodeInfo,
    ) -> Result<Option<CloseGroupDifference>, TransportError> {
        self.transport.open(&info).await?;
        Ok(self.admit(info).await)
    }

    /// Accepts a session from `info` and adds it to the table.
    pub async fn add_node_accept(
        &self,
        info: NodeInfo,
    ) -> Result<Option<CloseGroupDifference>, TransportError> {
        self.transport.accept(&info).await?;
        Ok(self.admit(info).await)
    }

    async fn admit(&self, info: NodeInfo) -> Option<CloseGroupDifference> {
        let id = info.id;
        let before = self.close_group_ids();
        let (added, evicted) = self.table.add(info);
        if let Some(evicted) = evicted {
            let _ = self.transport.disconnect(&evicted.id).await;
            debug!(peer = %evicted.id, "evicted peer for a closer one");
        }
        if !added {
            let _ = self.transport.disconnect(&id).await;
            return None;
        }
        debug!(peer = %id, size = self.table.size(), "added peer");
        self.difference_since(before)
    }

    /// Drops a peer and its session.
    pub async fn drop_node(&self, id: &Address) -> Option<CloseGroupDifference> {
        let before = self.close_group_ids();
        let existed = self.table.drop_node(id);
        let _ = self.transport.disconnect(id).await;
        if !existed {
            return None;
        }
        debug!(peer = %id, size = self.table.size(), "dropped peer");
        self.difference_since(before)
    }

    /// Records a session the transport lost on its own.
    pub fn connection_lost(&self, id: &Address) -> Option<CloseGroupDifference> {
        let before = self.close_group_ids();
        if !self.table.drop_node(id) {
            return None;
        }
        debug!(peer = %id, "lost connection");
        self.difference_since(before)
    }

    /// Returns true if an offer of `id` would be accepted.
    pub fn suggest(&self, id: &Address) -> bool {
        self.table.check(id)
    }

    /// Returns the peers a frame for `destination` goes to.
    pub fn targets(&self, destination: &Address) -> Vec<NodeInfo> {
        self.table.targets(destination)
    }

    /// Returns the close group, nearest first.
    pub fn close_group(&self) -> Vec<NodeInfo> {
        self.table.close_group()
    }

    /// Returns true if `address` is in our close group's range.
    pub fn in_close_group_range(&self, address: &Address) -> bool {
        self.table.in_close_group_range(address)
    }

    /// Returns the number of routing peers.
    pub fn size(&self) -> usize {
        self.table.size()
    }

    /// Returns the table capacity.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns true if `id` is in the table.
    pub fn contains(&self, id: &Address) -> bool {
        self.table.contains(id)
    }

    /// Returns the stored record for a table member.
    pub fn node_info(&self, id: &Address) -> Option<NodeInfo> {
        self.table.get(id)
    }

    /// Peers with live sessions that are not routing table members:
    /// clients attached to us, and joiners mid-handshake.
    pub fn non_routing_nodes(&self) -> Vec<Address> {
        self.transport
            .connected_peers()
            .into_iter()
            .filter(|id| !self.table.contains(id))
            .collect()
    }

    /// Sends a frame to an attached non-routing peer.
    pub async fn send_to_non_routing(
        &self,
        peer: &Address,
        bytes: Bytes,
    ) -> Result<(), TransportError> {
        self.transport.send(peer, bytes).await
    }

    fn close_group_ids(&self) -> Vec<Address> {
        self.table.close_group().iter().map(|n| n.id).collect()
    }

    fn difference_since(&self, before: Vec<Address>) -> Option<CloseGroupDifference> {
        let after = self.close_group_ids();
        let joined: Vec<Address> = after
            .iter()
            .filter(|id| !before.contains(id))
            .copied()
            .collect();
        let left: Vec<Address> = before
            .iter()
            .filter(|id| !after.contains(id))
            .copied()
            .collect();
        let diff = CloseGroupDifference { joined, left };
        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use weft_core::PublicKey;
    use weft_proto::EndpointPair;

    fn manager(network: &Arc<MemoryNetwork>, id: Address) -> ConnectionManager {
        let transport = Arc::new(network.attach(id));
        ConnectionManager::new(
            id,
            RoutingTableConfig {
                capacity: 8,
                group_size: 2,
                bucket_size: 8,
            },
            transport,
        )
    }

    fn peer_info(network: &Arc<MemoryNetwork>, id: Address) -> NodeInfo {
        let endpoint = network.endpoint_of(&id).unwrap();
        NodeInfo::new(
            id,
            PublicKey::new([0u8; 32]),
            EndpointPair::new(endpoint, endpoint),
        )
    }

    #[tokio::test]
    async fn add_node_links_and_reports_churn() {
        let network = MemoryNetwork::new();
        let a = Address::random();
        let b = Address::random();
        let ours = manager(&network, a);
        let _theirs = manager(&network, b);

        let diff = ours.add_node(peer_info(&network, b)).await.unwrap();
        assert_eq!(diff.unwrap().joined, vec![b]);
        assert_eq!(ours.size(), 1);
        assert!(ours.transport().is_connected(&b));
    }

    #[tokio::test]
    async fn rejected_add_tears_the_session_down() {
        let network = MemoryNetwork::new();
        let a = Address::random();
        let b = Address::random();
        let ours = manager(&network, a);
        let _theirs = manager(&network, b);

        let info = peer_info(&network, b);
        ours.add_node(info.clone()).await.unwrap();
        // A duplicate offer is refused and its session dropped.
        let diff = ours.add_node(info).await.unwrap();
        assert!(diff.is_none());
        assert_eq!(ours.size(), 1);
    }

    #[tokio::test]
    async fn drop_node_reports_group_change() {
        let network = MemoryNetwork::new();
        let a = Address::random();
        let b = Address::random();
        let ours = manager(&network, a);
        let _theirs = manager(&network, b);

        ours.add_node(peer_info(&network, b)).await.unwrap();
        let diff = ours.drop_node(&b).await.unwrap();
        assert_eq!(diff.left, vec![b]);
        assert_eq!(ours.size(), 0);
        assert!(ours.drop_node(&b).await.is_none());
    }

    #[tokio::test]
    async fn connected_non_members_are_non_routing() {
        let network = MemoryNetwork::new();
        let a = Address::random();
        let client = Address::random();
        let ours = manager(&network, a);
        let theirs = manager(&network, client);

        // The client dials us without ever being added to the table.
        theirs
            .connect(ours.local_endpoint())
            .await
            .unwrap();

        assert_eq!(ours.non_routing_nodes(), vec![client]);
        ours.send_to_non_routing(&client, Bytes::from_static(b"hi"))
            .await
            .unwrap();
    }
}
