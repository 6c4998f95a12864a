//! The node controller and its ingress pipeline.
//!
//! Every inbound frame runs the same gauntlet: parse, duplicate
//! filter, opportunistic cache, swarm forward, relay, locality gate,
//! direct-message gate, sentinel, typed handler. The controller also
//! drives bootstrap and close-group formation and exposes the public
//! messaging surface.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use weft_core::{
    Address, DecodeError, Identity, NodeIdentity, PublicKey, SignatureError, WireEncode,
};
use weft_net::{
    BootstrapStore, ConnectionManager, StoreError, Transport, TransportError, TransportEvent,
};
use weft_proto::{
    serialise, Authority, Connect, ConnectResponse, Contact, DestinationAddress, Endpoint,
    EndpointPair, Envelope, FindGroup, FindGroupResponse, GetData, GetDataResponse, MessageBody,
    MessageHeader, MessageTypeTag, NodeInfo, SourceAddress,
};
use weft_routing::{Sentinel, TimedLru, Verdict};

use crate::app::{Application, GetOutcome};
use crate::config::NodeConfig;

/// Errors surfaced by the node controller.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A frame or stored record failed to decode
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A signature failed to verify
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// The transport reported a failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The bootstrap store reported a failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No authority rule matched the message
    #[error("unknown authority")]
    InvalidAuthority,

    /// The bootstrap store holds no contacts
    #[error("no bootstrap contacts")]
    NoContacts,

    /// Every bootstrap contact was unreachable
    #[error("all bootstrap contacts unreachable")]
    BootstrapFailed,
}

/// A running overlay node.
pub struct Node {
    identity: NodeIdentity,
    config: NodeConfig,
    conn: ConnectionManager,
    store: BootstrapStore,
    app: Arc<dyn Application>,
    message_id: AtomicU32,
    bootstrap_node: Mutex<Option<Address>>,
    external_endpoint: Mutex<Option<Endpoint>>,
    filter: Mutex<TimedLru<(Address, u32), ()>>,
    cache: Mutex<TimedLru<Identity, Vec<u8>>>,
    sentinel: Mutex<Sentinel>,
    shutdown: Arc<Notify>,
}

impl Node {
    /// Creates a node from its identity, transport and application.
    ///
    /// The node's own public identity is seeded into the content cache
    /// under its address so joining peers can fetch it.
    pub fn new(
        identity: NodeIdentity,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        store_path: &Path,
        app: Arc<dyn Application>,
    ) -> Result<Arc<Self>, NodeError> {
        let our_id = identity.address();
        let conn = ConnectionManager::new(our_id, config.table.clone(), transport);
        let store = BootstrapStore::open(store_path)?;

        let mut cache = TimedLru::new(config.cache_ttl, config.cache_capacity);
        cache.add(Identity::from(our_id), identity.public_key().to_vec());

        let node = Arc::new(Self {
            filter: Mutex::new(TimedLru::new(config.filter_ttl, config.filter_capacity)),
            cache: Mutex::new(cache),
            sentinel: Mutex::new(Sentinel::new(config.sentinel())),
            message_id: AtomicU32::new(rand::random()),
            bootstrap_node: Mutex::new(None),
            external_endpoint: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            identity,
            config,
            conn,
            store,
            app,
        });
        info!(id = %node.our_id(), "node created");
        Ok(node)
    }

    /// Spawns the receive loop driving the ingress pipeline.
    ///
    /// The task holds only a weak reference: dropping the last strong
    /// handle stops it without touching freed state.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let transport = self.conn.transport();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.notified() => break,
                    event = transport.recv() => event,
                };
                let Ok(event) = event else { break };
                let Some(node) = weak.upgrade() else { break };
                match event {
                    TransportEvent::Frame { bytes, .. } => node.message_received(bytes).await,
                    TransportEvent::Disconnected { peer } => node.connection_lost(&peer),
                }
            }
        })
    }

    /// Returns our overlay address.
    pub fn our_id(&self) -> Address {
        self.conn.our_id()
    }

    /// Returns the peer we are still bootstrapping through, if any.
    pub fn bootstrap_node(&self) -> Option<Address> {
        *self.bootstrap_node.lock()
    }

    /// Returns the source address our next outbound frame will carry.
    pub fn source_address(&self) -> SourceAddress {
        self.our_source_address()
    }

    /// Returns routing table fullness as a percentage.
    pub fn status(&self) -> u8 {
        (self.conn.size() * 100 / self.conn.capacity()) as u8
    }

    /// Returns the number of routing peers.
    pub fn table_size(&self) -> usize {
        self.conn.size()
    }

    /// Returns the close group member addresses, nearest first.
    pub fn close_group(&self) -> Vec<Address> {
        self.conn.close_group().iter().map(|n| n.id).collect()
    }

    /// Looks a payload up in the content cache.
    pub fn cache_lookup(&self, name: &Identity) -> Option<Vec<u8>> {
        self.cache.lock().get(name)
    }

    /// Adds a seed to the bootstrap store.
    pub fn add_bootstrap_contact(&self, contact: Contact) -> Result<(), NodeError> {
        self.store.add_many(std::slice::from_ref(&contact))?;
        Ok(())
    }

    /// Bootstraps from the stored contacts.
    ///
    /// Idempotent; completes once the first seed answers and the
    /// close-group probe is on the wire.
    pub async fn bootstrap(&self) -> Result<(), NodeError> {
        if self.bootstrap_node().is_some() {
            return Ok(());
        }
        let contacts = self.store.read_all()?;
        if contacts.is_empty() {
            return Err(NodeError::NoContacts);
        }
        for contact in contacts {
            match self.conn.connect(contact.endpoints.external).await {
                Ok((peer, our_external)) => {
                    if peer != contact.id {
                        warn!(
                            expected = %contact.id,
                            got = %peer,
                            "seed answered as a different node"
                        );
                        continue;
                    }
                    self.became_bootstrapped(peer, our_external).await;
                    return Ok(());
                }
                Err(err) => {
                    warn!(endpoint = %contact.endpoints.external, %err, "seed unreachable");
                }
            }
        }
        Err(NodeError::BootstrapFailed)
    }

    /// Bootstraps from one explicit endpoint, storing it as a seed.
    pub async fn bootstrap_from(&self, endpoint: Endpoint) -> Result<(), NodeError> {
        let (peer, our_external) = self.conn.connect(endpoint).await?;
        self.store
            .add_many(&[Contact::new(peer, EndpointPair::new(endpoint, endpoint))])?;
        self.became_bootstrapped(peer, our_external).await;
        Ok(())
    }

    async fn became_bootstrapped(&self, peer: Address, our_external: Endpoint) {
        info!(seed = %peer, external = %our_external, "bootstrapped");
        *self.bootstrap_node.lock() = Some(peer);
        *self.external_endpoint.lock() = Some(our_external);
        self.connect_to_close_group().await;
    }

    /// Sends a `GetData` for `name` toward its managers.
    pub async fn get(&self, data_tag: u32, name: Identity) -> Result<(), NodeError> {
        let to = Address::from(name);
        let header = MessageHeader::new(
            DestinationAddress::node(to),
            self.our_source_address(),
            self.next_message_id(),
            Authority::Node,
        );
        let body = MessageBody::GetData(GetData {
            data_tag,
            name,
            from: self.our_source_address(),
        });
        self.send_routed(&header.destination, serialise(&header, &body))
            .await
    }

    /// Sends a `PutData` toward `to`.
    pub async fn put(&self, to: Address, data_tag: u32, payload: Vec<u8>) -> Result<(), NodeError> {
        let header = MessageHeader::new(
            DestinationAddress::node(to),
            self.our_source_address(),
            self.next_message_id(),
            Authority::Client,
        );
        let body = MessageBody::PutData(weft_proto::PutData { data_tag, payload });
        self.send_routed(&header.destination, serialise(&header, &body))
            .await
    }

    /// Sends a `Post` toward `to`.
    pub async fn post(&self, to: Address, data_tag: u32, payload: Vec<u8>) -> Result<(), NodeError> {
        let header = MessageHeader::new(
            DestinationAddress::node(to),
            self.our_source_address(),
            self.next_message_id(),
            Authority::Node,
        );
        let body = MessageBody::Post(weft_proto::Post { data_tag, payload });
        self.send_routed(&header.destination, serialise(&header, &body))
            .await
    }

    /// Runs the ingress pipeline on one raw frame.
    pub async fn message_received(&self, bytes: Bytes) {
        // 1. Parse header and tag; fail closed.
        let envelope = match Envelope::parse(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(%err, "dropping malformed frame");
                return;
            }
        };
        let header = envelope.header;

        // 2. Duplicate filter. Inserted before any further processing
        // so our own forwarding cannot re-enter.
        let key = header.filter_value();
        {
            let mut filter = self.filter.lock();
            if filter.check(&key) {
                debug!(source = %key.0, message_id = key.1, "duplicate frame");
                return;
            }
            filter.add(key, ());
        }

        // 3. Remember data payloads that pass through us.
        if envelope.tag == MessageTypeTag::GetDataResponse {
            if let Ok(MessageBody::GetDataResponse(response)) = envelope.parse_body() {
                if let Some(data) = response.data {
                    self.cache.lock().add(response.name, data);
                }
            }
        }

        // 4. Optionally answer fetches straight from the cache.
        if envelope.tag == MessageTypeTag::GetData && self.config.serve_from_cache {
            if let Ok(MessageBody::GetData(request)) = envelope.parse_body() {
                let cached = self.cache.lock().get(&request.name);
                if let Some(data) = cached {
                    self.reply_from_cache(&header, request, data).await;
                    return;
                }
            }
        }

        // 5. Swarm forward: the original bytes, to every target.
        for target in self.conn.targets(&header.destination.address) {
            if let Err(err) = self.conn.send(&target.id, bytes.clone()).await {
                warn!(peer = %target.id, %err, "forward failed");
            }
        }

        // 6. Hand relayed replies to the attached client they are for.
        if let Some(client) = header.reply_to() {
            if self.conn.non_routing_nodes().contains(&client) {
                if let Err(err) = self.conn.send_to_non_routing(&client, bytes.clone()).await {
                    warn!(peer = %client, %err, "relay delivery failed");
                }
                return;
            }
        }

        // 7. Locality gate: beyond our close group range we are done.
        if !self.conn.in_close_group_range(&header.destination.address) {
            return;
        }

        // 8. Direct messages must name us exactly, either as the
        // routed address or as the relay hand-off; close-range
        // neighbours of the target drop them here.
        if matches!(
            envelope.tag,
            MessageTypeTag::Connect | MessageTypeTag::ConnectResponse
        ) && header.destination.address != self.our_id()
            && header.reply_to() != Some(self.our_id())
        {
            return;
        }

        // 9. Group-authority messages pass the sentinel first.
        if header.from_group().is_some() {
            match self.sentinel_check(&envelope) {
                Some(Verdict::Accept) => {}
                Some(Verdict::Reject) => {
                    warn!(source = %header.from_node(), "group message rejected by sentinel");
                    return;
                }
                None => return,
            }
        }

        // 10. Typed dispatch.
        let body = match envelope.parse_body() {
            Ok(body) => body,
            Err(err) => {
                error!(%err, tag = ?envelope.tag, "dropping malformed body");
                return;
            }
        };
        match body {
            MessageBody::Connect(connect) => self.handle_connect(connect, &envelope).await,
            MessageBody::ConnectResponse(response) => {
                self.handle_connect_response(response, &envelope).await
            }
            MessageBody::FindGroup(probe) => self.handle_find_group(probe, &header).await,
            MessageBody::FindGroupResponse(response) => {
                self.handle_find_group_response(response).await
            }
            MessageBody::GetData(request) => self.handle_get_data(request, &header).await,
            body @ (MessageBody::GetDataResponse(_)
            | MessageBody::PutData(_)
            | MessageBody::PutDataResponse(_)
            | MessageBody::Post(_)) => self.deliver(header, body),
        }
    }

    /// A join offer: answer it and accept the requester.
    async fn handle_connect(&self, connect: Connect, envelope: &Envelope) {
        let header = &envelope.header;
        if Address::from_public_key(&connect.requester_public_key) != connect.requester_id {
            warn!(requester = %connect.requester_id, "join offer under a foreign key");
            return;
        }
        if self
            .verify_signed(envelope, &connect.requester_public_key)
            .is_err()
        {
            warn!(requester = %connect.requester_id, "join offer with bad signature");
            return;
        }
        if connect.receiver_id != self.our_id() {
            debug!(receiver = %connect.receiver_id, "join offer for someone else");
            return;
        }
        if !self.conn.suggest(&connect.requester_id) {
            return;
        }

        let response = ConnectResponse {
            requester_endpoints: connect.requester_endpoints,
            receiver_endpoints: self.next_endpoint_pair(),
            requester_id: connect.requester_id,
            receiver_id: self.our_id(),
            receiver_public_key: self.identity.public_key(),
        };
        let body = MessageBody::ConnectResponse(response);
        let reply_header = MessageHeader::signed(
            header.return_destination(),
            self.our_source_address(),
            header.message_id,
            Authority::Node,
            self.identity.sign(&body.signable_bytes()),
        );
        let frame = serialise(&reply_header, &body);
        if let Err(err) = self.send_routed(&reply_header.destination, frame).await {
            warn!(%err, "could not answer join offer");
        }

        let info = NodeInfo::new(
            connect.requester_id,
            connect.requester_public_key,
            connect.requester_endpoints,
        );
        match self.conn.add_node_accept(info).await {
            Ok(Some(diff)) => self.app.on_churn(diff),
            Ok(None) => {}
            Err(err) => warn!(peer = %connect.requester_id, %err, "could not accept joiner"),
        }
    }

    /// Our join offer was answered: admit the responder.
    async fn handle_connect_response(&self, response: ConnectResponse, envelope: &Envelope) {
        if response.requester_id != self.our_id() {
            debug!(requester = %response.requester_id, "join answer for someone else");
            return;
        }
        if Address::from_public_key(&response.receiver_public_key) != response.receiver_id {
            warn!(responder = %response.receiver_id, "join answer under a foreign key");
            return;
        }
        if self
            .verify_signed(envelope, &response.receiver_public_key)
            .is_err()
        {
            warn!(responder = %response.receiver_id, "join answer with bad signature");
            return;
        }
        if !self.conn.suggest(&response.receiver_id) {
            return;
        }

        let info = NodeInfo::new(
            response.receiver_id,
            response.receiver_public_key,
            response.receiver_endpoints,
        );
        let diff = match self.conn.add_node(info).await {
            Ok(diff) => diff,
            Err(err) => {
                warn!(peer = %response.receiver_id, %err, "could not connect to responder");
                return;
            }
        };

        // Enough of the overlay knows us: stand on our own feet.
        if self.conn.size() >= self.config.quorum {
            let mut bootstrap = self.bootstrap_node.lock();
            if bootstrap.take().is_some() {
                info!("left bootstrap relay; routing in our own right");
            }
        }

        if let Some(diff) = diff {
            self.app.on_churn(diff);
            // The close group shifted; probe for anyone we are missing.
            self.connect_to_close_group().await;
        }
    }

    /// A group probe: answer with our close group's identity keys.
    async fn handle_find_group(&self, probe: FindGroup, header: &MessageHeader) {
        let mut group: Vec<PublicKey> = self
            .conn
            .close_group()
            .iter()
            .map(|n| n.public_key)
            .collect();
        group.push(self.identity.public_key());

        let body = MessageBody::FindGroupResponse(FindGroupResponse {
            target_id: probe.target_id,
            group,
        });
        let reply_header = MessageHeader::signed(
            header.return_destination(),
            self.group_source(probe.target_id),
            header.message_id,
            Authority::NaeManager,
            self.identity.sign(&body.signable_bytes()),
        );
        let frame = serialise(&reply_header, &body);
        if let Err(err) = self.send_routed(&reply_header.destination, frame).await {
            warn!(%err, "could not answer group probe");
        }
    }

    /// A group probe answer: offer ourselves to every member we lack.
    async fn handle_find_group_response(&self, response: FindGroupResponse) {
        for public_key in response.group {
            let peer = Address::from_public_key(&public_key);
            if peer == self.our_id() || !self.conn.suggest(&peer) {
                continue;
            }
            let connect = Connect {
                requester_endpoints: self.next_endpoint_pair(),
                requester_id: self.our_id(),
                receiver_id: peer,
                requester_public_key: self.identity.public_key(),
            };
            let body = MessageBody::Connect(connect);
            let header = MessageHeader::signed(
                DestinationAddress::node(peer),
                self.our_source_address(),
                self.next_message_id(),
                Authority::Node,
                self.identity.sign(&body.signable_bytes()),
            );
            if let Err(err) = self
                .send_routed(&header.destination, serialise(&header, &body))
                .await
            {
                warn!(%peer, %err, "could not offer to join");
            }
        }
    }

    /// A fetch terminated here: let the application decide.
    async fn handle_get_data(&self, request: GetData, header: &MessageHeader) {
        let element = Address::from(request.name);
        let authority = match self.our_authority(&element, header) {
            Ok(authority) => authority,
            Err(_) => {
                warn!(name = %request.name, "fetch with no matching authority");
                return;
            }
        };
        match self
            .app
            .on_get(header.source, authority, request.data_tag, request.name)
        {
            // Nothing for us to add; the swarm forward already happened.
            None | Some(GetOutcome::Forward) => {}
            Some(GetOutcome::Reply(data)) => {
                let body = MessageBody::GetDataResponse(GetDataResponse {
                    name: request.name,
                    data: Some(data),
                    from: self.our_source_address(),
                });
                let reply_header = MessageHeader::signed(
                    header.return_destination(),
                    self.group_source(element),
                    header.message_id,
                    Authority::NaeManager,
                    self.identity.sign(&body.signable_bytes()),
                );
                let frame = serialise(&reply_header, &body);
                if let Err(err) = self.send_routed(&reply_header.destination, frame).await {
                    warn!(%err, "could not answer fetch");
                }
            }
        }
    }

    async fn reply_from_cache(&self, header: &MessageHeader, request: GetData, data: Vec<u8>) {
        debug!(name = %request.name, "answering fetch from cache");
        let body = MessageBody::GetDataResponse(GetDataResponse {
            name: request.name,
            data: Some(data),
            from: self.our_source_address(),
        });
        let reply_header = MessageHeader::new(
            header.return_destination(),
            self.our_source_address(),
            header.message_id,
            Authority::Node,
        );
        let frame = serialise(&reply_header, &body);
        if let Err(err) = self.send_routed(&reply_header.destination, frame).await {
            warn!(%err, "could not answer fetch from cache");
        }
    }

    fn deliver(&self, header: MessageHeader, body: MessageBody) {
        let tag = body.tag();
        self.app.on_message(header.source, header.authority, tag, body);
    }

    fn connection_lost(&self, peer: &Address) {
        if let Some(diff) = self.conn.connection_lost(peer) {
            self.app.on_churn(diff);
        }
    }

    /// Probes for our own close group.
    ///
    /// Called on bootstrap and again whenever the close group shifts,
    /// so the table converges on the true nearest peers.
    async fn connect_to_close_group(&self) {
        let our_id = self.our_id();
        let body = MessageBody::FindGroup(FindGroup {
            target_id: our_id,
            requester_id: our_id,
        });
        let header = MessageHeader::new(
            DestinationAddress::node(our_id),
            self.our_source_address(),
            self.next_message_id(),
            Authority::Node,
        );
        if let Err(err) = self
            .send_routed(&header.destination, serialise(&header, &body))
            .await
        {
            warn!(%err, "close-group probe failed");
        }
    }

    /// Derives our authority over `element` for a message.
    fn our_authority(
        &self,
        element: &Address,
        header: &MessageHeader,
    ) -> Result<Authority, NodeError> {
        let destination = header.destination.address;
        if header.from_group().is_none()
            && self.conn.in_close_group_range(&header.from_node())
            && destination != *element
        {
            return Ok(Authority::ClientManager);
        }
        if self.conn.in_close_group_range(element) && destination == *element {
            return Ok(Authority::NaeManager);
        }
        if let Some(group) = header.from_group() {
            if self.conn.in_close_group_range(&destination) && destination != self.our_id() {
                return Ok(Authority::NodeManager);
            }
            if self.conn.in_close_group_range(&group) && destination == self.our_id() {
                return Ok(Authority::ManagedNode);
            }
        }
        Err(NodeError::InvalidAuthority)
    }

    fn sentinel_check(&self, envelope: &Envelope) -> Option<Verdict> {
        let header = &envelope.header;
        let group = header.from_group()?;
        let Some(signature) = header.signature else {
            warn!(source = %header.from_node(), "unsigned group-authority message");
            return None;
        };
        let claimant = header.from_node();
        let Some(public_key) = self.claimant_key(&claimant, envelope) else {
            debug!(%claimant, "no key to verify group claim against");
            return None;
        };
        self.sentinel.lock().add(
            (group, header.message_id),
            claimant,
            &public_key,
            envelope.body_bytes(),
            &signature,
        )
    }

    /// Finds the key a group claim must verify against: a table entry,
    /// or a key the message itself carries for its sender.
    fn claimant_key(&self, claimant: &Address, envelope: &Envelope) -> Option<PublicKey> {
        if let Some(info) = self.conn.node_info(claimant) {
            return Some(info.public_key);
        }
        if envelope.tag == MessageTypeTag::FindGroupResponse {
            if let Ok(MessageBody::FindGroupResponse(response)) = envelope.parse_body() {
                return response
                    .group
                    .into_iter()
                    .find(|key| Address::from_public_key(key) == *claimant);
            }
        }
        None
    }

    fn verify_signed(&self, envelope: &Envelope, key: &PublicKey) -> Result<(), NodeError> {
        let signature = envelope
            .header
            .signature
            .ok_or(NodeError::Signature(SignatureError::VerificationFailed))?;
        key.verify(envelope.body_bytes(), &signature)?;
        Ok(())
    }

    fn our_source_address(&self) -> SourceAddress {
        match *self.bootstrap_node.lock() {
            // No standing in the overlay yet: speak through the seed.
            Some(bootstrap) => SourceAddress::relayed(bootstrap, self.our_id()),
            None => SourceAddress::direct(self.our_id()),
        }
    }

    fn group_source(&self, group: Address) -> SourceAddress {
        SourceAddress::group(self.our_id(), group)
    }

    fn next_endpoint_pair(&self) -> EndpointPair {
        let local = self.conn.local_endpoint();
        let external = self.external_endpoint.lock().unwrap_or(local);
        EndpointPair::new(local, external)
    }

    fn next_message_id(&self) -> u32 {
        self.message_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    /// Sends a frame toward its destination: via the bootstrap peer
    /// while we have no standing of our own, by direct hand-off when
    /// the frame is a relayed reply we ourselves are the relay for or
    /// its address is a client attached to us, otherwise to the
    /// table's targets.
    async fn send_routed(
        &self,
        destination: &DestinationAddress,
        frame: Bytes,
    ) -> Result<(), NodeError> {
        let via_bootstrap = *self.bootstrap_node.lock();
        if let Some(peer) = via_bootstrap {
            self.conn.send(&peer, frame).await?;
            return Ok(());
        }
        if let Some(client) = destination.reply_to {
            // A relayed reply routed through us: hand it straight over.
            if destination.address == self.our_id() {
                if self.conn.non_routing_nodes().contains(&client) {
                    self.conn.send_to_non_routing(&client, frame).await?;
                } else if self.conn.contains(&client) {
                    self.conn.send(&client, frame).await?;
                } else {
                    debug!(%client, "no attached client for relayed reply");
                }
                return Ok(());
            }
        }
        if self.conn.non_routing_nodes().contains(&destination.address) {
            self.conn
                .send_to_non_routing(&destination.address, frame)
                .await?;
            return Ok(());
        }
        let targets = self.conn.targets(&destination.address);
        let mut sent = targets.is_empty();
        let mut last_error = None;
        for node in &targets {
            match self.conn.send(&node.id, frame.clone()).await {
                Ok(()) => sent = true,
                Err(err) => {
                    warn!(peer = %node.id, %err, "send failed");
                    last_error = Some(err);
                }
            }
        }
        match (sent, last_error) {
            (false, Some(err)) => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use weft_net::{CloseGroupDifference, MemoryNetwork};
    use weft_routing::RoutingTableConfig;

    struct NullApp;

    impl Application for NullApp {
        fn on_message(
            &self,
            _source: SourceAddress,
            _authority: Authority,
            _tag: MessageTypeTag,
            _body: MessageBody,
        ) {
        }
        fn on_churn(&self, _diff: CloseGroupDifference) {}
        fn on_get(
            &self,
            _source: SourceAddress,
            _authority: Authority,
            _data_tag: u32,
            _name: Identity,
        ) -> Option<GetOutcome> {
            None
        }
    }

    fn test_config() -> NodeConfig {
        NodeConfig {
            table: RoutingTableConfig {
                capacity: 8,
                group_size: 2,
                bucket_size: 8,
            },
            quorum: 1,
            ..NodeConfig::default()
        }
    }

    fn make_node(network: &Arc<MemoryNetwork>) -> (Arc<Node>, TempDir) {
        let identity = NodeIdentity::generate();
        let transport = Arc::new(network.attach(identity.address()));
        let dir = TempDir::new().unwrap();
        let node = Node::new(
            identity,
            test_config(),
            transport,
            dir.path(),
            Arc::new(NullApp),
        )
        .unwrap();
        (node, dir)
    }

    async fn add_peer(network: &Arc<MemoryNetwork>, node: &Node, id: Address) {
        // Registering keeps the peer's slot alive in the network even
        // after its transport handle drops.
        let _ = network.attach(id);
        let endpoint = network.endpoint_of(&id).unwrap();
        let info = NodeInfo::new(
            id,
            PublicKey::new([0u8; 32]),
            EndpointPair::new(endpoint, endpoint),
        );
        node.conn.add_node(info).await.unwrap();
    }

    #[tokio::test]
    async fn source_address_tracks_bootstrap_state() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);

        assert_eq!(node.source_address(), SourceAddress::direct(node.our_id()));

        let seed = Address::random();
        *node.bootstrap_node.lock() = Some(seed);
        assert_eq!(
            node.source_address(),
            SourceAddress::relayed(seed, node.our_id())
        );
    }

    #[tokio::test]
    async fn identity_is_seeded_into_the_cache() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);

        let payload = node.cache_lookup(&Identity::from(node.our_id())).unwrap();
        assert_eq!(payload, node.identity.public_key().to_vec());
    }

    #[tokio::test]
    async fn status_is_table_fullness_percent() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);
        assert_eq!(node.status(), 0);

        add_peer(&network, &node, Address::random()).await;
        add_peer(&network, &node, Address::random()).await;
        // Two of eight slots.
        assert_eq!(node.status(), 25);
    }

    #[tokio::test]
    async fn endpoint_pair_falls_back_to_local() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);

        let pair = node.next_endpoint_pair();
        assert_eq!(pair.local, node.conn.local_endpoint());
        assert_eq!(pair.external, pair.local);

        let observed = Endpoint::new("203.0.113.1".parse().unwrap(), 9000);
        *node.external_endpoint.lock() = Some(observed);
        assert_eq!(node.next_endpoint_pair().external, observed);
    }

    #[tokio::test]
    async fn authority_rules_match_positions() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);

        let peer = Address::random();
        add_peer(&network, &node, peer).await;

        // Single-node source in our range, destination differs from
        // the element: we manage the client.
        let element = Address::random();
        let header = MessageHeader::new(
            DestinationAddress::node(Address::random()),
            SourceAddress::direct(peer),
            1,
            Authority::Client,
        );
        assert_eq!(
            node.our_authority(&element, &header).unwrap(),
            Authority::ClientManager
        );

        // Destination equals the element in our range: we manage data.
        let header = MessageHeader::new(
            DestinationAddress::node(element),
            SourceAddress::direct(peer),
            2,
            Authority::Client,
        );
        assert_eq!(
            node.our_authority(&element, &header).unwrap(),
            Authority::NaeManager
        );

        // Group source, destination a node in our range (not us).
        let header = MessageHeader::new(
            DestinationAddress::node(peer),
            SourceAddress::group(peer, Address::random()),
            3,
            Authority::NaeManager,
        );
        assert_eq!(
            node.our_authority(&element, &header).unwrap(),
            Authority::NodeManager
        );

        // Group source near us, destination is us, element elsewhere.
        let group = Address::random();
        let header = MessageHeader::new(
            DestinationAddress::node(node.our_id()),
            SourceAddress::group(peer, group),
            4,
            Authority::NaeManager,
        );
        assert_eq!(
            node.our_authority(&Address::random(), &header).unwrap(),
            Authority::ManagedNode
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_quietly() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);
        node.message_received(Bytes::from_static(&[0xDE, 0xAD])).await;
        assert_eq!(node.table_size(), 0);
    }

    #[tokio::test]
    async fn duplicate_frames_stop_at_the_filter() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);

        let source = Address::random();
        let header = MessageHeader::new(
            DestinationAddress::node(node.our_id()),
            SourceAddress::direct(source),
            7,
            Authority::Node,
        );
        let body = MessageBody::GetDataResponse(GetDataResponse {
            name: Identity::random(),
            data: Some(vec![1, 2, 3]),
            from: SourceAddress::direct(source),
        });
        let frame = serialise(&header, &body);

        node.message_received(frame.clone()).await;
        let name = match &body {
            MessageBody::GetDataResponse(r) => r.name,
            _ => unreachable!(),
        };
        assert_eq!(node.cache_lookup(&name), Some(vec![1, 2, 3]));

        // Second copy: filtered before any caching could repeat.
        node.message_received(frame).await;
        assert!(node.filter.lock().check(&(source, 7)));
    }

    #[tokio::test]
    async fn bootstrap_with_empty_store_errors() {
        let network = MemoryNetwork::new();
        let (node, _dir) = make_node(&network);
        assert!(matches!(node.bootstrap().await, Err(NodeError::NoContacts)));
    }
}
