//! Test node: a real overlay node over the loopback transport, with a
//! recording application behind it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::info;

use weft_core::{Identity, NodeIdentity};
use weft_net::{CloseGroupDifference, MemoryNetwork, Transport};
use weft_node::{Application, GetOutcome, Node, NodeConfig};
use weft_proto::{
    Authority, Contact, Endpoint, EndpointPair, MessageBody, MessageTypeTag, SourceAddress,
};

/// One delivered application message.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    /// Who sent it.
    pub source: SourceAddress,
    /// With what authority.
    pub authority: Authority,
    /// The message tag.
    pub tag: MessageTypeTag,
    /// The decoded body.
    pub body: MessageBody,
}

/// Application that records every callback and can serve data.
#[derive(Default)]
pub struct RecordingApplication {
    messages: Mutex<Vec<DeliveredMessage>>,
    churn: Mutex<Vec<CloseGroupDifference>>,
    get_calls: Mutex<Vec<Identity>>,
    /// Data served in response to `on_get`.
    pub data: Mutex<HashMap<Identity, Vec<u8>>>,
}

impl RecordingApplication {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the delivered messages so far.
    pub fn messages(&self) -> Vec<DeliveredMessage> {
        self.messages.lock().clone()
    }

    /// Returns how many messages of `tag` were delivered.
    pub fn count(&self, tag: MessageTypeTag) -> usize {
        self.messages.lock().iter().filter(|m| m.tag == tag).count()
    }

    /// Returns the churn events observed so far.
    pub fn churn(&self) -> Vec<CloseGroupDifference> {
        self.churn.lock().clone()
    }

    /// Returns how many fetches reached this application.
    pub fn get_calls(&self) -> usize {
        self.get_calls.lock().len()
    }

    /// Makes `name` fetchable from this node.
    pub fn serve(&self, name: Identity, payload: Vec<u8>) {
        self.data.lock().insert(name, payload);
    }
}

impl Application for RecordingApplication {
    fn on_message(
        &self,
        source: SourceAddress,
        authority: Authority,
        tag: MessageTypeTag,
        body: MessageBody,
    ) {
        self.messages.lock().push(DeliveredMessage {
            source,
            authority,
            tag,
            body,
        });
    }

    fn on_churn(&self, diff: CloseGroupDifference) {
        self.churn.lock().push(diff);
    }

    fn on_get(
        &self,
        _source: SourceAddress,
        _authority: Authority,
        _data_tag: u32,
        name: Identity,
    ) -> Option<GetOutcome> {
        self.get_calls.lock().push(name);
        self.data
            .lock()
            .get(&name)
            .cloned()
            .map(GetOutcome::Reply)
    }
}

/// A running node plus its recorder and backing store.
pub struct TestNode {
    /// The node under test.
    pub node: Arc<Node>,
    /// Its application recorder.
    pub app: Arc<RecordingApplication>,
    endpoint: Endpoint,
    _store_dir: TempDir,
}

impl TestNode {
    /// Creates and starts a node on `network`.
    pub fn start(network: &Arc<MemoryNetwork>, config: NodeConfig) -> TestNode {
        let identity = NodeIdentity::generate();
        let transport = Arc::new(network.attach(identity.address()));
        let endpoint = transport.local_endpoint();
        let store_dir = TempDir::new().expect("temp dir for bootstrap store");
        let app = RecordingApplication::new();

        let node = Node::new(
            identity,
            config,
            transport,
            store_dir.path(),
            app.clone(),
        )
        .expect("node construction");
        let _receiver = node.start();

        info!(id = %node.our_id(), %endpoint, "test node started");
        TestNode {
            node,
            app,
            endpoint,
            _store_dir: store_dir,
        }
    }

    /// Returns the endpoint the node accepts sessions on.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Returns this node as a bootstrap contact.
    pub fn contact(&self) -> Contact {
        Contact::new(
            self.node.our_id(),
            EndpointPair::new(self.endpoint, self.endpoint),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_node::NodeConfig;

    #[tokio::test]
    async fn node_starts_on_its_own_endpoint() {
        let network = MemoryNetwork::new();
        let node = TestNode::start(&network, NodeConfig::default());
        assert!(node.endpoint().port() > 0);
        assert_eq!(node.contact().id, node.node.our_id());
    }

    #[tokio::test]
    async fn recorder_serves_configured_data() {
        let app = RecordingApplication::new();
        let name = Identity::random();
        app.serve(name, vec![1, 2, 3]);

        let outcome = app.on_get(
            SourceAddress::direct(weft_core::Address::random()),
            Authority::NaeManager,
            0,
            name,
        );
        assert_eq!(outcome, Some(GetOutcome::Reply(vec![1, 2, 3])));
        assert_eq!(app.get_calls(), 1);
    }
}
