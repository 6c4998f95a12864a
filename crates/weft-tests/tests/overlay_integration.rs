//! End-to-end overlay scenarios: bootstrap, close-group formation,
//! and the application data path.

use std::time::Duration;

use weft_core::Identity;
use weft_proto::SourceAddress;
use weft_tests::{TestNetwork, TestNode};

/// Initialize tracing for tests.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("weft_tests=debug,weft_node=debug,weft_net=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn bootstrap_from_one_seed_sets_relayed_source() {
    init_tracing();

    let net = TestNetwork::new();
    let seed_id = net.seed().node.our_id();

    let joiner = TestNode::start(&net.network, TestNetwork::small_config());
    joiner
        .node
        .add_bootstrap_contact(net.seed().contact())
        .unwrap();
    joiner.node.bootstrap().await.unwrap();

    // We speak through the seed until we stand on our own.
    assert_eq!(joiner.node.bootstrap_node(), Some(seed_id));
    assert_eq!(
        joiner.node.source_address(),
        SourceAddress::relayed(seed_id, joiner.node.our_id())
    );
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    init_tracing();

    let net = TestNetwork::new();
    let joiner = TestNode::start(&net.network, TestNetwork::small_config());
    joiner
        .node
        .add_bootstrap_contact(net.seed().contact())
        .unwrap();

    joiner.node.bootstrap().await.unwrap();
    let first = joiner.node.bootstrap_node();
    joiner.node.bootstrap().await.unwrap();
    assert_eq!(joiner.node.bootstrap_node(), first);
}

#[tokio::test]
async fn first_join_forms_a_two_node_overlay() {
    init_tracing();

    let mut net = TestNetwork::new();
    net.join_node().await;

    assert!(
        net.wait_for_convergence(1, Duration::from_secs(5)).await,
        "both nodes should learn each other"
    );

    let joiner = &net.nodes[1];
    // One accepted join answer is quorum here; the relay is gone.
    assert_eq!(joiner.node.bootstrap_node(), None);
    assert_eq!(
        joiner.node.source_address(),
        SourceAddress::direct(joiner.node.our_id())
    );
    assert!(!joiner.app.churn().is_empty(), "join should report churn");
}

#[tokio::test]
async fn close_group_forms_across_the_network() {
    init_tracing();

    let net = TestNetwork::with_nodes(6).await;
    assert!(
        net.wait_for_convergence(3, Duration::from_secs(10)).await,
        "every node should know most of the overlay"
    );

    for node in &net.nodes {
        assert_eq!(node.node.bootstrap_node(), None);
        assert!(node.node.status() > 0);
    }
}

#[tokio::test]
async fn late_joiner_fills_its_close_group() {
    init_tracing();

    let mut net = TestNetwork::with_nodes(5).await;
    net.wait_for_convergence(2, Duration::from_secs(10)).await;

    net.join_node().await;
    let ok = net
        .wait_until(Duration::from_secs(10), |net| {
            let joiner = net.nodes.last().unwrap();
            joiner.node.table_size() >= 4 && joiner.node.bootstrap_node().is_none()
        })
        .await;
    assert!(ok, "joiner should connect to the whole close group");
}

#[tokio::test]
async fn get_is_answered_and_cached() {
    init_tracing();

    let net = TestNetwork::with_nodes(4).await;
    net.wait_for_convergence(2, Duration::from_secs(10)).await;

    let name = Identity::random();
    let payload = b"stored value".to_vec();
    for node in &net.nodes {
        node.app.serve(name, payload.clone());
    }

    let requester = &net.nodes[1];
    requester.node.get(0, name).await.unwrap();

    let ok = net
        .wait_until(Duration::from_secs(10), |net| {
            net.nodes[1].node.cache_lookup(&name) == Some(payload.clone())
        })
        .await;
    assert!(ok, "the fetched payload should land in the content cache");
}

#[tokio::test]
async fn put_reaches_the_target_managers() {
    init_tracing();

    let net = TestNetwork::with_nodes(3).await;
    net.wait_for_convergence(1, Duration::from_secs(10)).await;

    let requester = &net.nodes[0];
    let to = weft_core::Address::random();
    requester.node.put(to, 1, b"payload".to_vec()).await.unwrap();

    let ok = net
        .wait_until(Duration::from_secs(10), |net| {
            net.nodes
                .iter()
                .skip(1)
                .any(|n| n.app.count(weft_proto::MessageTypeTag::PutData) > 0)
        })
        .await;
    assert!(ok, "some manager should see the store request");
}

#[tokio::test]
async fn own_identity_is_fetchable_at_start() {
    init_tracing();

    let net = TestNetwork::new();
    let seed = net.seed();
    let own = seed.node.cache_lookup(&Identity::from(seed.node.our_id()));
    assert!(own.is_some(), "a node seeds its identity into the cache");
}
