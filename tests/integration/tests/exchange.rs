//! Integration test: peer exchange over `/orcanet/p2p`.

use orcanet_integration_tests::{eventually, wait_for, TestNode};
use orcanet_network::{NetworkError, NetworkEvent, PeerId};

async fn connected(node: &TestNode, peer: PeerId) -> Result<(), NetworkError> {
    if node.handle.active_peers().await?.contains(&peer) {
        Ok(())
    } else {
        Err(NetworkError::NotFound(format!("{} is not connected to {}", node.peer_id, peer)))
    }
}

#[tokio::test]
async fn test_new_peer_learns_about_existing_peers() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    let c = TestNode::spawn().await;

    a.connect_to(&b).await;

    let mut events = c.handle.subscribe();
    c.connect_to(&a).await;

    let event = wait_for(&mut events, |e| {
        matches!(e, NetworkEvent::PeersExchanged(px) if px.from == a.peer_id)
    })
    .await;
    let NetworkEvent::PeersExchanged(px) = event else {
        unreachable!()
    };
    assert_eq!(px.peers, vec![b.peer_id]);

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn test_first_peer_receives_empty_list() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;

    let mut events = b.handle.subscribe();
    b.connect_to(&a).await;

    let event = wait_for(&mut events, |e| matches!(e, NetworkEvent::PeersExchanged(_))).await;
    let NetworkEvent::PeersExchanged(px) = event else {
        unreachable!()
    };
    assert_eq!(px.from, a.peer_id);
    assert!(px.peers.is_empty());
    assert_eq!(b.handle.connected_peers().snapshot(), vec![a.peer_id]);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_disconnected_peer_is_not_announced() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    let c = TestNode::spawn().await;
    let b_id = b.peer_id;

    let mut a_events = a.handle.subscribe();
    a.connect_to(&b).await;
    b.shutdown().await;
    wait_for(&mut a_events, |e| {
        matches!(e, NetworkEvent::PeerDisconnected(d) if d.peer_id == b_id)
    })
    .await;
    assert!(a.handle.connected_peers().contains(&b_id));
    assert!(a.handle.connected_peers().active().is_empty());

    let mut events = c.handle.subscribe();
    c.connect_to(&a).await;

    let event = wait_for(&mut events, |e| {
        matches!(e, NetworkEvent::PeersExchanged(px) if px.from == a.peer_id)
    })
    .await;
    let NetworkEvent::PeersExchanged(px) = event else {
        unreachable!()
    };
    assert!(px.peers.is_empty());

    a.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn test_exchanged_peers_end_up_connected() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    let c = TestNode::spawn().await;

    a.connect_to(&b).await;
    // Without a relay the exchanged peer is dialed by id, so c needs a route.
    c.handle
        .add_address(b.peer_id, b.addr.clone())
        .await
        .expect("add address");
    c.connect_to(&a).await;

    eventually(|| connected(&c, b.peer_id)).await;
    eventually(|| connected(&b, c.peer_id)).await;

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn test_exchanged_peer_is_dialed_through_relay() {
    let relay = TestNode::spawn().await;
    let hub = TestNode::spawn().await;
    let b = TestNode::spawn_relayed(&relay).await;
    let c = TestNode::spawn_relayed(&relay).await;

    hub.connect_to(&relay).await;
    hub.connect_to(&b).await;

    let mut events = c.handle.subscribe();
    c.connect_to(&hub).await;

    // The hub announces the relay too. c drops it because it is c's relay.
    let event = wait_for(&mut events, |e| {
        matches!(e, NetworkEvent::PeersExchanged(px) if px.from == hub.peer_id)
    })
    .await;
    let NetworkEvent::PeersExchanged(px) = event else {
        unreachable!()
    };
    assert_eq!(px.peers, vec![b.peer_id]);

    // c never learned a direct address for b; only the circuit reaches it.
    eventually(|| connected(&c, b.peer_id)).await;

    relay.shutdown().await;
    hub.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}
