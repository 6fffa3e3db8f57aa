//! Integration test: records and provider advertisements between server-mode nodes.

use std::sync::Arc;

use orcanet_core::DhtKey;
use orcanet_integration_tests::{eventually, TestNode};
use orcanet_network::{Coordinator, DhtMode, NamespacedValidator, NetworkError};

async fn server_pair() -> (TestNode, TestNode) {
    let a = TestNode::spawn_with(DhtMode::Server, Vec::new()).await;
    let b = TestNode::spawn_with(DhtMode::Server, vec![a.full_addr()]).await;
    b.connect_to(&a).await;
    (a, b)
}

fn coordinator(node: &TestNode) -> Coordinator {
    Coordinator::new(
        Arc::new(node.handle.clone()),
        Arc::new(NamespacedValidator::orcanet()),
    )
}

#[tokio::test]
async fn test_record_round_trip() {
    let (a, b) = server_pair().await;
    let key = DhtKey::wallet(b.peer_id).to_string();

    eventually(|| b.handle.put_record(&key, b"\"wallet-b\"".to_vec())).await;

    let values = eventually(|| a.handle.get_record(&key)).await;
    assert!(values.iter().any(|v| v == b"\"wallet-b\""));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_missing_record_is_not_found() {
    let (a, b) = server_pair().await;
    let result = a
        .handle
        .get_record(&DhtKey::wallet(b.peer_id).to_string())
        .await;
    assert!(matches!(result, Err(NetworkError::NotFound(_))));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_foreign_namespace_is_not_stored() {
    let (a, b) = server_pair().await;
    let key = "/ipns/somebody";

    // The write is attempted but A refuses to keep it.
    let _ = b.handle.put_record(key, b"v".to_vec()).await;
    assert!(a.handle.get_record(key).await.is_err());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_provider_listing_across_nodes() {
    let (a, b) = server_pair().await;
    let hash = b.host_file("song.mp3", b"la la la", 4.0);

    let publisher = coordinator(&b);
    eventually(|| publisher.publish_file(&hash, 4.0)).await;

    let seeker = coordinator(&a);
    let listings = eventually(|| async {
        let listings = seeker.list_file_providers(&hash).await?;
        if listings.is_empty() {
            return Err(NetworkError::NotFound(hash.clone()));
        }
        Ok(listings)
    })
    .await;
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, b.peer_id.to_string());
    assert_eq!(listings[0].cost, "4");

    // B's own view marks itself.
    let own = publisher.list_file_providers(&hash).await.unwrap();
    assert!(own.iter().all(|l| l.id == "Me"));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_unpublished_file_disappears() {
    let (a, b) = server_pair().await;
    let hash = b.host_file("gone.txt", b"bye", 1.0);

    let publisher = coordinator(&b);
    eventually(|| publisher.publish_file(&hash, 1.0)).await;
    eventually(|| publisher.unpublish_file(&hash)).await;

    let seeker = coordinator(&a);
    let listings = eventually(|| async {
        let listings = seeker.list_file_providers(&hash).await?;
        if !listings.is_empty() {
            return Err(NetworkError::InvalidRecord("still listed".into()));
        }
        Ok(listings)
    })
    .await;
    assert!(listings.is_empty());

    a.shutdown().await;
    b.shutdown().await;
}
