//! Integration test: direct transfer between two nodes over `/senddata/p2p`.

use orcanet_core::{FileRecord, MetadataStore};
use orcanet_integration_tests::{wait_for, TestNode};
use orcanet_network::{NetworkError, NetworkEvent};

#[tokio::test]
async fn test_exists_name_and_fetch() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    let content = b"The quick brown fox jumps over the lazy dog.\n".repeat(1000);
    let hash = a.host_file("fox.txt", &content, 2.5);

    assert!(!b.handle.check_exists(a.peer_id, "0000").await.unwrap());
    assert!(b.handle.check_exists(a.peer_id, &hash).await.unwrap());

    let name = b.handle.fetch_name(a.peer_id, &hash).await.unwrap();
    assert_eq!(name.as_deref(), Some("fox.txt"));

    let data = b.handle.fetch_file(a.peer_id, &hash).await.unwrap();
    assert_eq!(data.as_ref(), content.as_slice());
    assert_eq!(orcanet_crypto::sha256_hex(&data), hash);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_unknown_hash_is_not_found() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    let name = b.handle.fetch_name(a.peer_id, "feedface").await.unwrap();
    assert_eq!(name, None);
    let result = b.handle.fetch_file(a.peer_id, "feedface").await;
    assert!(matches!(result, Err(NetworkError::NotFound(_))));
    assert!(b.handle.transfer().pending().is_empty());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_record_without_file_is_not_served() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    a.store
        .store_file_record(FileRecord::new("abcd", "vanished.bin", 3.0))
        .unwrap();
    let hash = a.host_file("deleted.bin", b"soon gone", 1.0);
    std::fs::remove_file(a.files_dir.join("deleted.bin")).unwrap();

    for missing in ["abcd", hash.as_str()] {
        assert!(!b.handle.check_exists(a.peer_id, missing).await.unwrap());
        let result = b.handle.fetch_file(a.peer_id, missing).await;
        assert!(matches!(result, Err(NetworkError::NotFound(_))), "{:?}", result);
    }

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_empty_file_is_served() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    let hash = a.host_file("empty.txt", b"", 0.0);
    assert!(b.handle.check_exists(a.peer_id, &hash).await.unwrap());
    let data = b.handle.fetch_file(a.peer_id, &hash).await.unwrap();
    assert!(data.is_empty());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_correlated() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    let one = a.host_file("one.bin", &[1u8; 4096], 1.0);
    let two = a.host_file("two.bin", &[2u8; 8192], 1.0);

    let (r1, r2, n1) = tokio::join!(
        b.handle.fetch_file(a.peer_id, &one),
        b.handle.fetch_file(a.peer_id, &two),
        b.handle.fetch_name(a.peer_id, &one),
    );
    assert_eq!(r1.unwrap().as_ref(), &[1u8; 4096][..]);
    assert_eq!(r2.unwrap().as_ref(), &[2u8; 8192][..]);
    assert_eq!(n1.unwrap().as_deref(), Some("one.bin"));
    assert!(b.handle.transfer().pending().is_empty());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_send_data_raises_event() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    let mut events = a.handle.subscribe();
    b.handle
        .send_data_to_peer(a.peer_id, b"hello orca".to_vec())
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| matches!(e, NetworkEvent::DataReceived(_))).await;
    let NetworkEvent::DataReceived(received) = event else {
        unreachable!()
    };
    assert_eq!(received.peer_id, b.peer_id);
    assert_eq!(received.data, b"hello orca");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_send_file_arrives_as_data() {
    let a = TestNode::spawn().await;
    let b = TestNode::spawn().await;
    b.connect_to(&a).await;

    let path = b.files_dir.join("note.txt");
    std::fs::write(&path, b"file body").unwrap();

    let mut events = a.handle.subscribe();
    b.handle.send_file(a.peer_id, &path).await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, NetworkEvent::DataReceived(_))).await;
    let NetworkEvent::DataReceived(received) = event else {
        unreachable!()
    };
    assert_eq!(received.data, b"file body");

    a.shutdown().await;
    b.shutdown().await;
}
