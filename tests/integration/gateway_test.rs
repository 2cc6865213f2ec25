//! Connection gateway integration tests
//!
//! Admission, the sync handshake, fan-out between peers and read-only
//! enforcement, driven frame by frame.

use std::time::Duration;

use collabdoc::backend::access::SpaceRole;
use collabdoc::backend::collab::PeerSession;
use collabdoc::backend::error::CollabError;
use pretty_assertions::assert_eq;
use tokio::time::timeout;

use crate::common::{paragraph_frame, paragraphs, Harness, TestClient};
use crate::{assert_err, assert_ok};

const QUIET: Duration = Duration::from_millis(200);

async fn expect_frame(session: &mut PeerSession) -> Vec<u8> {
    timeout(Duration::from_secs(2), session.next_outbound())
        .await
        .expect("expected a frame")
        .expect("update channel closed")
}

async fn expect_silence(session: &mut PeerSession) {
    assert!(
        timeout(QUIET, session.next_outbound()).await.is_err(),
        "peer {} received an unexpected frame",
        session.peer_id()
    );
}

/// Complete both halves of the handshake between a client and its session
async fn handshake(client: &TestClient, session: &PeerSession) {
    for reply in client.receive(&session.greeting().await) {
        assert_ok!(session.handle_message(&reply).await);
    }
    for reply in assert_ok!(session.handle_message(&client.sync_step1()).await) {
        client.receive(&reply);
    }
}

#[tokio::test]
async fn test_handshake_delivers_stored_content() {
    let harness = Harness::new();
    let name = harness.page(Some(paragraphs(&["Stored text"]))).await;
    let (_, session) = harness.connect(&name, SpaceRole::Reader).await;

    let client = TestClient::new();
    handshake(&client, &session).await;

    assert_eq!(client.doc.to_json(), paragraphs(&["Stored text"]));
    assert!(!harness.gateway().is_dirty(&name).await);
}

#[tokio::test]
async fn test_two_writers_converge() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, mut alice) = harness.connect(&name, SpaceRole::Writer).await;
    let (_, mut bob) = harness.connect(&name, SpaceRole::Writer).await;
    assert_eq!(harness.gateway().peer_count(&name).await, 2);

    let alice_client = TestClient::new();
    let bob_client = TestClient::new();
    handshake(&alice_client, &alice).await;
    handshake(&bob_client, &bob).await;

    let frame = paragraph_frame("Hello");
    alice_client.receive(&frame);
    assert_ok!(alice.handle_message(&frame).await);

    bob_client.receive(&expect_frame(&mut bob).await);
    assert_eq!(bob_client.doc.to_json(), alice_client.doc.to_json());
    assert!(harness.gateway().is_dirty(&name).await);

    // The sender is not echoed its own update
    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn test_concurrent_edits_merge_on_every_replica() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, mut alice) = harness.connect(&name, SpaceRole::Writer).await;
    let (_, mut bob) = harness.connect(&name, SpaceRole::Admin).await;

    let alice_client = TestClient::new();
    let bob_client = TestClient::new();

    let from_alice = paragraph_frame("from alice");
    let from_bob = paragraph_frame("from bob");
    alice_client.receive(&from_alice);
    bob_client.receive(&from_bob);
    assert_ok!(alice.handle_message(&from_alice).await);
    assert_ok!(bob.handle_message(&from_bob).await);

    alice_client.receive(&expect_frame(&mut alice).await);
    bob_client.receive(&expect_frame(&mut bob).await);

    let merged = alice_client.doc.to_json();
    assert_eq!(bob_client.doc.to_json(), merged);
    assert_eq!(merged["content"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_read_only_updates_are_dropped() {
    let harness = Harness::new();
    let name = harness.page(Some(paragraphs(&["Original"]))).await;
    let (_, reader) = harness.connect(&name, SpaceRole::Reader).await;
    let (_, mut writer) = harness.connect(&name, SpaceRole::Writer).await;
    assert!(reader.is_read_only());

    let replies = assert_ok!(reader.handle_message(&paragraph_frame("sneaky")).await);
    assert!(replies.is_empty());
    assert!(!harness.gateway().is_dirty(&name).await);
    expect_silence(&mut writer).await;

    // The reader still completes a handshake
    let client = TestClient::new();
    handshake(&client, &reader).await;
    assert_eq!(client.doc.to_json(), paragraphs(&["Original"]));
}

#[tokio::test]
async fn test_awareness_is_relayed_to_other_peers() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, reader) = harness.connect(&name, SpaceRole::Reader).await;
    let (_, mut writer) = harness.connect(&name, SpaceRole::Writer).await;

    // One entry: client 7, clock 1, JSON state
    let state = br#"{"user":{"name":"reader"}}"#;
    let mut payload = vec![1, 7, 1, state.len() as u8];
    payload.extend_from_slice(state);
    let mut frame = vec![1, payload.len() as u8];
    frame.extend_from_slice(&payload);

    assert_ok!(reader.handle_message(&frame).await);
    assert_eq!(expect_frame(&mut writer).await, frame);
    assert!(!harness.gateway().is_dirty(&name).await);
}

#[tokio::test]
async fn test_undecodable_frame_is_a_protocol_error() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;

    assert_err!(session.handle_message(&[0xff, 0xff]).await, CollabError::Protocol { .. });
}

#[tokio::test]
async fn test_hydrate_failure_refuses_and_keeps_nothing() {
    let harness = Harness::new();
    let name = harness.corrupt_page().await;
    let user = harness.member(Some(SpaceRole::Writer)).await;
    let auth = assert_ok!(harness.state.guard.authenticate(&name, &harness.token(user)).await);

    assert_err!(harness.gateway().admit(&name, auth).await, CollabError::Document(_));
    assert!(harness.gateway().open_documents().await.is_empty());
    assert_eq!(harness.gateway().peer_count(&name).await, 0);
}

#[tokio::test]
async fn test_concurrent_admissions_share_one_document() {
    let harness = Harness::new();
    let name = harness.page(Some(paragraphs(&["Shared"]))).await;

    let ((_, first), (_, second)) = tokio::join!(
        harness.connect(&name, SpaceRole::Writer),
        harness.connect(&name, SpaceRole::Writer)
    );
    assert_eq!(harness.gateway().peer_count(&name).await, 2);
    assert_eq!(harness.gateway().open_documents().await, vec![name.clone()]);

    let a = TestClient::new();
    let b = TestClient::new();
    handshake(&a, &first).await;
    handshake(&b, &second).await;
    assert_eq!(a.doc.to_json(), paragraphs(&["Shared"]));
    assert_eq!(b.doc.to_json(), paragraphs(&["Shared"]));
}
