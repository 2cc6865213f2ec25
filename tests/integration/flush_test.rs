//! Flush lifecycle integration tests
//!
//! Debounced flushes, the final flush on last close, retries after storage
//! failures, contributors, signals and history revisions. Time is paused
//! so the debounce windows elapse instantly.

use std::time::Duration;

use collabdoc::backend::access::SpaceRole;
use collabdoc::backend::server::CollabConfig;
use collabdoc::backend::signals::Signal;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use crate::assert_ok;
use crate::common::{paragraph_frame, paragraph_texts, paragraphs, test_config, Harness};

#[tokio::test(start_paused = true)]
async fn test_last_close_flushes_and_retires() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (user, session) = harness.connect(&name, SpaceRole::Writer).await;

    assert_ok!(session.handle_message(&paragraph_frame("Hello")).await);
    session.release().await;

    let stored = harness.stored(&name).await;
    assert_eq!(stored.content, Some(paragraphs(&["Hello"])));
    assert!(stored.ydoc.is_some());
    assert!(stored.text_content.unwrap_or_default().contains("Hello"));
    assert_eq!(stored.last_updated_by_id, Some(user));
    assert_eq!(stored.contributor_ids, vec![user]);
    assert_eq!(harness.pages.content_writes(), 1);

    assert!(harness.gateway().open_documents().await.is_empty());
    assert!(!harness.gateway().history().is_armed(name.page_id()).await);
}

#[tokio::test(start_paused = true)]
async fn test_clean_close_writes_nothing() {
    let harness = Harness::new();
    let name = harness.page(Some(paragraphs(&["Untouched"]))).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;

    session.release().await;

    assert_eq!(harness.pages.content_writes(), 0);
    assert!(harness.gateway().open_documents().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_quiet_period_flushes_while_connected() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;

    assert_ok!(session.handle_message(&paragraph_frame("draft")).await);
    sleep(Duration::from_secs(9)).await;
    assert_eq!(harness.pages.content_writes(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.pages.content_writes(), 1);
    assert!(!harness.gateway().is_dirty(&name).await);
    assert_eq!(harness.gateway().peer_count(&name).await, 1);

    // Closing a clean document writes nothing more
    session.release().await;
    assert_eq!(harness.pages.content_writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_editing_flushes_at_ceiling() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;

    for i in 0..9 {
        assert_ok!(session.handle_message(&paragraph_frame(&format!("edit {}", i))).await);
        sleep(Duration::from_secs(5)).await;
    }
    // Last edit at 40s: the quiet period would end at 50s, the ceiling at 45s
    sleep(Duration::from_secs(4)).await;
    assert_eq!(harness.pages.content_writes(), 1);
    assert_eq!(paragraph_texts(&harness.stored(&name).await.content.unwrap()).len(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_failed_final_flush_is_retried() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;
    assert_ok!(session.handle_message(&paragraph_frame("keep me")).await);

    harness.pages.set_failing(true);
    session.release().await;

    assert_eq!(harness.gateway().open_documents().await, vec![name.clone()]);
    assert!(harness.gateway().is_dirty(&name).await);
    assert_eq!(harness.stored(&name).await.content, None);

    harness.pages.set_failing(false);
    sleep(Duration::from_secs(11)).await;

    assert_eq!(harness.stored(&name).await.content, Some(paragraphs(&["keep me"])));
    assert!(harness.gateway().open_documents().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_contributors_of_all_writers_are_recorded() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (alice, alice_session) = harness.connect(&name, SpaceRole::Writer).await;
    let (bob, bob_session) = harness.connect(&name, SpaceRole::Admin).await;
    let (_, reader_session) = harness.connect(&name, SpaceRole::Reader).await;

    assert_ok!(alice_session.handle_message(&paragraph_frame("a")).await);
    assert_ok!(bob_session.handle_message(&paragraph_frame("b")).await);
    assert_ok!(reader_session.handle_message(&paragraph_frame("r")).await);

    let pending = alice_session.pending_contributors().await;
    assert!(pending.contains(&alice) && pending.contains(&bob));
    assert_eq!(pending.len(), 2);

    reader_session.release().await;
    bob_session.release().await;
    alice_session.release().await;

    let mut contributors = harness.stored(&name).await.contributor_ids;
    contributors.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(contributors, expected);
    assert!(harness.gateway().contributors().pending(&name).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_edit_racing_a_flush_keeps_its_contributor() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let (alice, alice_session) = harness.connect(&name, SpaceRole::Writer).await;
    let (bob, bob_session) = harness.connect(&name, SpaceRole::Writer).await;

    assert_ok!(alice_session.handle_message(&paragraph_frame("a")).await);

    let frame = paragraph_frame("b");
    let (merged, flushed) = tokio::join!(
        bob_session.handle_message(&frame),
        harness.gateway().flush(&name)
    );
    assert_ok!(merged);
    assert_ok!(flushed);

    bob_session.release().await;
    alice_session.release().await;

    let stored = harness.stored(&name).await;
    assert_eq!(paragraph_texts(&stored.content.unwrap_or_default()).len(), 2);
    let mut contributors = stored.contributor_ids;
    contributors.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(contributors, expected);
}

#[tokio::test(start_paused = true)]
async fn test_flush_emits_signals() {
    let harness = Harness::new();
    let mut signals = harness.signals.subscribe();
    let name = harness.page(None).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;

    assert_ok!(session.handle_message(&paragraph_frame("signal")).await);
    session.release().await;

    let first = assert_ok!(signals.recv().await);
    assert_eq!(first.kind(), "content_changed");
    assert_eq!(first.page_id(), name.page_id());

    // A fresh page gets the short history delay
    match assert_ok!(signals.recv().await) {
        Signal::HistoryDue { page_id, delay_ms } => {
            assert_eq!(page_id, name.page_id());
            assert_eq!(delay_ms, 60_000);
        }
        other => panic!("Expected HistoryDue, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_active_editing_writes_history_revision() {
    let config = CollabConfig {
        history: collabdoc::backend::history::HistoryPolicy {
            interval: Duration::from_secs(600),
            ..Default::default()
        },
        ..test_config()
    };
    let harness = Harness::with_config(config);
    let name = harness.page(None).await;
    let (_, session) = harness.connect(&name, SpaceRole::Writer).await;

    assert_ok!(session.handle_message(&paragraph_frame("first")).await);
    sleep(Duration::from_secs(300)).await;
    assert_ok!(session.handle_message(&paragraph_frame("second")).await);
    sleep(Duration::from_secs(301)).await;

    let revisions = harness.pages.history(name.page_id()).await;
    assert_eq!(revisions.len(), 1);
    assert_eq!(paragraph_texts(revisions[0].content.as_ref().unwrap()).len(), 2);

    session.release().await;
    assert!(!harness.gateway().history().is_armed(name.page_id()).await);
}
