//! Mark editor integration tests
//!
//! Server-side mark edits travel through the gateway like any peer edit:
//! connected peers receive them, and the document flushes afterwards.

use std::time::Duration;

use collabdoc::backend::access::SpaceRole;
use collabdoc::backend::error::CollabError;
use collabdoc::backend::persistence::PageRecord;
use collabdoc::shared::{AnchorRange, DocumentName, ReplicatedDocument};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::common::{paragraphs, Harness, TestClient};
use crate::{assert_err, assert_ok};

fn hello_marked(attrs: Value) -> Value {
    json!({
        "type": "doc",
        "content": [ {
            "type": "paragraph",
            "content": [
                { "type": "text", "text": "Hello", "marks": [ { "type": "comment", "attrs": attrs } ] },
                { "type": "text", "text": " world" }
            ]
        } ]
    })
}

/// Seed a page whose snapshot is `document`, so anchors taken on it
/// resolve against the hydrated server copy
async fn page_from_snapshot(harness: &Harness, document: &ReplicatedDocument) -> DocumentName {
    let mut page = PageRecord::new(harness.space_id, harness.workspace_id, None);
    page.content = Some(document.to_json());
    page.ydoc = Some(document.snapshot());
    let name = DocumentName::for_page(page.id);
    harness.pages.insert_page(page).await;
    name
}

#[tokio::test]
async fn test_mark_reaches_connected_peer() {
    let harness = Harness::new();
    let source = assert_ok!(ReplicatedDocument::from_json(&paragraphs(&["Hello world"])));
    let name = page_from_snapshot(&harness, &source).await;
    let (_, mut writer) = harness.connect(&name, SpaceRole::Writer).await;

    let client = TestClient::new();
    for reply in client.receive(&writer.greeting().await) {
        assert_ok!(writer.handle_message(&reply).await);
    }
    for reply in assert_ok!(writer.handle_message(&client.sync_step1()).await) {
        client.receive(&reply);
    }

    let range = assert_ok!(AnchorRange::between(&client.doc, 1, 6));
    let touched = assert_ok!(
        harness
            .state
            .mark_editor
            .apply_mark(&name, &range, "comment", &json!({ "id": "c1" }))
            .await
    );
    assert_eq!(touched, 1);

    let frame = timeout(Duration::from_secs(2), writer.next_outbound())
        .await
        .expect("expected the mark update")
        .expect("update channel closed");
    client.receive(&frame);
    assert_eq!(client.doc.to_json(), hello_marked(json!({ "id": "c1" })));

    // The writer still holds the document, so it stays open and dirty
    assert!(harness.gateway().is_dirty(&name).await);
    writer.release().await;
    assert_eq!(harness.stored(&name).await.content, Some(hello_marked(json!({ "id": "c1" }))));
}

#[tokio::test]
async fn test_mark_removal_reaches_connected_peer() {
    let harness = Harness::new();
    let source = assert_ok!(ReplicatedDocument::from_json(&hello_marked(json!({ "id": "c1" }))));
    let name = page_from_snapshot(&harness, &source).await;
    let (_, mut writer) = harness.connect(&name, SpaceRole::Writer).await;

    let client = TestClient::new();
    for reply in client.receive(&writer.greeting().await) {
        assert_ok!(writer.handle_message(&reply).await);
    }
    for reply in assert_ok!(writer.handle_message(&client.sync_step1()).await) {
        client.receive(&reply);
    }
    assert_eq!(client.doc.to_json(), hello_marked(json!({ "id": "c1" })));

    let removed = assert_ok!(
        harness
            .state
            .mark_editor
            .remove_marks_where(&name, "comment", "id", &json!("c1"))
            .await
    );
    assert_eq!(removed, 1);
    assert!(harness.gateway().is_dirty(&name).await);

    let frame = timeout(Duration::from_secs(2), writer.next_outbound())
        .await
        .expect("expected the removal update")
        .expect("update channel closed");
    client.receive(&frame);
    assert_eq!(client.doc.to_json(), paragraphs(&["Hello world"]));

    writer.release().await;
    assert_eq!(harness.stored(&name).await.content, Some(paragraphs(&["Hello world"])));
}

#[tokio::test]
async fn test_mark_on_cold_document_is_flushed() {
    let harness = Harness::new();
    let source = assert_ok!(ReplicatedDocument::from_json(&paragraphs(&["Hello world"])));
    let name = page_from_snapshot(&harness, &source).await;
    let range = assert_ok!(AnchorRange::between(&source, 1, 6));
    let editor = &harness.state.mark_editor;

    assert_ok!(editor.apply_mark(&name, &range, "comment", &json!({ "id": "c1" })).await);
    assert_eq!(harness.stored(&name).await.content, Some(hello_marked(json!({ "id": "c1" }))));
    assert!(harness.gateway().open_documents().await.is_empty());

    let updated = assert_ok!(
        editor
            .update_marks_where(&name, "comment", "id", &json!("c1"), &json!({ "resolved": true }))
            .await
    );
    assert_eq!(updated, 1);
    assert_eq!(
        harness.stored(&name).await.content,
        Some(hello_marked(json!({ "id": "c1", "resolved": true })))
    );

    let removed = assert_ok!(editor.remove_marks_where(&name, "comment", "id", &json!("c1")).await);
    assert_eq!(removed, 1);
    assert_eq!(harness.stored(&name).await.content, Some(paragraphs(&["Hello world"])));
}

#[tokio::test]
async fn test_stale_anchor_changes_nothing() {
    let harness = Harness::new();
    let source = assert_ok!(ReplicatedDocument::from_json(&paragraphs(&["Hello world"])));
    let name = page_from_snapshot(&harness, &source).await;

    // Anchors taken on an unrelated replica do not resolve on this page
    let unrelated = assert_ok!(ReplicatedDocument::from_json(&paragraphs(&["Hello world"])));
    let range = assert_ok!(AnchorRange::between(&unrelated, 1, 6));

    let result = harness
        .state
        .mark_editor
        .apply_mark(&name, &range, "comment", &json!({ "id": "c1" }))
        .await;
    match result {
        Err(CollabError::Document(e)) => assert!(e.is_stale()),
        other => panic!("Expected a stale anchor error, got {:?}", other),
    }
    assert_eq!(harness.pages.content_writes(), 0);
    assert!(harness.gateway().open_documents().await.is_empty());
}

#[tokio::test]
async fn test_missing_page_is_not_found() {
    let harness = Harness::new();
    let name = DocumentName::for_page(uuid::Uuid::new_v4());
    let result = harness
        .state
        .mark_editor
        .remove_marks_where(&name, "comment", "id", &json!("c1"))
        .await;
    assert_err!(result, CollabError::NotFound { .. });
}
