//! Minimal y-sync client
//!
//! Speaks the same binary protocol as an editor, backed by a
//! `ReplicatedDocument`, so tests can drive the gateway frame by frame.

use collabdoc::shared::ReplicatedDocument;
use serde_json::{json, Value};
use yrs::sync::{Message, SyncMessage};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;

/// Editor-side replica
pub struct TestClient {
    pub doc: ReplicatedDocument,
}

impl TestClient {
    pub fn new() -> Self {
        Self {
            doc: ReplicatedDocument::new(),
        }
    }

    /// Client SyncStep1 announcing what this replica already has
    pub fn sync_step1(&self) -> Vec<u8> {
        Message::Sync(SyncMessage::SyncStep1(self.doc.current_state_vector())).encode_v1()
    }

    /// Handle a server frame, returning the replies the client would send
    pub fn receive(&self, frame: &[u8]) -> Vec<Vec<u8>> {
        match Message::decode_v1(frame).expect("server sent an undecodable frame") {
            Message::Sync(SyncMessage::SyncStep1(remote)) => {
                let diff = self.doc.diff_since_vector(&remote);
                vec![Message::Sync(SyncMessage::SyncStep2(diff)).encode_v1()]
            }
            Message::Sync(SyncMessage::SyncStep2(update)) | Message::Sync(SyncMessage::Update(update)) => {
                self.doc.apply_update(&update).expect("server update rejected");
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Run `edit` on the replica and return the resulting Update frame
    pub fn edit<F>(&self, edit: F) -> Vec<u8>
    where
        F: FnOnce(&ReplicatedDocument),
    {
        let before = self.doc.current_state_vector();
        edit(&self.doc);
        update_frame(self.doc.diff_since_vector(&before))
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a raw v1 update in a sync Update frame
pub fn update_frame(update: Vec<u8>) -> Vec<u8> {
    Message::Sync(SyncMessage::Update(update)).encode_v1()
}

/// Update frame inserting one paragraph, as a fresh editor would send it
pub fn paragraph_frame(text: &str) -> Vec<u8> {
    let source = ReplicatedDocument::from_json(&paragraphs(&[text])).expect("valid paragraph");
    update_frame(source.snapshot())
}

/// Document JSON with one paragraph per entry
pub fn paragraphs(texts: &[&str]) -> Value {
    let content: Vec<Value> = texts
        .iter()
        .map(|text| json!({ "type": "paragraph", "content": [ { "type": "text", "text": text } ] }))
        .collect();
    json!({ "type": "doc", "content": content })
}

/// Text of every paragraph, in document order
pub fn paragraph_texts(document: &Value) -> Vec<String> {
    document["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| {
                    block["content"]
                        .as_array()
                        .map(|runs| runs.iter().filter_map(|run| run["text"].as_str()).collect::<String>())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}
