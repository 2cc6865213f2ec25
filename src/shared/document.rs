//! Replicated Document Store
//!
//! One `ReplicatedDocument` exists per open document. It wraps a yrs `Doc`
//! whose root XML fragment holds the rich-text tree: element nodes carry the
//! node type as their tag and the node attributes as XML attributes, leaf
//! text runs carry marks as formatting attributes.
//!
//! Merging, snapshotting and JSON conversion are synchronous and never
//! suspend; transactions are opened and committed inside each call.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, OffsetKind, Options, ReadTxn, StateVector, Transact, TransactionMut, Update, XmlFragment,
    XmlFragmentRef,
};

use crate::shared::error::DocumentError;
use crate::shared::schema;

/// Name of the root XML fragment shared with editor clients
pub const ROOT_FRAGMENT: &str = "default";

/// Prefix of page-backed document names
const PAGE_PREFIX: &str = "page.";

/// Stable name multiplexing connections to one page's document
///
/// Clients connect to `page.<uuid>`; the page id is derived from the name
/// without any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentName {
    page_id: Uuid,
}

impl DocumentName {
    /// Build the document name for a page
    pub fn for_page(page_id: Uuid) -> Self {
        Self { page_id }
    }

    /// Parse a `page.<uuid>` document name
    pub fn parse(name: &str) -> Result<Self, DocumentError> {
        let raw_id = name
            .strip_prefix(PAGE_PREFIX)
            .ok_or_else(|| DocumentError::schema("document", format!("unknown document name '{}'", name)))?;
        let page_id = Uuid::parse_str(raw_id)
            .map_err(|e| DocumentError::schema("document", format!("invalid page id '{}': {}", raw_id, e)))?;
        Ok(Self { page_id })
    }

    /// The page this document persists into
    pub fn page_id(&self) -> Uuid {
        self.page_id
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PAGE_PREFIX, self.page_id)
    }
}

impl FromStr for DocumentName {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// In-memory CRDT instance for one document
#[derive(Debug)]
pub struct ReplicatedDocument {
    doc: Doc,
    root: XmlFragmentRef,
}

impl ReplicatedDocument {
    /// Create an empty document
    ///
    /// Offsets are measured in UTF-16 code units so positions agree with
    /// browser editors.
    pub fn new() -> Self {
        let doc = Doc::with_options(Options {
            offset_kind: OffsetKind::Utf16,
            ..Options::default()
        });
        let root = doc.get_or_insert_xml_fragment(ROOT_FRAGMENT);
        Self { doc, root }
    }

    /// Create a document from a full binary snapshot
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self, DocumentError> {
        let document = Self::new();
        document.apply_update(snapshot)?;
        Ok(document)
    }

    /// Create a document equivalent to a rich-text JSON tree
    pub fn from_json(content: &Value) -> Result<Self, DocumentError> {
        let document = Self::new();
        {
            let mut txn = document.doc.transact_mut();
            schema::json_to_fragment(&mut txn, &document.root, content)?;
        }
        Ok(document)
    }

    /// Merge a remote v1 update
    ///
    /// Re-applying an update that is already integrated leaves the document
    /// unchanged.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), DocumentError> {
        let update = Update::decode_v1(update).map_err(|e| DocumentError::decode(e.to_string()))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| DocumentError::apply(e.to_string()))
    }

    /// Encode the entire current state as a v1 update
    pub fn snapshot(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encoded state vector, sent as the first sync step
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Everything a peer with the given encoded state vector is missing
    pub fn diff_since(&self, state_vector: &[u8]) -> Result<Vec<u8>, DocumentError> {
        let remote = StateVector::decode_v1(state_vector).map_err(|e| DocumentError::decode(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_diff_v1(&remote))
    }

    /// Same as [`Self::diff_since`] for an already decoded state vector
    pub fn diff_since_vector(&self, state_vector: &StateVector) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_diff_v1(state_vector)
    }

    /// Current state vector, used to capture a base before local mutation
    pub fn current_state_vector(&self) -> StateVector {
        self.doc.transact().state_vector()
    }

    /// Run `edit` and collect everything it changed as one v1 update
    ///
    /// The update comes from the committed transactions themselves, so
    /// changes that only extend the delete set (clearing a format, removing
    /// text) are captured even though the state vector does not move.
    /// Returns `None` when `edit` changed nothing.
    pub fn record_changes<R, F>(&self, edit: F) -> Result<(R, Option<Vec<u8>>), DocumentError>
    where
        F: FnOnce(&Self) -> Result<R, DocumentError>,
    {
        let captured: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
        let sink = captured.clone();
        let subscription = self
            .doc
            .observe_update_v1(move |_, event| {
                if let Ok(mut updates) = sink.lock() {
                    updates.push(event.update.clone());
                }
            })
            .map_err(|e| DocumentError::apply(e.to_string()))?;

        let result = edit(self);
        drop(subscription);
        let result = result?;

        let updates = captured
            .lock()
            .map(|mut updates| std::mem::take(&mut *updates))
            .map_err(|_| DocumentError::apply("update capture poisoned"))?;

        let update = match updates.len() {
            0 => None,
            1 => updates.into_iter().next(),
            _ => Some(yrs::merge_updates_v1(&updates).map_err(|e| DocumentError::apply(e.to_string()))?),
        };
        Ok((result, update))
    }

    /// True when nothing has ever been integrated into this document
    pub fn is_empty(&self) -> bool {
        let txn = self.doc.transact();
        self.root.len(&txn) == 0 && txn.state_vector().is_empty()
    }

    /// Rich-text JSON form of the root fragment
    pub fn to_json(&self) -> Value {
        let txn = self.doc.transact();
        schema::fragment_to_json(&txn, &self.root)
    }

    /// Plain text of the whole document
    pub fn plain_text(&self) -> Result<String, DocumentError> {
        schema::plain_text(&self.to_json())
    }

    pub(crate) fn root(&self) -> &XmlFragmentRef {
        &self.root
    }

    pub(crate) fn transact_mut(&self) -> TransactionMut<'_> {
        self.doc.transact_mut()
    }

    pub(crate) fn transact(&self) -> yrs::Transaction<'_> {
        self.doc.transact()
    }
}

impl Default for ReplicatedDocument {
    fn default() -> Self {
        Self::new()
    }
}
