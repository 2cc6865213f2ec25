/**
 * Document Registry
 *
 * Keyed table of open documents, owned by the gateway. An entry exists
 * from the first admission of a document until it is retired after its
 * last peer left and its final flush succeeded.
 */

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, OnceCell};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::collab::debounce::DebounceWindow;
use crate::shared::{DocumentName, ReplicatedDocument};

/// Identifier of one peer within the gateway
pub type PeerId = u64;

/// Per-document fan-out capacity
const UPDATE_CAPACITY: usize = 512;

/// Encoded sync message fanned out to the peers of a document
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Peer the message came from; it is not echoed back
    pub origin: Option<PeerId>,
    pub payload: Arc<[u8]>,
}

/// Live state of one open document
pub(crate) struct DocumentEntry {
    pub document: Arc<Mutex<ReplicatedDocument>>,
    /// Set once hydrate succeeded
    pub loaded: Arc<OnceCell<()>>,
    pub peers: usize,
    pub updates: broadcast::Sender<Outbound>,
    pub debounce: DebounceWindow,
    /// Edits merged since the last captured flush
    pub dirty: bool,
    pub last_editor: Option<Uuid>,
    /// Serializes flushes of this document within the process
    pub flush_lock: Arc<Mutex<()>>,
    pub flush_task: Option<JoinHandle<()>>,
}

impl DocumentEntry {
    pub fn new(debounce: DebounceWindow) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            document: Arc::new(Mutex::new(ReplicatedDocument::new())),
            loaded: Arc::new(OnceCell::new()),
            peers: 0,
            updates,
            debounce,
            dirty: false,
            last_editor: None,
            flush_lock: Arc::new(Mutex::new(())),
            flush_task: None,
        }
    }
}

/// Open documents by name
#[derive(Default)]
pub(crate) struct DocumentRegistry {
    entries: HashMap<DocumentName, DocumentEntry>,
}

impl DocumentRegistry {
    pub fn get(&self, name: &DocumentName) -> Option<&DocumentEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &DocumentName) -> Option<&mut DocumentEntry> {
        self.entries.get_mut(name)
    }

    pub fn get_or_insert_with<F>(&mut self, name: &DocumentName, create: F) -> &mut DocumentEntry
    where
        F: FnOnce() -> DocumentEntry,
    {
        self.entries.entry(name.clone()).or_insert_with(create)
    }

    pub fn remove(&mut self, name: &DocumentName) -> Option<DocumentEntry> {
        self.entries.remove(name)
    }

    pub fn names(&self) -> Vec<DocumentName> {
        self.entries.keys().cloned().collect()
    }
}
