//! Contributor Tracker
//!
//! Accumulates who edited each open document between two flushes. The set
//! is drained exactly once per flush and folded into the page's
//! contributor list.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::shared::DocumentName;

/// Per-document contributor sets
#[derive(Debug, Default)]
pub struct ContributorTracker {
    sets: Mutex<HashMap<DocumentName, HashSet<Uuid>>>,
}

impl ContributorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit; edits without a resolvable identity are ignored
    pub async fn record_edit(&self, document: &DocumentName, identity: Option<Uuid>) {
        let Some(identity) = identity else {
            return;
        };
        self.sets
            .lock()
            .await
            .entry(document.clone())
            .or_default()
            .insert(identity);
    }

    /// Take and clear the accumulated set
    pub async fn drain(&self, document: &DocumentName) -> HashSet<Uuid> {
        self.sets.lock().await.remove(document).unwrap_or_default()
    }

    /// Current set without draining it
    pub async fn pending(&self, document: &DocumentName) -> HashSet<Uuid> {
        self.sets.lock().await.get(document).cloned().unwrap_or_default()
    }

    /// Put back contributors drained for a flush that then failed
    pub async fn restore(&self, document: &DocumentName, contributors: HashSet<Uuid>) {
        if contributors.is_empty() {
            return;
        }
        self.sets
            .lock()
            .await
            .entry(document.clone())
            .or_default()
            .extend(contributors);
    }

    /// Drop any residual set when the document is retired
    pub async fn on_unload(&self, document: &DocumentName) {
        self.sets.lock().await.remove(document);
    }
}
