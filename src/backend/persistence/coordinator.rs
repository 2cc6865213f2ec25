/**
 * Persistence Coordinator
 *
 * Moves state between live documents and the durable page record.
 *
 * # Hydrate
 *
 * Three-tier fallback on cold load, first success wins:
 * 1. live document already has state: nothing to do
 * 2. stored binary snapshot
 * 3. stored rich-text JSON
 * 4. empty document
 *
 * The snapshot wins over JSON because it carries the CRDT history that
 * later merges rely on.
 *
 * # Flush
 *
 * Derive JSON, snapshot and plain text from the merged document, then
 * compare-and-write under the page row lock. Signals are emitted only
 * after a write actually happened.
 */

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::error::CollabError;
use crate::backend::history::HistoryPolicy;
use crate::backend::persistence::store::{ContentUpdate, PageRecord, PageStore, StoreOutcome};
use crate::backend::signals::{Signal, SignalSink};
use crate::shared::schema::{self, Mention, MentionKind};
use crate::shared::{DocumentName, ReplicatedDocument};

/// Content derived from a live document at flush time
#[derive(Debug, Clone)]
pub struct PageState {
    pub content: Value,
    pub ydoc: Vec<u8>,
}

impl PageState {
    /// Capture JSON and snapshot from the merged document
    pub fn capture(document: &ReplicatedDocument) -> Self {
        Self {
            content: document.to_json(),
            ydoc: document.snapshot(),
        }
    }
}

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Stored content already matched; nothing written, nothing emitted
    Unchanged,
    /// Content written and signals emitted
    Written,
}

/// Hydrates cold documents and flushes merged ones
pub struct PersistenceCoordinator {
    pages: Arc<dyn PageStore>,
    signals: Arc<dyn SignalSink>,
    history: HistoryPolicy,
}

impl PersistenceCoordinator {
    pub fn new(pages: Arc<dyn PageStore>, signals: Arc<dyn SignalSink>, history: HistoryPolicy) -> Self {
        Self {
            pages,
            signals,
            history,
        }
    }

    /// The page store behind this coordinator
    pub fn pages(&self) -> &Arc<dyn PageStore> {
        &self.pages
    }

    /// Build the initial state of a cold document
    ///
    /// # Returns
    ///
    /// - `None` when `live` already holds state (a peer raced ahead)
    /// - the document built from the snapshot, the JSON content, or empty
    ///
    /// # Errors
    ///
    /// Missing page, unreachable store, corrupt snapshot or malformed JSON.
    /// The caller must refuse the connection and keep nothing.
    pub async fn hydrate(
        &self,
        document_name: &DocumentName,
        live: &ReplicatedDocument,
    ) -> Result<Option<ReplicatedDocument>, CollabError> {
        if !live.is_empty() {
            tracing::debug!("[Persistence] {} already populated, skipping hydrate", document_name);
            return Ok(None);
        }

        let page_id = document_name.page_id();
        let page = self
            .pages
            .find_page(page_id)
            .await?
            .ok_or_else(|| CollabError::not_found(format!("page {} not found", page_id)))?;

        if let Some(snapshot) = page.ydoc.as_deref().filter(|bytes| !bytes.is_empty()) {
            let document = ReplicatedDocument::from_snapshot(snapshot).map_err(|e| {
                tracing::error!("[Persistence] Corrupt snapshot for {}: {}", document_name, e);
                e
            })?;
            tracing::info!("[Persistence] Hydrated {} from snapshot", document_name);
            return Ok(Some(document));
        }

        if let Some(content) = page.content.as_ref().filter(|content| !content.is_null()) {
            let document = ReplicatedDocument::from_json(content).map_err(|e| {
                tracing::error!("[Persistence] Unconvertible content for {}: {}", document_name, e);
                e
            })?;
            tracing::info!("[Persistence] Hydrated {} from JSON content", document_name);
            return Ok(Some(document));
        }

        tracing::info!("[Persistence] {} has no stored content, starting empty", document_name);
        Ok(Some(ReplicatedDocument::new()))
    }

    /// Store a merged document
    ///
    /// # Arguments
    ///
    /// * `document_name` - document being flushed
    /// * `state` - JSON and snapshot captured from the merged document
    /// * `editor` - identity of the last edit, if known
    /// * `contributors` - the just-drained contributor set
    ///
    /// # Errors
    ///
    /// Storage errors are logged and returned; no signal is emitted and
    /// nothing is partially written.
    pub async fn flush(
        &self,
        document_name: &DocumentName,
        state: PageState,
        editor: Option<Uuid>,
        contributors: HashSet<Uuid>,
    ) -> Result<FlushOutcome, CollabError> {
        let text_content = match schema::plain_text(&state.content) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    "[Persistence] Plain text projection failed for {}, storing empty text: {}",
                    document_name,
                    e
                );
                String::new()
            }
        };

        let update = ContentUpdate {
            content: state.content,
            text_content,
            ydoc: state.ydoc,
            last_updated_by: editor,
            contributors,
        };

        let outcome = self
            .pages
            .store_content_if_changed(document_name.page_id(), &update)
            .await
            .map_err(|e| {
                tracing::error!("[Persistence] Failed to store {}: {}", document_name, e);
                e
            })?;

        match outcome {
            StoreOutcome::Unchanged => {
                tracing::debug!("[Persistence] {} unchanged, nothing written", document_name);
                Ok(FlushOutcome::Unchanged)
            }
            StoreOutcome::Written { previous, current } => {
                tracing::info!("[Persistence] Stored {}", document_name);
                self.emit_signals(&previous, &current, editor).await;
                Ok(FlushOutcome::Written)
            }
        }
    }

    /// Capture and flush in one call
    pub async fn flush_document(
        &self,
        document_name: &DocumentName,
        document: &ReplicatedDocument,
        editor: Option<Uuid>,
        contributors: HashSet<Uuid>,
    ) -> Result<FlushOutcome, CollabError> {
        let state = PageState::capture(document);
        self.flush(document_name, state, editor, contributors).await
    }

    async fn emit_signals(&self, previous: &PageRecord, current: &PageRecord, editor: Option<Uuid>) {
        self.signals
            .emit(Signal::ContentChanged {
                page_id: current.id,
                workspace_id: current.workspace_id,
            })
            .await;

        let delta = MentionDelta::between(previous.content.as_ref(), current.content.as_ref());
        if !delta.is_empty() {
            self.signals
                .emit(Signal::MentionsChanged {
                    page_id: current.id,
                    space_id: current.space_id,
                    workspace_id: current.workspace_id,
                    actor_id: editor,
                    added_users: delta.added_users,
                    removed_users: delta.removed_users,
                    added_pages: delta.added_pages,
                })
                .await;
        }

        let age = (Utc::now() - current.created_at).to_std().unwrap_or_default();
        let delay = self.history.delay_for_age(age);
        self.signals
            .emit(Signal::HistoryDue {
                page_id: current.id,
                delay_ms: delay.as_millis() as u64,
            })
            .await;
    }
}

/// Mention differences between two versions of a page
#[derive(Debug, Default, PartialEq)]
struct MentionDelta {
    added_users: Vec<Mention>,
    removed_users: Vec<Mention>,
    added_pages: Vec<Mention>,
}

impl MentionDelta {
    fn between(old: Option<&Value>, new: Option<&Value>) -> Self {
        let old = old.map(schema::extract_mentions).unwrap_or_default();
        let new = new.map(schema::extract_mentions).unwrap_or_default();

        let entities = |mentions: &[Mention], kind: MentionKind| -> HashSet<Uuid> {
            mentions
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.entity_id)
                .collect()
        };
        let old_users = entities(&old, MentionKind::User);
        let new_users = entities(&new, MentionKind::User);
        let old_pages = entities(&old, MentionKind::Page);

        Self {
            added_users: unique_by_entity(&new, MentionKind::User, &old_users),
            removed_users: unique_by_entity(&old, MentionKind::User, &new_users),
            added_pages: unique_by_entity(&new, MentionKind::Page, &old_pages),
        }
    }

    fn is_empty(&self) -> bool {
        self.added_users.is_empty() && self.removed_users.is_empty() && self.added_pages.is_empty()
    }
}

/// Mentions of `kind` whose entity is not in `exclude`, one per entity
fn unique_by_entity(mentions: &[Mention], kind: MentionKind, exclude: &HashSet<Uuid>) -> Vec<Mention> {
    let mut seen = HashSet::new();
    mentions
        .iter()
        .filter(|m| m.kind == kind && !exclude.contains(&m.entity_id))
        .filter(|m| seen.insert(m.entity_id))
        .cloned()
        .collect()
}
