/**
 * Page Store Interface
 *
 * The durable page record is the single source of truth across restarts;
 * live documents are a write-back cache in front of it. This module defines
 * the records the core reads and writes and the `PageStore` trait both
 * backends implement.
 */

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::backend::error::CollabError;

/// Durable page record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageRecord {
    pub id: Uuid,
    /// Space (collection) owning the page; permissions are resolved on it
    pub space_id: Uuid,
    pub workspace_id: Uuid,
    pub title: Option<String>,
    /// Rich-text JSON content
    pub content: Option<Value>,
    /// Plain-text projection of `content`
    pub text_content: Option<String>,
    /// Binary CRDT snapshot
    #[serde(skip)]
    pub ydoc: Option<Vec<u8>>,
    pub creator_id: Option<Uuid>,
    pub last_updated_by_id: Option<Uuid>,
    pub contributor_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PageRecord {
    /// A new, never edited page
    pub fn new(space_id: Uuid, workspace_id: Uuid, creator_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            space_id,
            workspace_id,
            title: None,
            content: None,
            text_content: None,
            ydoc: None,
            creator_id,
            last_updated_by_id: None,
            contributor_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable history revision of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryRevision {
    pub id: Uuid,
    pub page_id: Uuid,
    pub title: Option<String>,
    pub content: Option<Value>,
    pub text_content: Option<String>,
    pub last_updated_by_id: Option<Uuid>,
    pub contributor_ids: Vec<Uuid>,
    pub space_id: Uuid,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl HistoryRevision {
    /// Revision capturing the page as it is now
    pub fn of_page(page: &PageRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_id: page.id,
            title: page.title.clone(),
            content: page.content.clone(),
            text_content: page.text_content.clone(),
            last_updated_by_id: page.last_updated_by_id,
            contributor_ids: page.contributor_ids.clone(),
            space_id: page.space_id,
            workspace_id: page.workspace_id,
            created_at: Utc::now(),
        }
    }
}

/// Content derived from a merged document, ready to be stored
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub content: Value,
    pub text_content: String,
    pub ydoc: Vec<u8>,
    pub last_updated_by: Option<Uuid>,
    /// Contributors drained since the previous flush
    pub contributors: HashSet<Uuid>,
}

/// Result of a compare-and-write
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// Stored content already equals the new content; nothing written
    Unchanged,
    /// Content was written
    Written {
        /// Record as it was before the write
        previous: Box<PageRecord>,
        /// Record as written
        current: Box<PageRecord>,
    },
}

/// Durable page storage
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Look up a page by id
    async fn find_page(&self, page_id: Uuid) -> Result<Option<PageRecord>, CollabError>;

    /// Atomically compare and write page content
    ///
    /// Under a row-level lock: re-read the page, return `Unchanged` when its
    /// content deep-equals `update.content`, otherwise write content, plain
    /// text, snapshot, last editor and the contributor union (see
    /// [`merge_contributors`]).
    ///
    /// # Errors
    ///
    /// `NotFound` when the page does not exist; storage errors otherwise.
    /// Nothing is written on error.
    async fn store_content_if_changed(
        &self,
        page_id: Uuid,
        update: &ContentUpdate,
    ) -> Result<StoreOutcome, CollabError>;

    /// Append a history revision of `page` unless the latest revision
    /// already holds the same content
    ///
    /// Returns the inserted revision, or `None` when skipped.
    async fn insert_history_if_changed(
        &self,
        page: &PageRecord,
    ) -> Result<Option<HistoryRevision>, CollabError>;

    /// Most recent history revision of a page
    async fn last_history(&self, page_id: Uuid) -> Result<Option<HistoryRevision>, CollabError>;
}

/// Contributor ids after a flush: prior contributors, the drained set and
/// the page creator, without duplicates, in a stable order
pub fn merge_contributors(
    prior: &[Uuid],
    drained: &HashSet<Uuid>,
    creator: Option<Uuid>,
) -> Vec<Uuid> {
    let merged: BTreeSet<Uuid> = prior
        .iter()
        .copied()
        .chain(drained.iter().copied())
        .chain(creator)
        .collect();
    merged.into_iter().collect()
}
