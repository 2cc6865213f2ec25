//! In-memory page store
//!
//! Used when no `DATABASE_URL` is configured and throughout the tests. A
//! single write lock around each compare-and-write plays the part of the
//! database row lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::error::CollabError;
use crate::backend::persistence::store::{
    merge_contributors, ContentUpdate, HistoryRevision, PageRecord, PageStore, StoreOutcome,
};

/// Page store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    pages: RwLock<HashMap<Uuid, PageRecord>>,
    history: RwLock<HashMap<Uuid, Vec<HistoryRevision>>>,
    content_writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a page record
    pub async fn insert_page(&self, page: PageRecord) {
        self.pages.write().await.insert(page.id, page);
    }

    /// All history revisions of a page, oldest first
    pub async fn history(&self, page_id: Uuid) -> Vec<HistoryRevision> {
        self.history
            .read()
            .await
            .get(&page_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of content writes performed so far
    pub fn content_writes(&self) -> usize {
        self.content_writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail, simulating an unreachable database
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CollabError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollabError::storage("page store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PageStore for MemoryPageStore {
    async fn find_page(&self, page_id: Uuid) -> Result<Option<PageRecord>, CollabError> {
        Ok(self.pages.read().await.get(&page_id).cloned())
    }

    async fn store_content_if_changed(
        &self,
        page_id: Uuid,
        update: &ContentUpdate,
    ) -> Result<StoreOutcome, CollabError> {
        self.check_available()?;

        let mut pages = self.pages.write().await;
        let page = pages
            .get_mut(&page_id)
            .ok_or_else(|| CollabError::not_found(format!("page {} not found", page_id)))?;

        if page.content.as_ref() == Some(&update.content) {
            return Ok(StoreOutcome::Unchanged);
        }

        let previous = page.clone();
        page.content = Some(update.content.clone());
        page.text_content = Some(update.text_content.clone());
        page.ydoc = Some(update.ydoc.clone());
        page.last_updated_by_id = update.last_updated_by;
        page.contributor_ids =
            merge_contributors(&previous.contributor_ids, &update.contributors, previous.creator_id);
        page.updated_at = Utc::now();
        self.content_writes.fetch_add(1, Ordering::SeqCst);

        Ok(StoreOutcome::Written {
            previous: Box::new(previous),
            current: Box::new(page.clone()),
        })
    }

    async fn insert_history_if_changed(
        &self,
        page: &PageRecord,
    ) -> Result<Option<HistoryRevision>, CollabError> {
        self.check_available()?;

        let mut history = self.history.write().await;
        let revisions = history.entry(page.id).or_default();
        if let Some(last) = revisions.last() {
            if last.content == page.content {
                return Ok(None);
            }
        }

        let revision = HistoryRevision::of_page(page);
        revisions.push(revision.clone());
        Ok(Some(revision))
    }

    async fn last_history(&self, page_id: Uuid) -> Result<Option<HistoryRevision>, CollabError> {
        Ok(self
            .history
            .read()
            .await
            .get(&page_id)
            .and_then(|revisions| revisions.last().cloned()))
    }
}
