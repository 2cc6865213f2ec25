/**
 * PostgreSQL Page Store
 *
 * Page and history persistence on the `pages` and `page_history` tables.
 * Content writes run inside a transaction holding `SELECT ... FOR UPDATE`
 * on the page row, so concurrent flushes of the same page from any number
 * of server processes serialize their read-compare-write.
 */

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::error::CollabError;
use crate::backend::persistence::store::{
    merge_contributors, ContentUpdate, HistoryRevision, PageRecord, PageStore, StoreOutcome,
};

const PAGE_COLUMNS: &str = "id, space_id, workspace_id, title, content, text_content, ydoc, \
     creator_id, last_updated_by_id, contributor_ids, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, page_id, title, content, text_content, last_updated_by_id, \
     contributor_ids, space_id, workspace_id, created_at";

/// Page store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgPageStore {
    pool: PgPool,
}

impl PgPageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PageStore for PgPageStore {
    async fn find_page(&self, page_id: Uuid) -> Result<Option<PageRecord>, CollabError> {
        let page = sqlx::query_as::<_, PageRecord>(&format!(
            "SELECT {} FROM pages WHERE id = $1",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(page)
    }

    async fn store_content_if_changed(
        &self,
        page_id: Uuid,
        update: &ContentUpdate,
    ) -> Result<StoreOutcome, CollabError> {
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query_as::<_, PageRecord>(&format!(
            "SELECT {} FROM pages WHERE id = $1 FOR UPDATE",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CollabError::not_found(format!("page {} not found", page_id)))?;

        if previous.content.as_ref() == Some(&update.content) {
            // Dropping the transaction rolls back and releases the row lock
            return Ok(StoreOutcome::Unchanged);
        }

        let contributor_ids =
            merge_contributors(&previous.contributor_ids, &update.contributors, previous.creator_id);

        let current = sqlx::query_as::<_, PageRecord>(&format!(
            r#"
            UPDATE pages
            SET content = $2,
                text_content = $3,
                ydoc = $4,
                last_updated_by_id = $5,
                contributor_ids = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .bind(&update.content)
        .bind(&update.text_content)
        .bind(&update.ydoc)
        .bind(update.last_updated_by)
        .bind(&contributor_ids)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StoreOutcome::Written {
            previous: Box::new(previous),
            current: Box::new(current),
        })
    }

    async fn insert_history_if_changed(
        &self,
        page: &PageRecord,
    ) -> Result<Option<HistoryRevision>, CollabError> {
        let mut tx = self.pool.begin().await?;

        // Serialize against other snapshotters of the same page
        sqlx::query("SELECT id FROM pages WHERE id = $1 FOR UPDATE")
            .bind(page.id)
            .fetch_optional(&mut *tx)
            .await?;

        let last_content: Option<Option<serde_json::Value>> = sqlx::query_scalar(
            "SELECT content FROM page_history WHERE page_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(page.id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(last_content) = last_content {
            if last_content == page.content {
                return Ok(None);
            }
        }

        let revision = HistoryRevision::of_page(page);
        let inserted = sqlx::query_as::<_, HistoryRevision>(&format!(
            r#"
            INSERT INTO page_history ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            HISTORY_COLUMNS, HISTORY_COLUMNS
        ))
        .bind(revision.id)
        .bind(revision.page_id)
        .bind(&revision.title)
        .bind(&revision.content)
        .bind(&revision.text_content)
        .bind(revision.last_updated_by_id)
        .bind(&revision.contributor_ids)
        .bind(revision.space_id)
        .bind(revision.workspace_id)
        .bind(revision.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(inserted))
    }

    async fn last_history(&self, page_id: Uuid) -> Result<Option<HistoryRevision>, CollabError> {
        let revision = sqlx::query_as::<_, HistoryRevision>(&format!(
            "SELECT {} FROM page_history WHERE page_id = $1 ORDER BY created_at DESC LIMIT 1",
            HISTORY_COLUMNS
        ))
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(revision)
    }
}
