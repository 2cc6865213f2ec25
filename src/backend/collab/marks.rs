/**
 * Mark Editor Service
 *
 * Server-side mark edits on open or cold documents. Each call opens a
 * direct session on the gateway, so a cold document is hydrated first and
 * the resulting update reaches every connected peer. Releasing the session
 * flushes the document when no other peer holds it; otherwise the edit
 * rides the document's normal debounce.
 */

use serde_json::Value;

use crate::backend::collab::gateway::CollabGateway;
use crate::backend::error::CollabError;
use crate::shared::{marks, AnchorRange, DocumentName};

#[derive(Clone)]
pub struct MarkEditor {
    gateway: CollabGateway,
}

impl MarkEditor {
    pub fn new(gateway: CollabGateway) -> Self {
        Self { gateway }
    }

    /// Apply `mark_name` with `attrs` between two anchors
    ///
    /// # Returns
    ///
    /// The number of text runs touched
    ///
    /// # Errors
    ///
    /// `Document` (409) when an anchor no longer resolves; nothing is
    /// changed in that case.
    pub async fn apply_mark(
        &self,
        document_name: &DocumentName,
        range: &AnchorRange,
        mark_name: &str,
        attrs: &Value,
    ) -> Result<usize, CollabError> {
        let session = self.gateway.open_direct(document_name).await?;
        let result = session
            .transact_local(|document| marks::apply_mark(document, range, mark_name, attrs))
            .await;
        session.release().await;

        if let Ok(touched) = &result {
            tracing::info!("[Marks] Applied '{}' to {} runs of {}", mark_name, touched, document_name);
        }
        result
    }

    /// Clear every `mark_name` span whose `attribute` equals `value`
    pub async fn remove_marks_where(
        &self,
        document_name: &DocumentName,
        mark_name: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<usize, CollabError> {
        let session = self.gateway.open_direct(document_name).await?;
        let result = session
            .transact_local(|document| marks::remove_marks_where(document, mark_name, attribute, value))
            .await;
        session.release().await;

        if let Ok(touched) = &result {
            tracing::info!("[Marks] Removed '{}' from {} runs of {}", mark_name, touched, document_name);
        }
        result
    }

    /// Merge `new_attrs` into every `mark_name` span whose `attribute`
    /// equals `value`
    pub async fn update_marks_where(
        &self,
        document_name: &DocumentName,
        mark_name: &str,
        attribute: &str,
        value: &Value,
        new_attrs: &Value,
    ) -> Result<usize, CollabError> {
        let session = self.gateway.open_direct(document_name).await?;
        let result = session
            .transact_local(|document| {
                marks::update_marks_where(document, mark_name, attribute, value, new_attrs)
            })
            .await;
        session.release().await;

        if let Ok(touched) = &result {
            tracing::info!("[Marks] Updated '{}' on {} runs of {}", mark_name, touched, document_name);
        }
        result
    }
}
