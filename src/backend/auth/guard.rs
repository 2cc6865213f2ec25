/**
 * Authentication Guard
 *
 * Decides whether a connection attempt may open a document, and whether
 * it may write. Runs once per attempt, before the websocket upgrade, so a
 * rejected connection never reaches the document registry.
 *
 * # Algorithm
 *
 * 1. Verify the token (signature, expiry, purpose)
 * 2. Resolve the identity: the user must exist in the token's workspace
 *    and not be deactivated
 * 3. Resolve the page named by the document (fails closed)
 * 4. The page must belong to the token's workspace
 * 5. Highest role on the page's space: none rejects, reader is read-only,
 *    writer and admin are read-write
 */

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::access::AccessControl;
use crate::backend::auth::sessions::TokenVerifier;
use crate::backend::error::CollabError;
use crate::backend::persistence::PageStore;
use crate::shared::DocumentName;

/// Authenticated user on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub name: Option<String>,
}

/// Outcome of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub identity: Identity,
    pub page_id: Uuid,
    pub read_only: bool,
}

/// Connection-time authentication
#[derive(Clone)]
pub struct AuthenticationGuard {
    verifier: TokenVerifier,
    access: Arc<dyn AccessControl>,
    pages: Arc<dyn PageStore>,
}

impl AuthenticationGuard {
    pub fn new(verifier: TokenVerifier, access: Arc<dyn AccessControl>, pages: Arc<dyn PageStore>) -> Self {
        Self {
            verifier,
            access,
            pages,
        }
    }

    /// Authenticate a connection attempt for a document
    ///
    /// # Errors
    ///
    /// - `Unauthorized` - bad token, unknown or deactivated user
    /// - `NotFound` - page missing or in another workspace
    /// - `Forbidden` - no role on the page's space
    pub async fn authenticate(&self, document_name: &DocumentName, token: &str) -> Result<AuthContext, CollabError> {
        let verified = self.verifier.verify(token)?;

        let user = self
            .access
            .find_user(verified.user_id, verified.workspace_id)
            .await?
            .ok_or_else(|| CollabError::unauthorized("User not found"))?;
        if !user.is_active() {
            return Err(CollabError::unauthorized("User has been deactivated"));
        }

        let page_id = document_name.page_id();
        let page = self
            .pages
            .find_page(page_id)
            .await?
            .ok_or_else(|| CollabError::not_found(format!("Page {} not found", page_id)))?;
        if page.workspace_id != verified.workspace_id {
            // Pages of other workspaces answer like missing pages
            return Err(CollabError::not_found(format!("Page {} not found", page_id)));
        }

        let role = self
            .access
            .space_role(user.id, page.space_id)
            .await?
            .ok_or_else(|| {
                CollabError::forbidden(format!("No role on space {} for user {}", page.space_id, user.id))
            })?;

        let read_only = role.is_read_only();
        tracing::info!(
            "[Auth] User {} admitted to {} as {:?}{}",
            user.id,
            document_name,
            role,
            if read_only { " (read-only)" } else { "" }
        );

        Ok(AuthContext {
            identity: Identity {
                user_id: user.id,
                workspace_id: user.workspace_id,
                name: user.name,
            },
            page_id,
            read_only,
        })
    }
}
