/**
 * Access Directory
 *
 * Identity and permission lookups needed by the authentication guard. The
 * permission rules themselves live elsewhere; this module only reads the
 * verdict: the highest role a user holds on a space, either directly or
 * through a group.
 */

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::error::CollabError;

/// Role held on a space, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceRole {
    Reader,
    Writer,
    Admin,
}

impl SpaceRole {
    /// Highest role among several grants
    pub fn highest<I: IntoIterator<Item = SpaceRole>>(roles: I) -> Option<SpaceRole> {
        roles.into_iter().max()
    }

    /// Readers may watch a document but not change it
    pub fn is_read_only(self) -> bool {
        self == SpaceRole::Reader
    }
}

impl FromStr for SpaceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown space role '{}'", other)),
        }
    }
}

/// User as seen by the guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: Option<String>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.deactivated_at.is_none()
    }
}

/// Identity and permission lookups
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Find a user within a workspace
    async fn find_user(&self, user_id: Uuid, workspace_id: Uuid) -> Result<Option<UserRecord>, CollabError>;

    /// Highest role the user holds on the space, if any
    async fn space_role(&self, user_id: Uuid, space_id: Uuid) -> Result<Option<SpaceRole>, CollabError>;
}

/// Access directory backed by the `users`, `space_members` and
/// `group_users` tables
#[derive(Debug, Clone)]
pub struct PgAccessControl {
    pool: PgPool,
}

impl PgAccessControl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessControl for PgAccessControl {
    async fn find_user(&self, user_id: Uuid, workspace_id: Uuid) -> Result<Option<UserRecord>, CollabError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, workspace_id, name, deactivated_at
            FROM users
            WHERE id = $1 AND workspace_id = $2
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn space_role(&self, user_id: Uuid, space_id: Uuid) -> Result<Option<SpaceRole>, CollabError> {
        let roles: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT sm.role
            FROM space_members sm
            WHERE sm.space_id = $2
              AND (
                sm.user_id = $1
                OR sm.group_id IN (SELECT gu.group_id FROM group_users gu WHERE gu.user_id = $1)
              )
            "#,
        )
        .bind(user_id)
        .bind(space_id)
        .fetch_all(&self.pool)
        .await?;

        let parsed = roles.iter().filter_map(|role| match role.parse::<SpaceRole>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!("[Auth] Ignoring membership on space {}: {}", space_id, e);
                None
            }
        });

        Ok(SpaceRole::highest(parsed))
    }
}

/// In-memory access directory for development and tests
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    grants: RwLock<HashMap<(Uuid, Uuid), Vec<SpaceRole>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active user in a workspace
    pub async fn add_user(&self, user_id: Uuid, workspace_id: Uuid, name: &str) {
        self.users.write().await.insert(
            user_id,
            UserRecord {
                id: user_id,
                workspace_id,
                name: Some(name.to_string()),
                deactivated_at: None,
            },
        );
    }

    /// Mark a user as deactivated
    pub async fn deactivate(&self, user_id: Uuid) {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.deactivated_at = Some(Utc::now());
        }
    }

    /// Grant a role on a space; several grants keep the highest
    pub async fn grant(&self, user_id: Uuid, space_id: Uuid, role: SpaceRole) {
        self.grants
            .write()
            .await
            .entry((user_id, space_id))
            .or_default()
            .push(role);
    }
}

#[async_trait]
impl AccessControl for MemoryDirectory {
    async fn find_user(&self, user_id: Uuid, workspace_id: Uuid) -> Result<Option<UserRecord>, CollabError> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .filter(|user| user.workspace_id == workspace_id)
            .cloned())
    }

    async fn space_role(&self, user_id: Uuid, space_id: Uuid) -> Result<Option<SpaceRole>, CollabError> {
        Ok(self
            .grants
            .read()
            .await
            .get(&(user_id, space_id))
            .and_then(|roles| SpaceRole::highest(roles.iter().copied())))
    }
}
