//! Server fixtures
//!
//! A fully wired `AppState` over in-memory stores, with helpers to seed
//! pages and members and to mint collaboration tokens.

use std::sync::Arc;
use std::time::Duration;

use collabdoc::backend::access::{MemoryDirectory, SpaceRole};
use collabdoc::backend::auth::sessions::{CollabClaims, COLLAB_TOKEN_TYPE};
use collabdoc::backend::collab::{CollabGateway, PeerSession};
use collabdoc::backend::persistence::{MemoryPageStore, PageRecord, PageStore};
use collabdoc::backend::server::{build_state, AppState, CollabConfig};
use collabdoc::backend::signals::broadcast::BroadcastSignalSink;
use collabdoc::shared::DocumentName;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use uuid::Uuid;

pub const TEST_SECRET: &str = "collab-test-secret";

/// Configuration used by every fixture
pub fn test_config() -> CollabConfig {
    CollabConfig {
        jwt_secret: TEST_SECRET.to_string(),
        debounce: Duration::from_secs(10),
        max_debounce: Duration::from_secs(45),
        ..CollabConfig::default()
    }
}

/// Mint a collaboration token for a user
pub fn collab_token(user_id: Uuid, workspace_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = CollabClaims {
        sub: user_id.to_string(),
        workspace_id: workspace_id.to_string(),
        token_type: COLLAB_TOKEN_TYPE.to_string(),
        exp: now + 3600,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes()))
        .expect("Failed to encode test token")
}

/// Wired server state plus handles on its stores
pub struct Harness {
    pub state: AppState,
    pub pages: Arc<MemoryPageStore>,
    pub directory: Arc<MemoryDirectory>,
    pub signals: BroadcastSignalSink,
    pub workspace_id: Uuid,
    pub space_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: CollabConfig) -> Self {
        let pages = Arc::new(MemoryPageStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let signals = BroadcastSignalSink::new();
        let state = build_state(
            config,
            pages.clone(),
            directory.clone(),
            Arc::new(signals.clone()),
            Some(signals.clone()),
            None,
        );

        Self {
            state,
            pages,
            directory,
            signals,
            workspace_id: Uuid::new_v4(),
            space_id: Uuid::new_v4(),
        }
    }

    pub fn gateway(&self) -> &CollabGateway {
        &self.state.gateway
    }

    /// Seed a page in the harness space
    pub async fn page(&self, content: Option<Value>) -> DocumentName {
        let mut page = PageRecord::new(self.space_id, self.workspace_id, None);
        page.content = content;
        let name = DocumentName::for_page(page.id);
        self.pages.insert_page(page).await;
        name
    }

    /// Seed a page whose stored snapshot cannot be decoded
    pub async fn corrupt_page(&self) -> DocumentName {
        let mut page = PageRecord::new(self.space_id, self.workspace_id, None);
        page.ydoc = Some(vec![0xff, 0xfe, 0xfd, 0xfc]);
        let name = DocumentName::for_page(page.id);
        self.pages.insert_page(page).await;
        name
    }

    /// Stored record of a page
    pub async fn stored(&self, name: &DocumentName) -> PageRecord {
        self.pages
            .find_page(name.page_id())
            .await
            .expect("memory store never fails reads")
            .expect("page was seeded")
    }

    /// Add a workspace member with a role on the harness space
    pub async fn member(&self, role: Option<SpaceRole>) -> Uuid {
        let user = Uuid::new_v4();
        self.directory.add_user(user, self.workspace_id, "member").await;
        if let Some(role) = role {
            self.directory.grant(user, self.space_id, role).await;
        }
        user
    }

    pub fn token(&self, user_id: Uuid) -> String {
        collab_token(user_id, self.workspace_id)
    }

    /// Authenticate and admit a new member with `role`
    pub async fn connect(&self, name: &DocumentName, role: SpaceRole) -> (Uuid, PeerSession) {
        let user = self.member(Some(role)).await;
        let auth = self
            .state
            .guard
            .authenticate(name, &self.token(user))
            .await
            .expect("member should authenticate");
        let session = self.gateway().admit(name, auth).await.expect("page should hydrate");
        (user, session)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
