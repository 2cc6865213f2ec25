//! Backend Module
//!
//! Server-side code: the collaboration server around the shared document
//! core. Only compiled with the `ssr` feature.
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs          - Module exports and documentation
//! ├── server/         - Configuration, state, startup wiring
//! ├── routes/         - Router assembly
//! ├── collab/         - Gateway, document registry, debounce, mark editor
//! ├── auth/           - Token verification and the authentication guard
//! ├── access.rs       - Users and space roles
//! ├── persistence/    - Page stores, hydrate and flush
//! ├── contributors.rs - Per-flush contributor sets
//! ├── history.rs      - Periodic history revisions
//! ├── signals/        - Side-effect signals after a flush
//! └── error/          - Error types and HTTP rendering
//! ```
//!
//! # Request Flow
//!
//! 1. `GET {COLLAB_PATH}/page.<uuid>` reaches `collab::handlers`
//! 2. `auth::AuthenticationGuard` verifies the token and resolves the role
//! 3. `collab::CollabGateway` admits the peer, hydrating the document once
//! 4. Frames flow through the peer session until the socket closes
//! 5. Debounced and final flushes go through `persistence`, which emits
//!    `signals`
//!
//! # Error Handling
//!
//! Every fallible operation returns `CollabError`, which renders as
//! `{"error": ..., "status": ...}` with the matching HTTP status.

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Live documents and peers
pub mod collab;

/// Authentication
pub mod auth;

/// Users and space roles
pub mod access;

/// Page storage
pub mod persistence;

/// Contributor tracking
pub mod contributors;

/// History revisions
pub mod history;

/// Side-effect signals
pub mod signals;

/// Backend error types
pub mod error;

/// Re-export commonly used types
pub use collab::{CollabGateway, MarkEditor};
pub use error::CollabError;
pub use server::{create_app, AppState};
