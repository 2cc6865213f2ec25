// Increase recursion limit for complex async operations
#![recursion_limit = "256"]

//! collabdoc - Collaborative Document Sync Core
//!
//! collabdoc keeps rich-text pages consistent across concurrent editors.
//! Every open page is held in memory as a yrs CRDT document; peers exchange
//! binary updates over websockets, and the merged state is written back to
//! the page record in the background.
//!
//! # Module Structure
//!
//! - **`shared`** - Platform-agnostic document core
//!   - Replicated document store and document names
//!   - Rich-text JSON <-> CRDT tree conversion, plain text, mentions
//!   - Logical anchors and direct mark editing
//!   - Error types
//!
//! - **`backend`** - Server-side code (only compiled with `ssr` feature)
//!   - Connection gateway and per-document registry
//!   - Authentication guard for collaboration tokens
//!   - Persistence coordinator (hydrate and debounced flush)
//!   - Contributor tracking and periodic history revisions
//!   - Side-effect signals for indexing and notifications
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - enables the backend modules, the axum server,
//!   PostgreSQL persistence and JWT verification
//!
//! # Usage
//!
//! ```rust,no_run
//! use collabdoc::backend::server::{config::CollabConfig, init::create_app};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CollabConfig::from_env()?;
//! let (app, _state) = create_app(config).await?;
//! // Serve `app` with axum
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Every live document sits behind a `tokio::sync::Mutex`; yrs transactions
//! are opened and committed inside synchronous sections and never held
//! across an `.await`.

/// Shared document core
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
