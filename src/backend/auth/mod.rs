//! Authentication Module
//!
//! Connection-time authentication for collaboration traffic.
//!
//! # Module Structure
//!
//! ```text
//! auth/
//! ├── mod.rs      - Module exports and documentation
//! ├── sessions.rs - Collaboration token verification
//! └── guard.rs    - Authentication guard (identity, page, role)
//! ```
//!
//! # Authentication Flow
//!
//! 1. Client opens `GET {COLLAB_PATH}/page.<uuid>` with a collaboration
//!    token in `Authorization: Bearer` or `?token=`
//! 2. Token verified → user resolved → page resolved → role resolved
//! 3. No role: 403. Reader: admitted read-only. Writer/admin: read-write.
//!
//! # Security
//!
//! - Only tokens with `type = "collab"` are accepted
//! - Pages outside the token's workspace answer 404, like missing pages
//! - Deactivated users are rejected even with a valid token

/// Collaboration token verification
pub mod sessions;

/// Authentication guard
pub mod guard;

// Re-export commonly used types
pub use guard::{AuthContext, AuthenticationGuard, Identity};
pub use sessions::{bearer_token, CollabClaims, TokenVerifier};
