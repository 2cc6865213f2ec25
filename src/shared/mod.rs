//! Shared Module
//!
//! The document core used by every server component: the replicated
//! document itself, conversion to and from the editor's rich-text JSON,
//! logical anchors and direct mark editing.
//!
//! Nothing in this module touches the network or storage, so it is
//! compiled regardless of the `ssr` feature.

/// Replicated Document Store
pub mod document;

/// Rich-text JSON schema transformer
pub mod schema;

/// Logical positions that survive concurrent edits
pub mod anchor;

/// Direct mark editing
pub mod marks;

/// Shared error types
pub mod error;

/// Re-export commonly used types for convenience
pub use anchor::{Anchor, AnchorRange};
pub use document::{DocumentName, ReplicatedDocument};
pub use error::DocumentError;
pub use schema::{Mention, MentionKind};
