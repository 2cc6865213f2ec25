//! Shared Error Types
//!
//! Errors raised by the platform-agnostic document core: decoding and
//! merging binary updates, converting between the rich-text JSON form and
//! the replicated tree, and resolving logical anchors.
//!
//! # Error Categories
//!
//! - `Decode` / `Apply` - a binary update could not be decoded or merged
//! - `Schema` - a rich-text JSON tree is malformed
//! - `StaleAnchor` - a logical position no longer resolves
//! - `InvalidRange` - an anchor range resolved backwards or out of bounds
//!
//! # Usage
//!
//! ```rust
//! use collabdoc::shared::error::DocumentError;
//!
//! let error = DocumentError::schema("content", "expected an array");
//! assert!(error.to_string().contains("content"));
//! ```
use thiserror::Error;

/// Errors produced by the replicated document core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentError {
    /// Binary update or anchor bytes could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Human-readable error message
        message: String,
    },

    /// A decoded update could not be integrated into the document
    #[error("Apply error: {message}")]
    Apply {
        /// Human-readable error message
        message: String,
    },

    /// Rich-text JSON did not match the expected node shape
    #[error("Schema error at '{path}': {message}")]
    Schema {
        /// Location of the offending node
        path: String,
        /// Human-readable error message
        message: String,
    },

    /// The content a logical anchor pointed to no longer exists
    #[error("Stale anchor: {message}")]
    StaleAnchor {
        /// Human-readable error message
        message: String,
    },

    /// An anchor range resolved to an unusable span
    #[error("Invalid range: {start}..{end}")]
    InvalidRange {
        /// Resolved start position
        start: u32,
        /// Resolved end position
        end: u32,
    },
}

impl DocumentError {
    /// Create a new decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new apply error
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    /// Create a new schema error
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new stale anchor error
    pub fn stale_anchor(message: impl Into<String>) -> Self {
        Self::StaleAnchor {
            message: message.into(),
        }
    }

    /// True when the caller's view of the document is out of date and the
    /// operation should be retried against a fresh selection.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleAnchor { .. } | Self::InvalidRange { .. })
    }
}
