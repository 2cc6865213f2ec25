/**
 * Backend Error Types
 *
 * This module defines the error type shared by every server component.
 * Errors carry enough context to be logged where they are caught and can be
 * converted to HTTP responses by the gateway before a websocket upgrade.
 *
 * # Error Categories
 *
 * ## Authentication Rejections
 *
 * Raised by the authentication guard before any document bytes flow:
 * - Invalid, expired or wrong-purpose token (`Unauthorized`)
 * - No role on the page's space (`Forbidden`)
 * - Unknown document name or page (`NotFound`)
 *
 * ## Storage Errors
 *
 * Raised by page stores and the access directory. Hydrate and flush never
 * swallow them; the caller logs and refuses or retries.
 *
 * ## Document Errors
 *
 * Wrapped `DocumentError`s from the shared core: corrupt snapshots, bad
 * JSON content, stale anchors.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::server::config::ConfigError;
use crate::shared::DocumentError;

/// Backend error type
///
/// # Usage
///
/// ```rust
/// use collabdoc::backend::error::CollabError;
///
/// let err = CollabError::forbidden("no role on space");
/// assert_eq!(err.status_code().as_u16(), 403);
/// ```
#[derive(Debug, Error)]
pub enum CollabError {
    /// Token missing, malformed, expired or not a collaboration token
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message
        message: String,
    },

    /// Identity is valid but holds no role on the page's space
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable error message
        message: String,
    },

    /// Document name or page could not be resolved
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message
        message: String,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage error not originating from the database driver
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// Error from the shared document core
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed sync protocol traffic
    #[error("Protocol error: {message}")]
    Protocol {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollabError {
    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// True for rejections produced by the authentication guard
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. } | Self::Forbidden { .. } | Self::NotFound { .. }
        )
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `Unauthorized` - 401
    /// - `Forbidden` - 403
    /// - `NotFound` - 404
    /// - `Document` - 409 for stale anchors, 400 for undecodable input,
    ///   422 for schema errors
    /// - `Protocol` - 400
    /// - everything else - 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Document(err) => match err {
                DocumentError::StaleAnchor { .. } | DocumentError::InvalidRange { .. } => {
                    StatusCode::CONFLICT
                }
                DocumentError::Decode { .. } | DocumentError::Apply { .. } => StatusCode::BAD_REQUEST,
                DocumentError::Schema { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
            Self::Protocol { .. } => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Storage { .. } | Self::Config(_) | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error message
    ///
    /// Database details are not exposed to clients.
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::NotFound { message }
            | Self::Storage { message }
            | Self::Protocol { message } => message.clone(),
            Self::Database(_) => "Database error".to_string(),
            Self::Document(err) => err.to_string(),
            Self::Config(err) => err.to_string(),
            Self::Serialization(err) => err.to_string(),
        }
    }
}
