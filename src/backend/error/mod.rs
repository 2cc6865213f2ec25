//! Backend Error Module
//!
//! Error types used by the server components.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - CollabError definition and constructors
//! └── conversion.rs - IntoResponse implementation
//! ```
//!
//! # HTTP Response Conversion
//!
//! `CollabError` implements `IntoResponse`, so authentication and hydrate
//! failures can be returned straight from the upgrade handler with an
//! appropriate status code and a JSON body.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::CollabError;
