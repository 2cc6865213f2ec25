//! Route Configuration Module
//!
//! # Module Structure
//!
//! ```text
//! routes/
//! ├── mod.rs    - Module exports and documentation
//! └── router.rs - Router creation
//! ```
//!
//! # Route Types
//!
//! - `GET /health` - health check
//! - `GET {COLLAB_PATH}/{document_name}` - collaboration websocket upgrade

/// Main router creation
pub mod router;

pub use router::create_router;
