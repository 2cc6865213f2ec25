//! Server Module
//!
//! Configuration, application state and startup wiring.
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports and documentation
//! ├── state.rs  - AppState and FromRef implementations
//! ├── config.rs - Environment configuration and database pool
//! └── init.rs   - Service wiring and app creation
//! ```
//!
//! # Initialization Flow
//!
//! 1. **Configuration Loading**: `CollabConfig::from_env`
//! 2. **Database**: optional pool, migrations run on connect
//! 3. **Services**: stores, signal sink, gateway, guard, mark editor
//! 4. **Router Creation**: health check and the collaboration upgrade path

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

// Re-export commonly used types
pub use config::{CollabConfig, ConfigError};
pub use init::{build_state, create_app};
pub use state::AppState;
