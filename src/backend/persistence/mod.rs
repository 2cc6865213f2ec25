//! Persistence Module
//!
//! Durable page storage and the coordinator that moves state between live
//! documents and page records.
//!
//! # Module Structure
//!
//! ```text
//! persistence/
//! ├── mod.rs         - Module exports
//! ├── store.rs       - Records and the PageStore trait
//! ├── postgres.rs    - PostgreSQL store (row-locked compare-and-write)
//! ├── memory.rs      - In-memory store for development and tests
//! └── coordinator.rs - Hydrate and flush
//! ```

/// Records and the storage trait
pub mod store;

/// PostgreSQL page store
pub mod postgres;

/// In-memory page store
pub mod memory;

/// Hydrate and flush
pub mod coordinator;

pub use coordinator::{FlushOutcome, PageState, PersistenceCoordinator};
pub use memory::MemoryPageStore;
pub use postgres::PgPageStore;
pub use store::{ContentUpdate, HistoryRevision, PageRecord, PageStore, StoreOutcome};
