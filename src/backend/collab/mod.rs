//! Collaboration Module
//!
//! Live documents and the peers editing them.
//!
//! # Module Structure
//!
//! ```text
//! collab/
//! ├── mod.rs      - Module exports and documentation
//! ├── debounce.rs - Quiet-period and ceiling flush timing
//! ├── registry.rs - Open documents and their fan-out channels
//! ├── gateway.rs  - Admission, sync protocol, flush and retirement
//! ├── marks.rs    - Server-side mark edits through the gateway
//! └── handlers.rs - Websocket upgrade endpoint
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let session = gateway.admit(&document_name, auth).await?;
//! socket.send(session.greeting().await).await?;
//! for frame in incoming {
//!     for reply in session.handle_message(&frame).await? {
//!         socket.send(reply).await?;
//!     }
//! }
//! session.release().await;
//! ```

/// Flush debouncing
pub mod debounce;

/// Open document table
pub mod registry;

/// Connection gateway
pub mod gateway;

/// Mark editor service
pub mod marks;

/// Websocket upgrade handler
pub mod handlers;

pub use gateway::{CollabGateway, FlushTiming, PeerSession};
pub use handlers::handle_collab_upgrade;
pub use marks::MarkEditor;
pub use registry::{Outbound, PeerId};
