//! Side-effect Signals
//!
//! Fire-and-forget notifications emitted after a successful flush. Search
//! indexing, mention notifications and history snapshots all live outside
//! this crate; they subscribe to these signals through whichever
//! [`SignalSink`] the server was composed with.
//!
//! # Module Structure
//!
//! ```text
//! signals/
//! ├── mod.rs       - Signal type, SignalSink trait, no-op sink
//! └── broadcast.rs - tokio broadcast sink and helper
//! ```
//!
//! # Signals
//!
//! - `ContentChanged` - a page's stored content changed
//! - `MentionsChanged` - user mentions added/removed, page mentions added
//! - `HistoryDue` - a history snapshot should be taken after a delay

/// Broadcast-channel signal sink
pub mod broadcast;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::Mention;

pub use broadcast::{broadcast_signal, BroadcastSignalSink};

/// A side effect requested by the persistence coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Stored content changed; downstream indexing should refresh the page
    ContentChanged {
        page_id: Uuid,
        workspace_id: Uuid,
    },

    /// Mention entities differ between the previous and current content
    MentionsChanged {
        page_id: Uuid,
        space_id: Uuid,
        workspace_id: Uuid,
        /// Identity whose edit was flushed, if known
        actor_id: Option<Uuid>,
        /// Users mentioned now but not before; these get notified
        added_users: Vec<Mention>,
        /// Users no longer mentioned
        removed_users: Vec<Mention>,
        /// Pages newly linked from this page, for backlinks
        added_pages: Vec<Mention>,
    },

    /// Take a history snapshot of the page after `delay_ms`
    HistoryDue {
        page_id: Uuid,
        delay_ms: u64,
    },
}

impl Signal {
    /// Page the signal refers to
    pub fn page_id(&self) -> Uuid {
        match self {
            Self::ContentChanged { page_id, .. }
            | Self::MentionsChanged { page_id, .. }
            | Self::HistoryDue { page_id, .. } => *page_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentChanged { .. } => "content_changed",
            Self::MentionsChanged { .. } => "mentions_changed",
            Self::HistoryDue { .. } => "history_due",
        }
    }
}

/// Destination for side-effect signals
///
/// Emitting never fails from the caller's point of view: a sink that
/// cannot deliver logs and drops the signal.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Hand a signal to the sink
    async fn emit(&self, signal: Signal);
}

/// Sink that drops every signal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSignalSink;

#[async_trait]
impl SignalSink for NoopSignalSink {
    async fn emit(&self, signal: Signal) {
        tracing::debug!(
            "[Signals] Dropping {} for page {} (no sink configured)",
            signal.kind(),
            signal.page_id()
        );
    }
}
