//! Flush debouncing
//!
//! A pair of timers per document: a quiet period that restarts on every
//! edit, bounded by a hard ceiling measured from the first edit of the
//! window. Continuous typing therefore still flushes at least every
//! `ceiling`.

use std::time::Duration;

use tokio::time::Instant;

/// Debounce state of one document
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    quiet: Duration,
    ceiling: Duration,
    first_edit: Option<Instant>,
    last_edit: Option<Instant>,
}

impl DebounceWindow {
    pub fn new(quiet: Duration, ceiling: Duration) -> Self {
        Self {
            quiet,
            ceiling: ceiling.max(quiet),
            first_edit: None,
            last_edit: None,
        }
    }

    /// Record an edit at `now`
    pub fn touch(&mut self, now: Instant) {
        self.first_edit.get_or_insert(now);
        self.last_edit = Some(now);
    }

    /// True while edits are waiting for a flush
    pub fn is_pending(&self) -> bool {
        self.last_edit.is_some()
    }

    /// When the pending edits must be flushed
    pub fn deadline(&self) -> Option<Instant> {
        let first = self.first_edit?;
        let last = self.last_edit?;
        Some((last + self.quiet).min(first + self.ceiling))
    }

    /// True once the deadline has passed
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Close the window; the next edit opens a new one
    pub fn reset(&mut self) {
        self.first_edit = None;
        self.last_edit = None;
    }
}
