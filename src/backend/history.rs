//! History Scheduler
//!
//! Writes periodic history revisions of pages that are actively being
//! edited. Each open document is either idle (no timer) or armed:
//!
//! ```text
//!            first edit                last peer leaves
//!   idle ─────────────────▶ armed ─────────────────────▶ idle
//!                            │  ▲
//!                            └──┘ tick every `interval`:
//!                                 revision if edited within `interval`
//! ```
//!
//! A tick only writes when `now - last_edit < interval`, and the store skips
//! the write when the content equals the latest revision. Snapshot failures
//! are logged; the timer keeps running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::backend::persistence::PageStore;

/// History timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// Scheduler tick interval and "active editing" window
    pub interval: Duration,
    /// Pages younger than this use `fresh_delay` for history-due signals
    pub fresh_page_age: Duration,
    /// History-due delay for freshly created pages
    pub fresh_delay: Duration,
    /// History-due delay for established pages
    pub delay: Duration,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            fresh_page_age: Duration::from_secs(300),
            fresh_delay: Duration::from_secs(60),
            delay: Duration::from_secs(600),
        }
    }
}

impl HistoryPolicy {
    /// Delay before a history snapshot for a page of the given age
    pub fn delay_for_age(&self, age: Duration) -> Duration {
        if age < self.fresh_page_age {
            self.fresh_delay
        } else {
            self.delay
        }
    }
}

struct HistoryTimer {
    last_edit: watch::Sender<Instant>,
    task: JoinHandle<()>,
}

/// Per-document periodic history snapshots
pub struct HistoryScheduler {
    pages: Arc<dyn PageStore>,
    interval: Duration,
    timers: Mutex<HashMap<Uuid, HistoryTimer>>,
}

impl HistoryScheduler {
    pub fn new(pages: Arc<dyn PageStore>, interval: Duration) -> Self {
        Self {
            pages,
            interval,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Note an edit to a page, arming its timer on the first one
    pub async fn record_edit(&self, page_id: Uuid) {
        let now = Instant::now();
        let mut timers = self.timers.lock().await;

        if let Some(timer) = timers.get(&page_id) {
            timer.last_edit.send_replace(now);
            return;
        }

        let (last_edit, watcher) = watch::channel(now);
        let task = tokio::spawn(run_timer(self.pages.clone(), page_id, self.interval, watcher));
        timers.insert(page_id, HistoryTimer { last_edit, task });
        tracing::debug!("[History] Armed history timer for page {}", page_id);
    }

    /// Cancel the page's timer and forget its last edit
    pub async fn on_unload(&self, page_id: Uuid) {
        if let Some(timer) = self.timers.lock().await.remove(&page_id) {
            timer.task.abort();
            tracing::debug!("[History] Cancelled history timer for page {}", page_id);
        }
    }

    /// True while the page's timer is running
    pub async fn is_armed(&self, page_id: Uuid) -> bool {
        self.timers.lock().await.contains_key(&page_id)
    }

    /// Cancel every timer
    pub async fn shutdown(&self) {
        for (_, timer) in self.timers.lock().await.drain() {
            timer.task.abort();
        }
    }
}

impl Drop for HistoryScheduler {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().values() {
            timer.task.abort();
        }
    }
}

async fn run_timer(
    pages: Arc<dyn PageStore>,
    page_id: Uuid,
    interval: Duration,
    last_edit: watch::Receiver<Instant>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let tick = ticker.tick().await;
        let edited_at = *last_edit.borrow();
        if tick.saturating_duration_since(edited_at) >= interval {
            tracing::debug!("[History] Page {} idle this interval, no revision", page_id);
            continue;
        }
        snapshot(pages.as_ref(), page_id).await;
    }
}

async fn snapshot(pages: &dyn PageStore, page_id: Uuid) {
    let page = match pages.find_page(page_id).await {
        Ok(Some(page)) => page,
        Ok(None) => {
            tracing::warn!("[History] Page {} disappeared, skipping revision", page_id);
            return;
        }
        Err(e) => {
            tracing::error!("[History] Failed to load page {} for revision: {}", page_id, e);
            return;
        }
    };

    match pages.insert_history_if_changed(&page).await {
        Ok(Some(revision)) => {
            tracing::info!("[History] Wrote revision {} for page {}", revision.id, page_id)
        }
        Ok(None) => tracing::debug!("[History] Page {} unchanged since last revision", page_id),
        Err(e) => tracing::error!("[History] Failed to write revision for page {}: {}", page_id, e),
    }
}
