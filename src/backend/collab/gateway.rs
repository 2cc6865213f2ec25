/**
 * Connection Gateway
 *
 * Owns the table of open documents and the peers attached to each one.
 *
 * # Lifecycle of a document
 *
 * 1. First admission creates the entry and hydrates it once; concurrent
 *    admissions wait on the same hydration
 * 2. Edits from writable peers are merged, fanned out to the other peers,
 *    and arm the debounce window, the contributor set and the history timer
 * 3. The debounce task flushes once the window closes
 * 4. When the last peer leaves, a final flush runs if the document is
 *    dirty; on success the entry is retired along with its contributor
 *    set and history timer
 *
 * A failed flush keeps the document dirty and re-arms the window, so the
 * edits are retried. A document whose final flush failed stays in memory
 * until a retry succeeds.
 *
 * # Wire protocol
 *
 * Binary y-sync messages. On connect the server sends its SyncStep1; the
 * client answers with SyncStep2 and sends its own SyncStep1, which the
 * server answers with SyncStep2. After that both sides exchange Update
 * messages. Awareness messages are relayed verbatim.
 */

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use uuid::Uuid;
use yrs::sync::{Message, SyncMessage};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;

use crate::backend::auth::AuthContext;
use crate::backend::collab::debounce::DebounceWindow;
use crate::backend::collab::registry::{DocumentEntry, DocumentRegistry, Outbound, PeerId};
use crate::backend::contributors::ContributorTracker;
use crate::backend::error::CollabError;
use crate::backend::history::HistoryScheduler;
use crate::backend::persistence::{FlushOutcome, PageState, PersistenceCoordinator};
use crate::shared::{DocumentError, DocumentName, ReplicatedDocument};

/// v1 encoding of an update carrying nothing
const EMPTY_UPDATE: [u8; 2] = [0, 0];

/// Debounce timing applied to every document
#[derive(Debug, Clone, Copy)]
pub struct FlushTiming {
    pub quiet: Duration,
    pub ceiling: Duration,
}

struct GatewayInner {
    registry: Mutex<DocumentRegistry>,
    coordinator: PersistenceCoordinator,
    contributors: ContributorTracker,
    history: HistoryScheduler,
    timing: FlushTiming,
    next_peer: AtomicU64,
}

/// Shared handle to the gateway
#[derive(Clone)]
pub struct CollabGateway {
    inner: Arc<GatewayInner>,
}

impl CollabGateway {
    pub fn new(
        coordinator: PersistenceCoordinator,
        contributors: ContributorTracker,
        history: HistoryScheduler,
        timing: FlushTiming,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                registry: Mutex::new(DocumentRegistry::default()),
                coordinator,
                contributors,
                history,
                timing,
                next_peer: AtomicU64::new(1),
            }),
        }
    }

    /// Attach an authenticated peer to a document
    ///
    /// Hydrates the document on first admission. A hydrate failure refuses
    /// the connection and leaves nothing behind for this document.
    pub async fn admit(&self, document_name: &DocumentName, auth: AuthContext) -> Result<PeerSession, CollabError> {
        let read_only = auth.read_only;
        let identity = Some(auth.identity.user_id);
        self.attach(document_name, identity, read_only).await
    }

    /// Attach a server-side session with no user identity
    ///
    /// Counts as a peer until released, so the document stays open while
    /// the session mutates it.
    pub async fn open_direct(&self, document_name: &DocumentName) -> Result<PeerSession, CollabError> {
        self.attach(document_name, None, false).await
    }

    async fn attach(
        &self,
        document_name: &DocumentName,
        identity: Option<Uuid>,
        read_only: bool,
    ) -> Result<PeerSession, CollabError> {
        let peer_id = self.inner.next_peer.fetch_add(1, Ordering::Relaxed);
        let timing = self.inner.timing;

        let (document, loaded, updates) = {
            let mut registry = self.inner.registry.lock().await;
            let entry = registry.get_or_insert_with(document_name, || {
                DocumentEntry::new(DebounceWindow::new(timing.quiet, timing.ceiling))
            });
            entry.peers += 1;
            (entry.document.clone(), entry.loaded.clone(), entry.updates.subscribe())
        };

        let hydrated = loaded
            .get_or_try_init(|| async {
                let mut live = document.lock().await;
                if let Some(hydrated) = self.inner.coordinator.hydrate(document_name, &live).await? {
                    *live = hydrated;
                }
                Ok::<(), CollabError>(())
            })
            .await;

        if let Err(e) = hydrated {
            tracing::warn!("[Collab] Refusing peer {} on {}: {}", peer_id, document_name, e);
            let mut registry = self.inner.registry.lock().await;
            if let Some(entry) = registry.get_mut(document_name) {
                entry.peers = entry.peers.saturating_sub(1);
                if entry.peers == 0 && !entry.loaded.initialized() {
                    registry.remove(document_name);
                }
            }
            return Err(e);
        }

        tracing::info!(
            "[Collab] Peer {} joined {}{}",
            peer_id,
            document_name,
            if read_only { " (read-only)" } else { "" }
        );

        Ok(PeerSession {
            gateway: self.clone(),
            document_name: document_name.clone(),
            peer_id,
            identity,
            read_only,
            document,
            updates,
        })
    }

    /// Detach a peer; the last one out triggers the final flush
    pub async fn release_peer(&self, document_name: &DocumentName, peer_id: PeerId) {
        let remaining = {
            let mut registry = self.inner.registry.lock().await;
            match registry.get_mut(document_name) {
                Some(entry) => {
                    entry.peers = entry.peers.saturating_sub(1);
                    entry.peers
                }
                None => return,
            }
        };
        tracing::info!("[Collab] Peer {} left {} ({} remaining)", peer_id, document_name, remaining);
        if remaining > 0 {
            return;
        }

        match self.flush(document_name).await {
            Ok(_) => self.retire_if_idle(document_name).await,
            Err(e) => tracing::warn!(
                "[Collab] Final flush of {} failed, keeping it in memory for retry: {}",
                document_name,
                e
            ),
        }
    }

    /// Flush a document now if it has unflushed edits
    ///
    /// Flushes of one document never overlap. The captured state is what
    /// gets written; edits merged during the write mark the document dirty
    /// again.
    pub async fn flush(&self, document_name: &DocumentName) -> Result<FlushOutcome, CollabError> {
        let (document, flush_lock) = {
            let registry = self.inner.registry.lock().await;
            match registry.get(document_name) {
                Some(entry) => (entry.document.clone(), entry.flush_lock.clone()),
                None => return Ok(FlushOutcome::Unchanged),
            }
        };
        let _serial = flush_lock.lock().await;

        let editor = {
            let mut registry = self.inner.registry.lock().await;
            let Some(entry) = registry.get_mut(document_name) else {
                return Ok(FlushOutcome::Unchanged);
            };
            if !entry.dirty {
                return Ok(FlushOutcome::Unchanged);
            }
            entry.dirty = false;
            entry.debounce.reset();
            entry.last_editor
        };

        let state = {
            let live = document.lock().await;
            PageState::capture(&live)
        };
        let contributors = self.inner.contributors.drain(document_name).await;

        match self
            .inner
            .coordinator
            .flush(document_name, state, editor, contributors.clone())
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.inner.contributors.restore(document_name, contributors).await;
                let mut registry = self.inner.registry.lock().await;
                if let Some(entry) = registry.get_mut(document_name) {
                    entry.dirty = true;
                    entry.debounce.touch(Instant::now());
                    self.schedule_flush(document_name, entry);
                }
                Err(e)
            }
        }
    }

    /// Flush every open document, used on shutdown
    pub async fn flush_all(&self) {
        let names = self.inner.registry.lock().await.names();
        for name in names {
            if let Err(e) = self.flush(&name).await {
                tracing::error!("[Collab] Shutdown flush of {} failed: {}", name, e);
            }
        }
        self.inner.history.shutdown().await;
    }

    /// Names of the documents currently held in memory
    pub async fn open_documents(&self) -> Vec<DocumentName> {
        self.inner.registry.lock().await.names()
    }

    /// Number of peers attached to a document
    pub async fn peer_count(&self, document_name: &DocumentName) -> usize {
        self.inner
            .registry
            .lock()
            .await
            .get(document_name)
            .map_or(0, |entry| entry.peers)
    }

    /// True while a document has edits not yet flushed
    pub async fn is_dirty(&self, document_name: &DocumentName) -> bool {
        self.inner
            .registry
            .lock()
            .await
            .get(document_name)
            .is_some_and(|entry| entry.dirty)
    }

    /// The history scheduler driving revision snapshots
    pub fn history(&self) -> &HistoryScheduler {
        &self.inner.history
    }

    /// The contributor tracker
    pub fn contributors(&self) -> &ContributorTracker {
        &self.inner.contributors
    }

    async fn record_edit(
        &self,
        document_name: &DocumentName,
        origin: Option<PeerId>,
        identity: Option<Uuid>,
        payload: Vec<u8>,
    ) {
        // Recorded before the document turns dirty so a flush that captures
        // this edit also drains its contributor
        self.inner.contributors.record_edit(document_name, identity).await;

        {
            let mut registry = self.inner.registry.lock().await;
            let Some(entry) = registry.get_mut(document_name) else {
                return;
            };
            entry.dirty = true;
            if identity.is_some() {
                entry.last_editor = identity;
            }
            entry.debounce.touch(Instant::now());
            let _ = entry.updates.send(Outbound {
                origin,
                payload: payload.into(),
            });
            self.schedule_flush(document_name, entry);
        }

        self.inner.history.record_edit(document_name.page_id()).await;
    }

    fn relay(&self, entry: &DocumentEntry, origin: PeerId, payload: &[u8]) {
        let _ = entry.updates.send(Outbound {
            origin: Some(origin),
            payload: payload.into(),
        });
    }

    fn schedule_flush(&self, document_name: &DocumentName, entry: &mut DocumentEntry) {
        if entry.flush_task.is_some() {
            return;
        }
        let gateway = self.clone();
        let name = document_name.clone();
        entry.flush_task = Some(tokio::spawn(async move { gateway.run_debounce(name).await }));
    }

    async fn run_debounce(self, document_name: DocumentName) {
        loop {
            let deadline = {
                let mut registry = self.inner.registry.lock().await;
                let Some(entry) = registry.get_mut(&document_name) else {
                    return;
                };
                match entry.debounce.deadline() {
                    Some(deadline) => deadline,
                    None => {
                        entry.flush_task = None;
                        return;
                    }
                }
            };

            tokio::time::sleep_until(deadline).await;

            let due = {
                let registry = self.inner.registry.lock().await;
                match registry.get(&document_name) {
                    Some(entry) => entry.debounce.is_due(Instant::now()),
                    None => return,
                }
            };
            if !due {
                continue;
            }

            match self.flush(&document_name).await {
                Ok(_) => {
                    let idle = {
                        let mut registry = self.inner.registry.lock().await;
                        match registry.get_mut(&document_name) {
                            Some(entry) if entry.peers == 0 && !entry.dirty => {
                                entry.flush_task = None;
                                true
                            }
                            Some(_) => false,
                            None => return,
                        }
                    };
                    if idle {
                        self.retire_if_idle(&document_name).await;
                        return;
                    }
                }
                Err(e) => tracing::warn!("[Collab] Debounced flush of {} failed: {}", document_name, e),
            }
        }
    }

    async fn retire_if_idle(&self, document_name: &DocumentName) {
        let retired = {
            let mut registry = self.inner.registry.lock().await;
            let idle = registry
                .get(document_name)
                .is_some_and(|entry| entry.peers == 0 && !entry.dirty);
            if idle {
                registry.remove(document_name)
            } else {
                None
            }
        };
        let Some(mut entry) = retired else {
            return;
        };
        if let Some(task) = entry.flush_task.take() {
            task.abort();
        }

        self.inner.history.on_unload(document_name.page_id()).await;
        self.inner.contributors.on_unload(document_name).await;
        tracing::info!("[Collab] Retired {}", document_name);
    }
}

/// One peer attached to one document
pub struct PeerSession {
    gateway: CollabGateway,
    document_name: DocumentName,
    peer_id: PeerId,
    identity: Option<Uuid>,
    read_only: bool,
    document: Arc<Mutex<ReplicatedDocument>>,
    updates: broadcast::Receiver<Outbound>,
}

impl PeerSession {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn document_name(&self) -> &DocumentName {
        &self.document_name
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Server SyncStep1, sent as soon as the connection opens
    pub async fn greeting(&self) -> Vec<u8> {
        let live = self.document.lock().await;
        Message::Sync(SyncMessage::SyncStep1(live.current_state_vector())).encode_v1()
    }

    /// Process one incoming message
    ///
    /// # Returns
    ///
    /// Replies for this peer only. Fan-out to the other peers happens
    /// through the document's update channel.
    ///
    /// # Errors
    ///
    /// `Protocol` for undecodable frames, `Document` for updates the
    /// document rejects. Either way the connection should be closed.
    pub async fn handle_message(&self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, CollabError> {
        let message = Message::decode_v1(bytes)
            .map_err(|e| CollabError::protocol(format!("Undecodable frame: {}", e)))?;

        match message {
            Message::Sync(SyncMessage::SyncStep1(remote)) => {
                let live = self.document.lock().await;
                let diff = live.diff_since_vector(&remote);
                Ok(vec![Message::Sync(SyncMessage::SyncStep2(diff)).encode_v1()])
            }
            Message::Sync(SyncMessage::SyncStep2(update)) | Message::Sync(SyncMessage::Update(update)) => {
                if self.read_only {
                    tracing::debug!(
                        "[Collab] Ignoring update from read-only peer {} on {}",
                        self.peer_id,
                        self.document_name
                    );
                    return Ok(Vec::new());
                }
                self.merge(update).await?;
                Ok(Vec::new())
            }
            Message::Awareness(_) => {
                let registry = self.gateway.inner.registry.lock().await;
                if let Some(entry) = registry.get(&self.document_name) {
                    self.gateway.relay(entry, self.peer_id, bytes);
                }
                Ok(Vec::new())
            }
            Message::Custom(tag, _) => {
                tracing::debug!("[Collab] Ignoring custom message {} from peer {}", tag, self.peer_id);
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn merge(&self, update: Vec<u8>) -> Result<(), CollabError> {
        if update.as_slice() == EMPTY_UPDATE {
            return Ok(());
        }
        {
            let live = self.document.lock().await;
            live.apply_update(&update)?;
        }
        let payload = Message::Sync(SyncMessage::Update(update)).encode_v1();
        self.gateway
            .record_edit(&self.document_name, Some(self.peer_id), self.identity, payload)
            .await;
        Ok(())
    }

    /// Mutate the document on behalf of this session
    ///
    /// Whatever `edit` changes is encoded as one update and fanned out to
    /// every peer, then handled like any other edit.
    pub async fn transact_local<R, F>(&self, edit: F) -> Result<R, CollabError>
    where
        F: FnOnce(&ReplicatedDocument) -> Result<R, DocumentError>,
    {
        if self.read_only {
            return Err(CollabError::forbidden("Read-only session cannot edit"));
        }

        let (result, update) = {
            let live = self.document.lock().await;
            live.record_changes(edit)?
        };

        if let Some(update) = update {
            let payload = Message::Sync(SyncMessage::Update(update)).encode_v1();
            self.gateway
                .record_edit(&self.document_name, None, self.identity, payload)
                .await;
        }
        Ok(result)
    }

    /// Next message to forward to this peer
    ///
    /// A peer that fell behind the fan-out channel gets the full document
    /// as one update instead of the messages it missed.
    pub async fn next_outbound(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.updates.recv().await {
                Ok(outbound) if outbound.origin == Some(self.peer_id) => continue,
                Ok(outbound) => return Some(outbound.payload.to_vec()),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "[Collab] Peer {} lagged {} messages on {}, resending full state",
                        self.peer_id,
                        missed,
                        self.document_name
                    );
                    let live = self.document.lock().await;
                    return Some(Message::Sync(SyncMessage::Update(live.snapshot())).encode_v1());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Contributors recorded for this document and not yet flushed
    pub async fn pending_contributors(&self) -> HashSet<Uuid> {
        self.gateway.contributors().pending(&self.document_name).await
    }

    /// Detach from the document
    pub async fn release(self) {
        self.gateway.release_peer(&self.document_name, self.peer_id).await;
    }
}
