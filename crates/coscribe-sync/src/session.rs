//! Document session — ties local edits, batching, and sync together.
//!
//! The session owns the live local tree, the base snapshot at the last
//! confirmed batch boundary, and the last confirmed version. Local edits
//! mutate the live tree immediately (optimistic); when the scheduler cuts a
//! batch, the session diffs live against base and sends the ops gated on
//! the confirmed version.
//!
//! Conflict recovery runs exactly once per batch: fetch the authoritative
//! tree, replay the cut batch on top of it (which preserves other clients'
//! confirmed edits), adopt the merged tree, and resend against the fetched
//! version. A second conflict surfaces [`SyncError::EditConflict`] and the
//! caller falls back to [`DocumentSession::refresh`].
//!
//! Sessions are single-threaded: the store is mutated only by the owning
//! edit stream and by adopting confirmed state, so there is no locking.

use std::time::Instant;

use coscribe_model::{BlockStore, Document, PatchRequest, StoreError, TreeSnapshot, diff};
use tracing::{debug, info, warn};

use crate::{DocumentEndpoint, EditScheduler, Result, SyncClient, SyncConfig, SyncError};

pub struct DocumentSession<E> {
    store: BlockStore,
    base: BlockStore,
    version: u64,
    scheduler: EditScheduler,
    client: SyncClient<E>,
}

impl<E: DocumentEndpoint> DocumentSession<E> {
    /// Open a session over an already-fetched authoritative tree.
    pub fn new(endpoint: E, initial: BlockStore, version: u64, config: SyncConfig) -> Self {
        let scheduler = EditScheduler::new(config.quiescence_window);
        Self {
            base: initial.clone(),
            store: initial,
            version,
            scheduler,
            client: SyncClient::new(endpoint, config),
        }
    }

    /// Open a session by fetching the authoritative tree first.
    pub async fn open(endpoint: E, config: SyncConfig) -> Result<Self> {
        let mut client = SyncClient::new(endpoint, config.clone());
        let (snapshot, version) = client.fetch_latest().await?;
        let store = BlockStore::from_snapshot(&snapshot)?;
        Ok(Self {
            base: store.clone(),
            store,
            version,
            scheduler: EditScheduler::new(config.quiescence_window),
            client,
        })
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        self.store.snapshot()
    }

    pub fn has_pending_edits(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Earliest instant a pending batch comes due; drives the caller's
    /// timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Apply a local mutation and restart the quiescence window. The
    /// mutation is visible immediately; it travels with the next batch.
    pub fn edit<T>(
        &mut self,
        f: impl FnOnce(&mut BlockStore) -> std::result::Result<T, StoreError>,
    ) -> std::result::Result<T, StoreError> {
        let out = f(&mut self.store)?;
        self.scheduler.record_edit(Instant::now());
        Ok(out)
    }

    /// Flush the pending batch if its quiescence window has elapsed.
    /// Returns the confirmed version when a batch was sent.
    pub async fn tick(&mut self, now: Instant) -> Result<Option<u64>> {
        if self.scheduler.is_due(now) {
            self.flush().await
        } else {
            Ok(None)
        }
    }

    /// Flush immediately (document close, navigation away). Cancels the
    /// quiescence timer; a no-op when nothing changed since the last
    /// confirmed batch.
    pub async fn flush(&mut self) -> Result<Option<u64>> {
        self.scheduler.begin_flush();
        let ops = diff(&self.base, &self.store);
        if ops.is_empty() {
            self.scheduler.complete(Instant::now());
            return Ok(None);
        }

        let request = PatchRequest::new(ops, self.version);
        let result = self.send_with_rebase(request).await;
        self.scheduler.complete(Instant::now());
        match result {
            Ok(version) => Ok(Some(version)),
            // Transport and validation failures keep the batch; rearm the
            // window so a later tick retries. An edit conflict is terminal
            // for this batch and waits for an explicit refresh.
            Err(SyncError::EditConflict) => Err(SyncError::EditConflict),
            Err(e) => {
                self.scheduler.record_edit(Instant::now());
                Err(e)
            }
        }
    }

    async fn send_with_rebase(&mut self, request: PatchRequest) -> Result<u64> {
        match self.client.send(&request).await {
            Ok(version) => {
                debug!(version, "batch confirmed");
                self.version = version;
                self.base = self.store.clone();
                Ok(version)
            }
            Err(SyncError::VersionConflict { current }) => {
                info!(base = self.version, current, "version conflict, rebasing once");
                self.rebase_and_resend(request).await
            }
            Err(e) => Err(e),
        }
    }

    /// One automatic recovery pass. Replaying the cut batch onto the
    /// fetched tree keeps other clients' confirmed edits; adopting the
    /// merged tree keeps local and authoritative state identical when the
    /// resend lands.
    async fn rebase_and_resend(&mut self, request: PatchRequest) -> Result<u64> {
        let (snapshot, version) = self.client.fetch_latest().await?;
        let authoritative = BlockStore::from_snapshot(&snapshot)?;

        let rebased = PatchRequest::new(request.ops, version);
        let mut trial = Document::with_store(authoritative, version);
        if let Err(e) = trial.apply(&rebased) {
            warn!(error = %e, "batch no longer applies after rebase");
            return Err(SyncError::EditConflict);
        }

        match self.client.send(&rebased).await {
            Ok(confirmed) => {
                debug!(version = confirmed, "rebased batch confirmed");
                self.version = confirmed;
                self.store = trial.into_store();
                self.base = self.store.clone();
                Ok(confirmed)
            }
            Err(SyncError::VersionConflict { current }) => {
                warn!(current, "second consecutive conflict, giving up on this batch");
                Err(SyncError::EditConflict)
            }
            Err(e) => Err(e),
        }
    }

    /// Discard local pending state and adopt the authoritative tree. The
    /// escape hatch after an [`SyncError::EditConflict`].
    pub async fn refresh(&mut self) -> Result<u64> {
        let (snapshot, version) = self.client.fetch_latest().await?;
        let store = BlockStore::from_snapshot(&snapshot)?;
        info!(version, blocks = snapshot.len(), "adopted authoritative tree");
        self.base = store.clone();
        self.store = store;
        self.version = version;
        Ok(version)
    }
}
