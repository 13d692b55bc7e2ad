//! Reactive state projection: entity id -> status and metrics.
//!
//! Two writers share it: optimistic local updates from user actions and
//! authoritative pushes from the event stream. Writes are last-write-wins.
//! Each entry also records a per-id sequence number and the writer's
//! [`Source`] so an optimistic write can be reverted only while it is
//! still the latest word on that id.
//!
//! Readers get lock-free snapshots through `ArcSwap` and can await changes
//! on a `watch` revision counter. `reset` bumps the epoch; stream writes
//! carry the epoch their connection was opened under and are rejected once
//! it is stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use clouddeploy_protocol::{EntityMetrics, EntityStatus};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Local,
    Stream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityEntry {
    pub status: Option<EntityStatus>,
    pub metrics: Option<EntityMetrics>,
    /// Bumped on every status write to this id
    pub seq: u64,
    pub source: Source,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectionSnapshot {
    pub revision: u64,
    pub epoch: u64,
    pub entries: HashMap<String, EntityEntry>,
}

impl ProjectionSnapshot {
    pub fn status(&self, id: &str) -> Option<EntityStatus> {
        self.entries.get(id).and_then(|e| e.status)
    }

    pub fn metrics(&self, id: &str) -> Option<&EntityMetrics> {
        self.entries.get(id).and_then(|e| e.metrics.as_ref())
    }

    /// Ids in a stable order for rendering
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receipt for an optimistic write; hand it back to [`Projection::revert`]
#[derive(Debug, Clone, PartialEq)]
#[must_use = "keep the receipt to revert the optimistic write on failure"]
pub struct Optimistic {
    pub id: String,
    pub status: EntityStatus,
    previous: Option<EntityStatus>,
    seq: u64,
    epoch: u64,
}

#[derive(Default)]
struct Inner {
    epoch: u64,
    revision: u64,
    next_seq: u64,
    entries: HashMap<String, EntityEntry>,
}

pub struct Projection {
    inner: Mutex<Inner>,
    snapshot: ArcSwap<ProjectionSnapshot>,
    revision_tx: watch::Sender<u64>,
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection {
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            snapshot: ArcSwap::from_pointee(ProjectionSnapshot::default()),
            revision_tx,
        }
    }

    /// Lock-free snapshot read
    pub fn read(&self) -> Arc<ProjectionSnapshot> {
        self.snapshot.load_full()
    }

    /// Revision counter that ticks on every visible change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Local status write
    pub fn apply_status(&self, id: &str, status: EntityStatus) {
        let mut inner = self.lock();
        if unchanged(&inner, id, status, Source::Local) {
            return;
        }
        write_status(&mut inner, id, status, Source::Local);
        self.publish(&mut inner);
    }

    pub fn apply_metrics(&self, id: &str, metrics: EntityMetrics) {
        let mut inner = self.lock();
        write_metrics(&mut inner, id, metrics);
        self.publish(&mut inner);
    }

    /// Stream status write; dropped if the projection was reset since `epoch`
    pub fn apply_status_at(&self, epoch: u64, id: &str, status: EntityStatus) -> bool {
        let mut inner = self.lock();
        if !current_epoch(&inner, epoch, id) {
            return false;
        }
        if unchanged(&inner, id, status, Source::Stream) {
            return true;
        }
        write_status(&mut inner, id, status, Source::Stream);
        self.publish(&mut inner);
        true
    }

    pub fn apply_metrics_at(&self, epoch: u64, id: &str, metrics: EntityMetrics) -> bool {
        let mut inner = self.lock();
        if !current_epoch(&inner, epoch, id) {
            return false;
        }
        write_metrics(&mut inner, id, metrics);
        self.publish(&mut inner);
        true
    }

    /// Local write made ahead of the server's answer
    pub fn apply_optimistic(&self, id: &str, status: EntityStatus) -> Optimistic {
        let mut inner = self.lock();
        let previous = inner.entries.get(id).and_then(|e| e.status);
        let seq = write_status(&mut inner, id, status, Source::Local);
        let epoch = inner.epoch;
        self.publish(&mut inner);
        Optimistic {
            id: id.to_string(),
            status,
            previous,
            seq,
            epoch,
        }
    }

    /// Undo an optimistic write. A no-op (returns false) if anything wrote
    /// this id's status since, or the projection was reset.
    pub fn revert(&self, optimistic: Optimistic) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.epoch != optimistic.epoch {
            return false;
        }
        let Some(entry) = inner.entries.get_mut(&optimistic.id) else {
            return false;
        };
        if entry.seq != optimistic.seq {
            debug!(
                component = "projection",
                event = "projection.revert_skipped",
                id = %optimistic.id,
                "Newer write landed, keeping it"
            );
            return false;
        }

        let prune = optimistic.previous.is_none() && entry.metrics.is_none();
        entry.status = optimistic.previous;
        if prune {
            inner.entries.remove(&optimistic.id);
        }
        self.publish(inner);
        true
    }

    /// Prune an entity's status and metrics
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.lock();
        if inner.entries.remove(id).is_none() {
            return false;
        }
        self.publish(&mut inner);
        true
    }

    /// Forget everything and start a new epoch
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.epoch += 1;
        debug!(
            component = "projection",
            event = "projection.reset",
            epoch = inner.epoch,
            "Projection reset"
        );
        self.publish(&mut inner);
    }

    /// Runs under the write lock so snapshots are published in write order
    fn publish(&self, inner: &mut Inner) {
        inner.revision += 1;
        self.snapshot.store(Arc::new(ProjectionSnapshot {
            revision: inner.revision,
            epoch: inner.epoch,
            entries: inner.entries.clone(),
        }));
        self.revision_tx.send_replace(inner.revision);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn current_epoch(inner: &Inner, epoch: u64, id: &str) -> bool {
    if inner.epoch == epoch {
        return true;
    }
    debug!(
        component = "projection",
        event = "projection.stale_write",
        id,
        write_epoch = epoch,
        current_epoch = inner.epoch,
        "Dropping write from a torn-down stream"
    );
    false
}

/// Repeating the latest write from the same source changes nothing, so it
/// is not published. Optimistic writes skip this check to get a fresh seq.
fn unchanged(inner: &Inner, id: &str, status: EntityStatus, source: Source) -> bool {
    inner
        .entries
        .get(id)
        .is_some_and(|e| e.status == Some(status) && e.source == source)
}

/// Returns the sequence number assigned to the write
fn write_status(inner: &mut Inner, id: &str, status: EntityStatus, source: Source) -> u64 {
    inner.next_seq += 1;
    let seq = inner.next_seq;
    let entry = inner
        .entries
        .entry(id.to_string())
        .or_insert_with(|| EntityEntry {
            status: None,
            metrics: None,
            seq,
            source,
        });
    entry.status = Some(status);
    entry.seq = seq;
    entry.source = source;
    if status == EntityStatus::Running && entry.metrics.is_none() {
        entry.metrics = Some(EntityMetrics::zeroed(chrono::Utc::now().to_rfc3339()));
    }
    seq
}

fn write_metrics(inner: &mut Inner, id: &str, metrics: EntityMetrics) {
    match inner.entries.get_mut(id) {
        Some(entry) => entry.metrics = Some(metrics),
        None => {
            inner.entries.insert(
                id.to_string(),
                EntityEntry {
                    status: None,
                    metrics: Some(metrics),
                    seq: 0,
                    source: Source::Stream,
                },
            );
        }
    }
}
