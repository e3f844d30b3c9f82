// Subscription bookkeeping shared by the store implementations.
//
// Stores hold their data lock while they notify, so snapshots for one target
// leave in the same order the writes were applied. Lock order is always
// store data first, registry second.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::path::DocPath;
use crate::store::{Snapshot, WatchTarget};

struct Watcher {
    target: WatchTarget,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Watchers {
    next_id: u64,
    active: HashMap<u64, Watcher>,
}

/// Registry of live subscriptions for one store.
#[derive(Default)]
pub struct WatchRegistry {
    inner: Mutex<Watchers>,
}

impl WatchRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Watchers> {
        // The map stays consistent even if a holder panicked mid-notify.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a watcher and queue its initial snapshot.
    ///
    /// Callers must hold their data lock while calling this so no write can
    /// slip in between `initial` and registration.
    pub fn register(self: &Arc<Self>, target: WatchTarget, initial: Snapshot) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this send cannot fail.
        let _ = tx.send(initial);

        let mut watchers = self.lock();
        let id = watchers.next_id;
        watchers.next_id += 1;
        watchers.active.insert(
            id,
            Watcher {
                target: target.clone(),
                tx,
            },
        );
        debug!("Subscription {} registered for {:?}", id, target);

        Subscription {
            id,
            target,
            rx,
            registry: Arc::downgrade(self),
            canceled: false,
        }
    }

    /// Push a fresh snapshot to every watcher affected by any of `paths`.
    /// `snapshot_of` computes the current state of a target; returning `None`
    /// skips that watcher for this write.
    pub fn notify<F>(&self, paths: &[&DocPath], mut snapshot_of: F)
    where
        F: FnMut(&WatchTarget) -> Option<Snapshot>,
    {
        let mut watchers = self.lock();
        let mut closed = Vec::new();
        for (id, watcher) in watchers.active.iter() {
            if !paths.iter().any(|p| watcher.target.is_affected_by(p)) {
                continue;
            }
            let Some(snapshot) = snapshot_of(&watcher.target) else {
                continue;
            };
            if watcher.tx.send(snapshot).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            watchers.active.remove(&id);
        }
    }

    /// Whether any live watcher observes a write to one of `paths`.
    pub fn has_watchers_for(&self, paths: &[&DocPath]) -> bool {
        self.lock()
            .active
            .values()
            .any(|w| paths.iter().any(|p| w.target.is_affected_by(p)))
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn remove(&self, id: u64) {
        if self.lock().active.remove(&id).is_some() {
            debug!("Subscription {} released", id);
        }
    }
}

/// A live subscription. Dropping it, or calling [`Subscription::cancel`],
/// deregisters it from the store.
pub struct Subscription {
    id: u64,
    target: WatchTarget,
    rx: mpsc::UnboundedReceiver<Snapshot>,
    registry: Weak<WatchRegistry>,
    canceled: bool,
}

impl Subscription {
    /// Wait for the next snapshot. Returns `None` once canceled or once the
    /// store has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if self.canceled {
            return None;
        }
        self.rx.recv().await
    }

    /// The next snapshot if one is already queued.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        if self.canceled {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop receiving snapshots. Queued snapshots are discarded.
    pub fn cancel(&mut self) {
        if self.canceled {
            return;
        }
        self.canceled = true;
        self.rx.close();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
