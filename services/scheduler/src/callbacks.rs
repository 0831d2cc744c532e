//! Startup barriers driven by task status updates.
//!
//! Upgrade phases wait for "n tasks reached state s for app a" without
//! polling: they register a barrier here and the engine counts every
//! status update down against it. Completion is delivered through a
//! one-shot channel, so each barrier resolves exactly once: the channel
//! itself is the Pending/Resolved state machine, and cancelling an
//! already-resolved barrier is a no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use armada_id::AppId;
use armada_events::TaskState;
use tokio::sync::oneshot;
use tracing::debug;

/// One pending barrier: `remaining` matching updates until completion.
#[derive(Debug)]
struct Barrier {
    remaining: usize,
    done: oneshot::Sender<bool>,
}

/// Registry of pending barriers keyed by `(app_id, awaited task state)`.
///
/// Multiple barriers may be registered for the same key; all are driven by
/// the same countdown stream.
#[derive(Debug, Default)]
pub struct StartupCallbackManager {
    barriers: Mutex<HashMap<(AppId, TaskState), Vec<Barrier>>>,
}

impl StartupCallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a barrier that resolves `true` after `count` matching
    /// updates, or `false` if it is removed first. A zero count resolves
    /// immediately.
    pub fn add(&self, app_id: &AppId, state: TaskState, count: usize) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        if count == 0 {
            let _ = tx.send(true);
            return rx;
        }
        let mut barriers = self.lock();
        barriers
            .entry((app_id.clone(), state))
            .or_default()
            .push(Barrier {
                remaining: count,
                done: tx,
            });
        rx
    }

    /// Decrements every barrier for `(app_id, state)` by one and resolves
    /// those that reach zero.
    pub fn countdown(&self, app_id: &AppId, state: TaskState) {
        let mut barriers = self.lock();
        let key = (app_id.clone(), state);
        let Some(pending) = barriers.get_mut(&key) else {
            return;
        };

        let mut still_pending = Vec::with_capacity(pending.len());
        for mut barrier in pending.drain(..) {
            barrier.remaining -= 1;
            if barrier.remaining == 0 {
                let _ = barrier.done.send(true);
            } else {
                still_pending.push(barrier);
            }
        }
        *pending = still_pending;

        if pending.is_empty() {
            barriers.remove(&key);
        }
    }

    /// Cancels every barrier for `(app_id, state)`, resolving them `false`.
    pub fn remove(&self, app_id: &AppId, state: TaskState) {
        let mut barriers = self.lock();
        if let Some(pending) = barriers.remove(&(app_id.clone(), state)) {
            debug!(app_id = %app_id, state = %state, count = pending.len(), "Cancelling barriers");
            for barrier in pending {
                let _ = barrier.done.send(false);
            }
        }
    }

    /// Number of pending barriers across all keys.
    pub fn pending(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(AppId, TaskState), Vec<Barrier>>> {
        self.barriers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
