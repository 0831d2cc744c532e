//! Queue of pending task launches.
//!
//! A FIFO multiset of [`AppDefinition`] entries, one entry per desired
//! launch. The engine drains the whole queue while matching an offer and
//! re-queues whatever it did not launch; drain-vs-drain interleaving is
//! prevented by the engine's offer serialization, not here.

use std::collections::VecDeque;
use std::sync::Mutex;

use armada_id::AppId;

use crate::model::AppDefinition;

/// FIFO of pending launches, keyed by application id.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: Mutex<VecDeque<AppDefinition>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one pending launch.
    pub fn add(&self, app: AppDefinition) {
        self.lock().push_back(app);
    }

    /// Appends `n` pending launches for the same app.
    pub fn add_n(&self, app: &AppDefinition, n: usize) {
        let mut entries = self.lock();
        for _ in 0..n {
            entries.push_back(app.clone());
        }
    }

    /// Appends a batch, preserving its order.
    pub fn add_all(&self, apps: Vec<AppDefinition>) {
        self.lock().extend(apps);
    }

    /// Empties the queue and returns its contents in order. The caller
    /// re-queues any un-launched remainder.
    pub fn remove_all(&self) -> Vec<AppDefinition> {
        self.lock().drain(..).collect()
    }

    /// Number of pending launches for an app.
    pub fn count(&self, app_id: &AppId) -> usize {
        self.lock().iter().filter(|a| &a.id == app_id).count()
    }

    /// Removes every pending launch for an app.
    pub fn purge(&self, app_id: &AppId) {
        self.lock().retain(|a| &a.id != app_id);
    }

    /// Total pending launches across all apps.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AppDefinition>> {
        // Queue operations never panic while holding the lock.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
