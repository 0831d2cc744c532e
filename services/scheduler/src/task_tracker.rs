//! In-memory index of known tasks, grouped by application.
//!
//! The tracker holds every task the engine believes exists, with its
//! status history and stage markers (`starting`, `running`, `terminated`).
//! All mutating operations are safe under concurrent status updates and
//! scaling calls for the same app.

use std::collections::HashMap;

use armada_id::{AppId, TaskId};
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{Task, TaskStatus};

/// Errors from tracker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// No task with this id is tracked for the app.
    #[error("unknown task {task_id}")]
    UnknownTask { task_id: TaskId },
}

/// Whether a status update referred to a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKnowledge {
    Known,
    Unknown,
}

/// Index of known tasks: `app_id → {task_id → Task}`.
#[derive(Debug, Default)]
pub struct TaskTracker {
    apps: RwLock<HashMap<AppId, HashMap<TaskId, Task>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a unique task id carrying the app id as its prefix.
    pub fn new_task_id(&self, app_id: &AppId) -> TaskId {
        TaskId::new(app_id.clone())
    }

    /// Records launch intent before the driver acknowledges anything.
    pub async fn starting(&self, app_id: &AppId, task: Task) {
        let mut apps = self.apps.write().await;
        apps.entry(app_id.clone())
            .or_default()
            .insert(task.id.clone(), task);
    }

    /// Promotes a starting task to running, appending the status to its
    /// history. Fails if the task is unknown.
    pub async fn running(
        &self,
        app_id: &AppId,
        status: &TaskStatus,
    ) -> Result<Task, TrackerError> {
        let mut apps = self.apps.write().await;
        let task = apps
            .get_mut(app_id)
            .and_then(|tasks| tasks.get_mut(&status.task_id))
            .ok_or_else(|| TrackerError::UnknownTask {
                task_id: status.task_id.clone(),
            })?;

        if task.started_at.is_none() {
            task.started_at = Some(Utc::now());
        }
        task.statuses.push(status.clone());
        Ok(task.clone())
    }

    /// Removes a task on a terminal status. Returns the removed task with
    /// the final status appended, or `None` if it was not tracked.
    pub async fn terminated(&self, app_id: &AppId, status: &TaskStatus) -> Option<Task> {
        let mut apps = self.apps.write().await;
        let tasks = apps.get_mut(app_id)?;
        let mut task = tasks.remove(&status.task_id)?;
        task.statuses.push(status.clone());
        Some(task)
    }

    /// Appends a non-terminal, non-running status to a task's history.
    pub async fn status_update(&self, app_id: &AppId, status: &TaskStatus) -> TaskKnowledge {
        let mut apps = self.apps.write().await;
        match apps
            .get_mut(app_id)
            .and_then(|tasks| tasks.get_mut(&status.task_id))
        {
            Some(task) => {
                task.statuses.push(status.clone());
                TaskKnowledge::Known
            }
            None => TaskKnowledge::Unknown,
        }
    }

    /// Returns tasks that have sat in a pre-running stage longer than the
    /// grace window. The engine is expected to kill these.
    pub async fn check_staged(&self, grace: Duration) -> Vec<Task> {
        let deadline = Utc::now() - grace;
        let apps = self.apps.read().await;
        let stuck: Vec<Task> = apps
            .values()
            .flat_map(|tasks| tasks.values())
            .filter(|t| t.is_staged() && t.staged_at < deadline)
            .cloned()
            .collect();
        if !stuck.is_empty() {
            debug!(count = stuck.len(), "Found tasks stuck in staging");
        }
        stuck
    }

    /// Snapshot of all tasks for an app.
    pub async fn get(&self, app_id: &AppId) -> Vec<Task> {
        let apps = self.apps.read().await;
        apps.get(app_id)
            .map(|tasks| tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tracked tasks for an app.
    pub async fn count(&self, app_id: &AppId) -> usize {
        let apps = self.apps.read().await;
        apps.get(app_id).map(HashMap::len).unwrap_or(0)
    }

    /// Whether any entry exists for the app (even with zero tasks).
    pub async fn contains(&self, app_id: &AppId) -> bool {
        let apps = self.apps.read().await;
        apps.contains_key(app_id)
    }

    /// Selects up to `n` tasks to drain surplus, youngest first, so that
    /// older and likely-healthier tasks survive a scale-down.
    pub async fn take(&self, app_id: &AppId, n: usize) -> Vec<Task> {
        let mut tasks = self.get(app_id).await;
        tasks.sort_by(|a, b| b.staged_at.cmp(&a.staged_at).then_with(|| b.id.cmp(&a.id)));
        tasks.truncate(n);
        tasks
    }

    /// All app ids with a tracker entry.
    pub async fn app_ids(&self) -> Vec<AppId> {
        let apps = self.apps.read().await;
        apps.keys().cloned().collect()
    }

    /// Clears the tasks of an app but keeps its entry.
    pub async fn shutdown(&self, app_id: &AppId) {
        let mut apps = self.apps.write().await;
        if let Some(tasks) = apps.get_mut(app_id) {
            tasks.clear();
        }
    }

    /// Clears the tasks of an app and forgets the entry entirely.
    pub async fn expunge(&self, app_id: &AppId) {
        let mut apps = self.apps.write().await;
        apps.remove(app_id);
    }
}
