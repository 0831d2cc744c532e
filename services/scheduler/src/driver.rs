//! Driver interface and mock implementation.
//!
//! The driver is the client library representing the cluster manager to
//! this framework. All calls are non-blocking submissions with
//! best-effort delivery; the cluster manager remains authoritative for
//! what actually launched.
//!
//! A recording mock is provided for tests and local development.

use std::sync::Mutex;

use armada_id::{OfferId, TaskId};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{TaskLaunch, TaskStatus};

/// Errors from driver submissions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver is not connected to the cluster manager.
    #[error("driver disconnected")]
    Disconnected,

    /// The submission was rejected.
    #[error("driver rejected call: {0}")]
    Rejected(String),
}

/// The cluster-manager driver consumed by the engine.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Launches tasks against the given offers.
    async fn launch_tasks(
        &self,
        offer_ids: &[OfferId],
        tasks: &[TaskLaunch],
    ) -> Result<(), DriverError>;

    /// Declines an offer without using it.
    async fn decline_offer(&self, offer_id: &OfferId) -> Result<(), DriverError>;

    /// Requests that a task be killed.
    async fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError>;

    /// Submits known statuses for explicit reconciliation.
    async fn reconcile_tasks(&self, statuses: &[TaskStatus]) -> Result<(), DriverError>;
}

// =============================================================================
// Mock driver
// =============================================================================

/// One recorded driver submission.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Launch {
        offer_ids: Vec<OfferId>,
        tasks: Vec<TaskLaunch>,
    },
    Decline {
        offer_id: OfferId,
    },
    Kill {
        task_id: TaskId,
    },
    Reconcile {
        statuses: Vec<TaskStatus>,
    },
}

/// Recording driver for tests and local development.
#[derive(Debug, Default)]
pub struct MockDriver {
    calls: Mutex<Vec<DriverCall>>,
    fail_all: bool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose every submission fails as disconnected.
    pub fn disconnected() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_all: true,
        }
    }

    /// Snapshot of every recorded call, in submission order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().clone()
    }

    /// Task launches recorded so far.
    pub fn launched(&self) -> Vec<TaskLaunch> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Launch { tasks, .. } => Some(tasks.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Offer ids declined so far.
    pub fn declined(&self) -> Vec<OfferId> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Decline { offer_id } => Some(offer_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Task ids killed so far.
    pub fn killed(&self) -> Vec<TaskId> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Kill { task_id } => Some(task_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reconciliation batches submitted so far.
    pub fn reconciled(&self) -> Vec<Vec<TaskStatus>> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Reconcile { statuses } => Some(statuses.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DriverCall) -> Result<(), DriverError> {
        if self.fail_all {
            return Err(DriverError::Disconnected);
        }
        self.lock().push(call);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DriverCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn launch_tasks(
        &self,
        offer_ids: &[OfferId],
        tasks: &[TaskLaunch],
    ) -> Result<(), DriverError> {
        info!(
            offers = offer_ids.len(),
            tasks = tasks.len(),
            "[MOCK] Launching tasks"
        );
        self.record(DriverCall::Launch {
            offer_ids: offer_ids.to_vec(),
            tasks: tasks.to_vec(),
        })
    }

    async fn decline_offer(&self, offer_id: &OfferId) -> Result<(), DriverError> {
        debug!(offer_id = %offer_id, "[MOCK] Declining offer");
        self.record(DriverCall::Decline {
            offer_id: offer_id.clone(),
        })
    }

    async fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError> {
        info!(task_id = %task_id, "[MOCK] Killing task");
        self.record(DriverCall::Kill {
            task_id: task_id.clone(),
        })
    }

    async fn reconcile_tasks(&self, statuses: &[TaskStatus]) -> Result<(), DriverError> {
        debug!(count = statuses.len(), "[MOCK] Reconciling tasks");
        self.record(DriverCall::Reconcile {
            statuses: statuses.to_vec(),
        })
    }
}
