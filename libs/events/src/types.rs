//! Event type definitions for the scheduler core.
//!
//! Each variant carries the event-specific payload. Events are serialized
//! with a `snake_case` type tag for downstream consumers.

use armada_id::{AppId, ExecutorId, SlaveId, TaskId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Task states
// =============================================================================

/// Task state as reported by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// The launch was accepted and the task is being fetched/staged.
    Staging,
    /// The executor is starting the task.
    Starting,
    /// The task is running.
    Running,
    /// The task exited successfully.
    Finished,
    /// The task exited with an error.
    Failed,
    /// The task was killed on request.
    Killed,
    /// The cluster manager lost track of the task.
    Lost,
}

impl TaskState {
    /// True for states after which the task no longer exists.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Staging => "staging",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the scheduler core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A task changed state, as observed from the cluster manager.
    TaskStatusUpdate {
        task_id: TaskId,
        app_id: AppId,
        state: TaskState,
        slave_id: Option<SlaveId>,
        host: Option<String>,
        ports: Vec<u16>,
        message: Option<String>,
    },

    /// An executor sent an out-of-band message to the framework.
    FrameworkMessage {
        executor_id: ExecutorId,
        slave_id: SlaveId,
        payload: Vec<u8>,
    },

    /// An upgrade/restart for the app completed successfully.
    RestartSuccess { app_id: AppId },

    /// An upgrade/restart for the app failed.
    RestartFailed { app_id: AppId },
}

impl SchedulerEvent {
    /// Stable event kind string, used for logging and routing.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::TaskStatusUpdate { .. } => "task.status_update",
            SchedulerEvent::FrameworkMessage { .. } => "framework.message",
            SchedulerEvent::RestartSuccess { .. } => "restart.success",
            SchedulerEvent::RestartFailed { .. } => "restart.failed",
        }
    }

    /// The app this event concerns, if any.
    pub fn app_id(&self) -> Option<&AppId> {
        match self {
            SchedulerEvent::TaskStatusUpdate { app_id, .. }
            | SchedulerEvent::RestartSuccess { app_id }
            | SchedulerEvent::RestartFailed { app_id } => Some(app_id),
            SchedulerEvent::FrameworkMessage { .. } => None,
        }
    }
}
