//! Upgrade orchestration: phased kill/start/replace barriers.
//!
//! An upgrade runs up to three phases concurrently and joins them with a
//! plain AND; failure is carried in the phase's boolean result, never by
//! unwinding:
//!
//! - **kill**: kill a set of existing tasks, wait for that many
//!   `killed` updates
//! - **start**: enqueue fresh launches, wait for that many `running`
//!   updates; a single `failed` update during the phase aborts it
//! - **replace**: roll the surviving old tasks out one-by-one as new
//!   tasks come up, via a single-purpose worker driven by event-bus
//!   subscription
//!
//! The barriers are registered with [`StartupCallbackManager`] and counted
//! down by the engine's status-update dispatch.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use armada_events::{EventBus, EventReceiver, SchedulerEvent, TaskState};
use armada_id::{AppId, DeploymentId, TaskId};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::callbacks::StartupCallbackManager;
use crate::driver::Driver;
use crate::model::{AppDefinition, Task};
use crate::task_queue::TaskQueue;

/// Sequences the kill/start/replace phases of an upgrade. Owned by the
/// engine; scaling exclusion and event emission stay with the engine.
pub struct UpgradeCoordinator {
    driver: Arc<dyn Driver>,
    queue: Arc<TaskQueue>,
    callbacks: Arc<StartupCallbackManager>,
    events: Arc<EventBus>,
}

impl UpgradeCoordinator {
    pub fn new(
        driver: Arc<dyn Driver>,
        queue: Arc<TaskQueue>,
        callbacks: Arc<StartupCallbackManager>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            driver,
            queue,
            callbacks,
            events,
        }
    }

    /// Health-check-aware restart: kill the oldest `total − keep_alive`
    /// immediately, start `app.instances` fresh tasks, and roll the
    /// surviving `keep_alive` out as the new tasks come up.
    pub async fn restart_with_health_checks(
        &self,
        app: &AppDefinition,
        keep_alive: usize,
        tracked: Vec<Task>,
        deployment_id: DeploymentId,
    ) -> bool {
        let mut by_age = tracked;
        by_age.sort_by(|a, b| a.staged_at.cmp(&b.staged_at).then_with(|| a.id.cmp(&b.id)));

        let survivor_count = keep_alive.min(by_age.len());
        let kill_now: Vec<Task> = by_age[..by_age.len() - survivor_count].to_vec();
        let survivors: Vec<Task> = by_age[by_age.len() - survivor_count..].to_vec();

        info!(
            app_id = %app.id,
            deployment_id = %deployment_id,
            killing = kill_now.len(),
            starting = app.instances,
            replacing = survivors.len(),
            "Rolling restart"
        );

        let (killed, started, replaced) = tokio::join!(
            self.kill_phase(&app.id, &kill_now),
            self.start_phase(app, app.instances as usize),
            self.replace_phase(&app.id, survivors),
        );
        killed && started && replaced
    }

    /// Restart without keep-alive: kill everything, start fresh.
    pub async fn immediate_restart(
        &self,
        app: &AppDefinition,
        tracked: Vec<Task>,
        deployment_id: DeploymentId,
    ) -> bool {
        info!(
            app_id = %app.id,
            deployment_id = %deployment_id,
            killing = tracked.len(),
            starting = app.instances,
            "Immediate restart"
        );

        let (killed, started) = tokio::join!(
            self.kill_phase(&app.id, &tracked),
            self.start_phase(app, app.instances as usize),
        );
        killed && started
    }

    /// Kills `tasks` and resolves once that many `killed` updates arrive.
    async fn kill_phase(&self, app_id: &AppId, tasks: &[Task]) -> bool {
        let barrier = self.callbacks.add(app_id, TaskState::Killed, tasks.len());
        for task in tasks {
            if let Err(e) = self.driver.kill_task(&task.id).await {
                warn!(task_id = %task.id, error = %e, "Kill submission failed");
            }
        }
        barrier.await.unwrap_or(false)
    }

    /// Enqueues `count` launches and resolves once that many `running`
    /// updates arrive. One `failed` update during the phase aborts it:
    /// a fresh start that cannot hold its first instances is not going
    /// to converge. Later failures of already-running tasks are ordinary
    /// scaling work.
    async fn start_phase(&self, app: &AppDefinition, count: usize) -> bool {
        let running = self.callbacks.add(&app.id, TaskState::Running, count);
        let failed = self.callbacks.add(&app.id, TaskState::Failed, 1);
        self.queue.add_n(app, count);

        if count == 0 {
            self.callbacks.remove(&app.id, TaskState::Failed);
            return running.await.unwrap_or(false);
        }

        tokio::select! {
            ok = running => {
                self.callbacks.remove(&app.id, TaskState::Failed);
                ok.unwrap_or(false)
            }
            _ = failed => {
                warn!(app_id = %app.id, "Task failed during start phase, aborting");
                self.callbacks.remove(&app.id, TaskState::Running);
                false
            }
        }
    }

    /// Delegates to a one-shot replace worker, or resolves immediately
    /// when there is nothing to replace.
    async fn replace_phase(&self, app_id: &AppId, survivors: Vec<Task>) -> bool {
        if survivors.is_empty() {
            return true;
        }
        let (done_tx, done_rx) = oneshot::channel();
        ReplaceActor::spawn(
            Arc::clone(&self.driver),
            self.events.subscribe(),
            app_id.clone(),
            survivors,
            done_tx,
        );
        done_rx.await.unwrap_or(false)
    }
}

// =============================================================================
// Replace worker
// =============================================================================

/// One-shot rolling-replace worker.
///
/// Watches the event bus for new tasks of the app reaching `running` and
/// retires one survivor (oldest first) per arrival. The survivor set is a
/// snapshot taken before any upgrade kill was issued, so the worker never
/// touches tasks outside it. Resolves `true` once every survivor has been
/// retired.
struct ReplaceActor {
    driver: Arc<dyn Driver>,
    app_id: AppId,
    survivors: VecDeque<Task>,
    survivor_ids: HashSet<TaskId>,
    observed: HashSet<TaskId>,
}

impl ReplaceActor {
    fn spawn(
        driver: Arc<dyn Driver>,
        events: EventReceiver,
        app_id: AppId,
        survivors: Vec<Task>,
        done: oneshot::Sender<bool>,
    ) {
        let mut by_age = survivors;
        by_age.sort_by(|a, b| a.staged_at.cmp(&b.staged_at).then_with(|| a.id.cmp(&b.id)));
        let survivor_ids = by_age.iter().map(|t| t.id.clone()).collect();

        let mut actor = Self {
            driver,
            app_id,
            survivors: by_age.into(),
            survivor_ids,
            observed: HashSet::new(),
        };

        tokio::spawn(async move {
            let ok = actor.run(events).await;
            let _ = done.send(ok);
        });
    }

    async fn run(&mut self, mut events: EventReceiver) -> bool {
        info!(
            app_id = %self.app_id,
            survivors = self.survivors.len(),
            "Replace worker started"
        );

        loop {
            match events.recv().await {
                Ok(SchedulerEvent::TaskStatusUpdate {
                    task_id,
                    app_id,
                    state: TaskState::Running,
                    ..
                }) if app_id == self.app_id => {
                    if self.survivor_ids.contains(&task_id) {
                        continue;
                    }
                    if !self.observed.insert(task_id.clone()) {
                        continue;
                    }
                    debug!(task_id = %task_id, "New task running, retiring one survivor");
                    if let Some(old) = self.survivors.pop_front() {
                        if let Err(e) = self.driver.kill_task(&old.id).await {
                            warn!(task_id = %old.id, error = %e, "Kill submission failed");
                        }
                    }
                    if self.survivors.is_empty() {
                        info!(app_id = %self.app_id, "Replace worker finished");
                        return true;
                    }
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(app_id = %self.app_id, missed, "Replace worker lagged on event bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!(app_id = %self.app_id, "Event bus closed, replace worker aborting");
                    return false;
                }
            }
        }
    }
}
