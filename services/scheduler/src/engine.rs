//! The scheduler engine.
//!
//! Top-level controller wiring the queue, tracker, rate limiter, and
//! startup barriers to the external driver. The engine:
//!
//! - Matches incoming resource offers against queued launches
//! - Dispatches task status updates and keeps the tracker consistent
//! - Runs the per-app scaling controller toward `app.instances`
//! - Serves the control API (start/stop/update/upgrade)
//! - Reconciles its in-memory view with the cluster manager
//!
//! ## Concurrency
//!
//! Driver callbacks, control-plane calls, and upgrade phases overlap on
//! distinct tasks. Offer handling is serialized through a dedicated mutex
//! so a queue drain is never interleaved with another drain. Scaling is
//! serialized per app through an on-demand lock map; `scaling_apps`
//! membership (read under the same lock) hands scaling ownership to an
//! in-flight upgrade.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use armada_events::{EventBus, SchedulerEvent, TaskState};
use armada_id::{AppId, DeploymentId, ExecutorId, FrameworkId, OfferId, SlaveId, TaskId};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use crate::callbacks::StartupCallbackManager;
use crate::config::SchedulerConfig;
use crate::driver::{Driver, DriverError};
use crate::health::HealthCheckManager;
use crate::leadership::{FrameworkIdStore, LeadershipCoordinator};
use crate::model::{AppDefinition, AppUpdate, Offer, Task, TaskLaunch, TaskStatus};
use crate::rate_limiter::RateLimiter;
use crate::repository::{AppRepository, RepositoryError};
use crate::task_builder::{ResourceMatcher, TaskBuilder};
use crate::task_queue::TaskQueue;
use crate::task_tracker::{TaskKnowledge, TaskTracker};
use crate::upgrade::UpgradeCoordinator;

/// Delay between a fatal driver error and process exit, giving shutdown
/// hooks time to run.
const FATAL_EXIT_DELAY: Duration = Duration::from_secs(5);

/// Errors surfaced by the control API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("app {0} already exists")]
    AppAlreadyExists(AppId),

    #[error("unknown app {0}")]
    UnknownApp(AppId),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("invalid upgrade for {app_id}: {reason}")]
    InvalidUpgrade { app_id: AppId, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Integration seam invoked after `update_app` persists a new definition.
///
/// The default does nothing: updates persist the definition and reconcile
/// health checks but are not propagated to running tasks.
#[async_trait]
pub trait UpdateHook: Send + Sync {
    async fn on_update(&self, app: &AppDefinition);
}

/// The default, do-nothing update hook.
#[derive(Debug, Default)]
pub struct NoopUpdateHook;

#[async_trait]
impl UpdateHook for NoopUpdateHook {
    async fn on_update(&self, _app: &AppDefinition) {}
}

/// The scheduler engine. See the module docs for responsibilities.
pub struct SchedulerEngine {
    driver: Arc<dyn Driver>,
    repository: Arc<dyn AppRepository>,
    health: Arc<dyn HealthCheckManager>,
    leadership: Arc<dyn LeadershipCoordinator>,
    framework_ids: Arc<dyn FrameworkIdStore>,
    update_hook: Arc<dyn UpdateHook>,
    builder: Arc<dyn TaskBuilder>,
    coordinator: UpgradeCoordinator,

    events: Arc<EventBus>,
    queue: Arc<TaskQueue>,
    tracker: Arc<TaskTracker>,
    rate_limiter: Arc<RateLimiter>,
    callbacks: Arc<StartupCallbackManager>,

    /// Apps whose scaling is currently owned by an upgrade.
    scaling_apps: Mutex<HashSet<AppId>>,

    /// Per-app scale locks, created on demand and retired with the app.
    app_locks: Mutex<HashMap<AppId, Arc<AsyncMutex<()>>>>,

    /// Serializes offer handling: drain, match, and re-queue must not
    /// interleave with another drain.
    offer_lock: AsyncMutex<()>,

    shutdown_tx: watch::Sender<bool>,
    config: SchedulerConfig,
}

impl SchedulerEngine {
    pub fn new(
        driver: Arc<dyn Driver>,
        repository: Arc<dyn AppRepository>,
        health: Arc<dyn HealthCheckManager>,
        leadership: Arc<dyn LeadershipCoordinator>,
        framework_ids: Arc<dyn FrameworkIdStore>,
        config: SchedulerConfig,
    ) -> Self {
        let tracker = Arc::new(TaskTracker::new());
        let queue = Arc::new(TaskQueue::new());
        let callbacks = Arc::new(StartupCallbackManager::new());
        let events = Arc::new(EventBus::new(config.event_bus_capacity));
        let builder: Arc<dyn TaskBuilder> = Arc::new(ResourceMatcher::new(Arc::clone(&tracker)));
        let coordinator = UpgradeCoordinator::new(
            Arc::clone(&driver),
            Arc::clone(&queue),
            Arc::clone(&callbacks),
            Arc::clone(&events),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            driver,
            repository,
            health,
            leadership,
            framework_ids,
            update_hook: Arc::new(NoopUpdateHook),
            builder,
            coordinator,
            events,
            queue,
            tracker,
            rate_limiter: Arc::new(RateLimiter::new()),
            callbacks,
            scaling_apps: Mutex::new(HashSet::new()),
            app_locks: Mutex::new(HashMap::new()),
            offer_lock: AsyncMutex::new(()),
            shutdown_tx,
            config,
        }
    }

    /// Replaces the post-update integration hook.
    pub fn with_update_hook(mut self, hook: Arc<dyn UpdateHook>) -> Self {
        self.update_hook = hook;
        self
    }

    /// Replaces the placement seam.
    pub fn with_task_builder(mut self, builder: Arc<dyn TaskBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Signalled when a fatal driver error forces shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    // =========================================================================
    // Offer handling
    // =========================================================================

    /// Handles a batch of resource offers. Every offer is answered with
    /// exactly one launch or decline before this returns.
    pub async fn resource_offers(&self, offers: Vec<Offer>) {
        let _serial = self.offer_lock.lock().await;

        self.kill_stuck_staging().await;

        for offer in offers {
            if let Err(e) = self.handle_offer(&offer).await {
                warn!(offer_id = %offer.id, error = %e, "Offer handling failed, declining");
                if let Err(e) = self.driver.decline_offer(&offer.id).await {
                    warn!(offer_id = %offer.id, error = %e, "Failed to decline offer");
                }
            }
        }
    }

    /// Kills tasks that exceeded the staging grace window. Best effort,
    /// no retry: the next offer batch will try again.
    async fn kill_stuck_staging(&self) {
        let grace = chrono::Duration::from_std(self.config.task_launch_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        for stuck in self.tracker.check_staged(grace).await {
            warn!(task_id = %stuck.id, "Killing task stuck in staging");
            self.kill_best_effort(&stuck.id).await;
        }
    }

    /// Drains the queue, launches the first matching app on this offer,
    /// and re-queues the rest at the tail in their original order.
    async fn handle_offer(&self, offer: &Offer) -> Result<(), EngineError> {
        let apps = self.queue.remove_all();
        let mut requeue = Vec::with_capacity(apps.len());
        let mut matched: Option<(TaskLaunch, Task)> = None;

        for app in apps {
            if matched.is_some() {
                requeue.push(app);
                continue;
            }
            match self.builder.build_if_matches(&app, offer) {
                Some((launch, ports)) => {
                    let task = Task {
                        id: launch.task_id.clone(),
                        app_id: app.id.clone(),
                        host: offer.hostname.clone(),
                        ports,
                        version: app.version.clone(),
                        staged_at: Utc::now(),
                        started_at: None,
                        statuses: Vec::new(),
                    };
                    matched = Some((launch, task));
                }
                None => requeue.push(app),
            }
        }

        // Re-queue before touching the driver so nothing is lost on error.
        self.queue.add_all(requeue);

        match matched {
            Some((launch, task)) => {
                info!(
                    task_id = %task.id,
                    offer_id = %offer.id,
                    host = %task.host,
                    "Launching task"
                );
                let app_id = task.app_id.clone();
                self.tracker.starting(&app_id, task).await;
                self.driver
                    .launch_tasks(std::slice::from_ref(&offer.id), &[launch])
                    .await?;
                // TODO: launch additional queued tasks on the remainder of
                // this offer instead of waiting for the next one.
            }
            None => {
                debug!(offer_id = %offer.id, "No matching app, declining offer");
                self.driver.decline_offer(&offer.id).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Status updates
    // =========================================================================

    /// Dispatches one task status update from the driver.
    pub async fn status_update(self: &Arc<Self>, status: TaskStatus) {
        let app_id = status.task_id.app_id().clone();
        let state = status.state;
        debug!(task_id = %status.task_id, state = %state, "Status update");

        if state.is_terminal() {
            self.handle_terminal(&app_id, &status).await;
        } else if state == TaskState::Running {
            self.handle_running(&app_id, &status).await;
        } else if state == TaskState::Staging && !self.tracker.contains(&app_id).await {
            warn!(task_id = %status.task_id, "Staging update for unknown app, killing");
            self.kill_best_effort(&status.task_id).await;
        } else if self.tracker.status_update(&app_id, &status).await == TaskKnowledge::Unknown {
            warn!(task_id = %status.task_id, state = %state, "Update for unknown task, killing");
            self.kill_best_effort(&status.task_id).await;
        }

        // Drive any upgrade barriers waiting on this (app, state) pair.
        self.callbacks.countdown(&app_id, state);
    }

    async fn handle_terminal(self: &Arc<Self>, app_id: &AppId, status: &TaskStatus) {
        let removed = self.tracker.terminated(app_id, status).await;
        let (host, ports) = removed
            .map(|t| (Some(t.host), t.ports))
            .unwrap_or((None, Vec::new()));

        info!(
            task_id = %status.task_id,
            state = %status.state,
            "Task terminated"
        );
        self.publish(SchedulerEvent::TaskStatusUpdate {
            task_id: status.task_id.clone(),
            app_id: app_id.clone(),
            state: status.state,
            slave_id: status.slave_id.clone(),
            host,
            ports,
            message: status.message.clone(),
        });

        if self.rate_limiter.try_acquire(app_id) {
            let engine = Arc::clone(self);
            let app_id = app_id.clone();
            tokio::spawn(async move {
                engine.scale_by_id(&app_id).await;
            });
        } else {
            info!(app_id = %app_id, "Rescale throttled by rate limiter");
        }
    }

    async fn handle_running(&self, app_id: &AppId, status: &TaskStatus) {
        match self.tracker.running(app_id, status).await {
            Ok(task) => {
                let posted = self.events.publish(SchedulerEvent::TaskStatusUpdate {
                    task_id: status.task_id.clone(),
                    app_id: app_id.clone(),
                    state: status.state,
                    slave_id: status.slave_id.clone(),
                    host: Some(task.host),
                    ports: task.ports,
                    message: status.message.clone(),
                });
                if let Err(e) = posted {
                    // A task the engine cannot announce is a task it
                    // cannot observe; get rid of it.
                    warn!(task_id = %status.task_id, error = %e, "Event post failed, killing task");
                    self.kill_best_effort(&status.task_id).await;
                }
            }
            Err(e) => {
                warn!(task_id = %status.task_id, error = %e, "Running update rejected, killing");
                self.kill_best_effort(&status.task_id).await;
            }
        }
    }

    // =========================================================================
    // Control API
    // =========================================================================

    /// Creates a new app: persists it, configures its rate limit, scales
    /// it up, and informs the health-check subsystem.
    pub async fn start_app(&self, app: AppDefinition) -> Result<(), EngineError> {
        if self.repository.current_version(&app.id).await?.is_some() {
            return Err(EngineError::AppAlreadyExists(app.id));
        }

        let stored = self
            .repository
            .store(app.clone())
            .await?
            .ok_or_else(|| EngineError::Storage(format!("store rejected app {}", app.id)))?;

        info!(app_id = %stored.id, instances = stored.instances, "Starting app");
        self.rate_limiter
            .set_permits(&stored.id, stored.task_rate_limit);
        self.scale_app(&stored).await;
        self.health.reconcile_with(&stored).await;
        Ok(())
    }

    /// Destroys an app: expunges every stored version, then tears down
    /// health checks, running tasks, queue entries, and tracker state.
    pub async fn stop_app(&self, app: &AppDefinition) -> Result<(), EngineError> {
        info!(app_id = %app.id, "Stopping app");
        let flags = self.repository.expunge(&app.id).await?;
        if flags.iter().any(|ok| !ok) {
            return Err(EngineError::Storage(format!(
                "expunge failed for app {}",
                app.id
            )));
        }

        self.health.remove_all_for(&app.id).await;
        for task in self.tracker.get(&app.id).await {
            self.kill_best_effort(&task.id).await;
        }
        self.queue.purge(&app.id);
        // TODO: defer the tracker cleanup until the kill acknowledgements
        // arrive, so late status updates are not treated as unknown tasks.
        self.tracker.shutdown(&app.id).await;
        self.rate_limiter.remove(&app.id);
        self.retire_app_lock(&app.id);
        Ok(())
    }

    /// Applies a partial update to the current version of an app and
    /// persists the result. The change is not propagated to running
    /// tasks; see [`UpdateHook`].
    pub async fn update_app(
        &self,
        app_id: &AppId,
        update: AppUpdate,
    ) -> Result<AppDefinition, EngineError> {
        let current = self
            .repository
            .current_version(app_id)
            .await?
            .ok_or_else(|| EngineError::UnknownApp(app_id.clone()))?;

        let updated = update.apply(&current);
        self.health.reconcile_with(&updated).await;
        let stored = self
            .repository
            .store(updated)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("store rejected app {app_id}")))?;

        info!(app_id = %app_id, version = %stored.version, "Updated app");
        self.rate_limiter
            .set_permits(&stored.id, stored.task_rate_limit);
        self.update_hook.on_update(&stored).await;
        Ok(stored)
    }

    // =========================================================================
    // Scaling
    // =========================================================================

    /// Converges the app toward `app.instances` under its per-app lock.
    /// A no-op while an upgrade owns the app.
    pub async fn scale_app(&self, app: &AppDefinition) {
        let lock = self.app_lock(&app.id);
        let _guard = lock.lock().await;

        if self.is_scaling(&app.id) {
            info!(app_id = %app.id, "Upgrade in progress, skipping scale");
            return;
        }

        let current = self.tracker.count(&app.id).await;
        let target = app.instances as usize;

        if target > current {
            let queued = self.queue.count(&app.id);
            let to_queue = target.saturating_sub(current + queued);
            if to_queue > 0 {
                info!(
                    app_id = %app.id,
                    current,
                    target,
                    queueing = to_queue,
                    "Scaling up"
                );
                self.queue.add_n(app, to_queue);
            } else {
                debug!(app_id = %app.id, queued, "Launches already queued");
            }
        } else if target < current {
            let surplus = current - target;
            info!(app_id = %app.id, current, target, killing = surplus, "Scaling down");
            self.queue.purge(&app.id);
            for task in self.tracker.take(&app.id, surplus).await {
                self.kill_best_effort(&task.id).await;
            }
        }
    }

    /// Resolves the latest stored version and scales toward it.
    pub async fn scale_by_id(&self, app_id: &AppId) {
        match self.repository.current_version(app_id).await {
            Ok(Some(app)) => self.scale_app(&app).await,
            Ok(None) => warn!(app_id = %app_id, "Scale requested for unknown app"),
            Err(e) => warn!(app_id = %app_id, error = %e, "Failed to load app for scaling"),
        }
    }

    // =========================================================================
    // Upgrades
    // =========================================================================

    /// Replaces the running instances of an app with instances of the
    /// given definition, keeping `keep_alive` existing instances alive
    /// through the transition. Returns whether every phase succeeded.
    pub async fn upgrade_app(
        self: &Arc<Self>,
        app: AppDefinition,
        keep_alive: usize,
    ) -> Result<bool, EngineError> {
        let deployment_id = DeploymentId::new();
        info!(
            app_id = %app.id,
            deployment_id = %deployment_id,
            keep_alive,
            instances = app.instances,
            "Starting upgrade"
        );

        {
            let lock = self.app_lock(&app.id);
            let _guard = lock.lock().await;
            self.set_scaling(&app.id);
        }

        let result = self.run_upgrade(&app, keep_alive, deployment_id).await;

        {
            let lock = self.app_lock(&app.id);
            let _guard = lock.lock().await;
            self.clear_scaling(&app.id);
        }

        match &result {
            Ok(true) => {
                info!(app_id = %app.id, deployment_id = %deployment_id, "Upgrade succeeded");
                self.publish(SchedulerEvent::RestartSuccess {
                    app_id: app.id.clone(),
                });
            }
            Ok(false) => {
                warn!(app_id = %app.id, deployment_id = %deployment_id, "Upgrade failed");
                self.publish(SchedulerEvent::RestartFailed {
                    app_id: app.id.clone(),
                });
            }
            Err(e) => {
                warn!(
                    app_id = %app.id,
                    deployment_id = %deployment_id,
                    error = %e,
                    "Upgrade aborted"
                );
                self.publish(SchedulerEvent::RestartFailed {
                    app_id: app.id.clone(),
                });
            }
        }
        result
    }

    async fn run_upgrade(
        &self,
        app: &AppDefinition,
        keep_alive: usize,
        deployment_id: DeploymentId,
    ) -> Result<bool, EngineError> {
        let stored = self
            .repository
            .store(app.clone())
            .await?
            .ok_or_else(|| EngineError::Storage(format!("store rejected app {}", app.id)))?;

        // Snapshot before any kill is issued: the surviving-set guarantee
        // of the replace phase depends on it.
        let tracked = self.tracker.get(&stored.id).await;

        if !stored.health_checks.is_empty() && keep_alive > 0 {
            Ok(self
                .coordinator
                .restart_with_health_checks(&stored, keep_alive, tracked, deployment_id)
                .await)
        } else if keep_alive == 0 {
            Ok(self
                .coordinator
                .immediate_restart(&stored, tracked, deployment_id)
                .await)
        } else {
            Err(EngineError::InvalidUpgrade {
                app_id: stored.id.clone(),
                reason: "keep-alive requires declared health checks".to_string(),
            })
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Realigns the in-memory view with the cluster manager: re-scales
    /// every stored app, kills and expunges apps the repository no longer
    /// knows, and submits the latest known statuses for reconciliation.
    pub async fn reconcile_tasks(&self) {
        let ids = match self.repository.all_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Reconciliation skipped: repository enumeration failed");
                return;
            }
        };
        let known: HashSet<AppId> = ids.iter().cloned().collect();

        let mut statuses = Vec::new();
        for app_id in &ids {
            self.scale_by_id(app_id).await;
            for task in self.tracker.get(app_id).await {
                if let Some(status) = task.statuses.last() {
                    statuses.push(status.clone());
                }
            }
        }

        for app_id in self.tracker.app_ids().await {
            if !known.contains(&app_id) {
                warn!(app_id = %app_id, "Tracked app missing from repository, expunging");
                for task in self.tracker.get(&app_id).await {
                    self.kill_best_effort(&task.id).await;
                }
                self.tracker.expunge(&app_id).await;
            }
        }

        info!(apps = ids.len(), statuses = statuses.len(), "Submitting task reconciliation");
        if let Err(e) = self.driver.reconcile_tasks(&statuses).await {
            warn!(error = %e, "Task reconciliation submission failed");
        }
    }

    // =========================================================================
    // Remaining driver callbacks
    // =========================================================================

    /// First registration with the cluster manager.
    pub async fn registered(self: &Arc<Self>, framework_id: FrameworkId) {
        info!(framework_id = %framework_id, "Registered with cluster manager");
        self.framework_ids.store(framework_id).await;
        self.schedule_reconciliation();
    }

    /// Re-registration after a disconnect; identity is preserved.
    pub async fn reregistered(self: &Arc<Self>, framework_id: FrameworkId) {
        info!(framework_id = %framework_id, "Re-registered with cluster manager");
        self.framework_ids.store(framework_id).await;
        self.schedule_reconciliation();
    }

    fn schedule_reconciliation(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let delay = self.config.reconciliation_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.reconcile_tasks().await;
        });
    }

    pub fn offer_rescinded(&self, offer_id: &OfferId) {
        info!(offer_id = %offer_id, "Offer rescinded");
    }

    /// Out-of-band message from an executor; forwarded to the event bus.
    pub fn framework_message(&self, executor_id: ExecutorId, slave_id: SlaveId, payload: Vec<u8>) {
        debug!(executor_id = %executor_id, bytes = payload.len(), "Framework message");
        self.publish(SchedulerEvent::FrameworkMessage {
            executor_id,
            slave_id,
            payload,
        });
    }

    /// The driver lost its connection. The surrounding service abdicates
    /// leadership; no further driver calls are made until re-registration.
    pub async fn disconnected(&self) {
        warn!("Disconnected from cluster manager");
        self.leadership.abdicate().await;
    }

    pub fn slave_lost(&self, slave_id: &SlaveId) {
        info!(slave_id = %slave_id, "Slave lost");
    }

    pub fn executor_lost(&self, executor_id: &ExecutorId, slave_id: &SlaveId) {
        info!(executor_id = %executor_id, slave_id = %slave_id, "Executor lost");
    }

    /// A fatal driver error: this framework is no longer valid. Signals
    /// shutdown and schedules process exit off the driver thread so
    /// shutdown hooks can run.
    pub fn error(&self, message: &str) {
        error!(error = %message, "Fatal driver error, scheduling shutdown");
        let _ = self.shutdown_tx.send(true);
        self.events.close();
        tokio::spawn(async {
            tokio::time::sleep(FATAL_EXIT_DELAY).await;
            std::process::exit(1);
        });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn kill_best_effort(&self, task_id: &TaskId) {
        if let Err(e) = self.driver.kill_task(task_id).await {
            warn!(task_id = %task_id, error = %e, "Kill submission failed");
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        if let Err(e) = self.events.publish(event) {
            warn!(error = %e, "Event post failed");
        }
    }

    fn app_lock(&self, app_id: &AppId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.app_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(app_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn retire_app_lock(&self, app_id: &AppId) {
        let mut locks = self.app_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(app_id);
    }

    fn is_scaling(&self, app_id: &AppId) -> bool {
        self.scaling_apps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(app_id)
    }

    fn set_scaling(&self, app_id: &AppId) {
        self.scaling_apps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(app_id.clone());
    }

    fn clear_scaling(&self, app_id: &AppId) {
        self.scaling_apps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(app_id);
    }

    /// Apps currently owned by an upgrade.
    pub fn scaling_apps(&self) -> Vec<AppId> {
        self.scaling_apps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::health::NoopHealthCheckManager;
    use crate::leadership::{
        FrameworkIdStore, InMemoryFrameworkIdStore, NoopLeadershipCoordinator,
    };
    use crate::model::Resources;
    use crate::repository::InMemoryAppRepository;

    struct Harness {
        engine: Arc<SchedulerEngine>,
        driver: Arc<MockDriver>,
        repository: Arc<InMemoryAppRepository>,
        health: Arc<NoopHealthCheckManager>,
        leadership: Arc<NoopLeadershipCoordinator>,
        framework_ids: Arc<InMemoryFrameworkIdStore>,
    }

    fn harness() -> Harness {
        let driver = Arc::new(MockDriver::new());
        let repository = Arc::new(InMemoryAppRepository::new());
        let health = Arc::new(NoopHealthCheckManager::new());
        let leadership = Arc::new(NoopLeadershipCoordinator::new());
        let framework_ids = Arc::new(InMemoryFrameworkIdStore::new());
        let engine = Arc::new(SchedulerEngine::new(
            driver.clone(),
            repository.clone(),
            health.clone(),
            leadership.clone(),
            framework_ids.clone(),
            SchedulerConfig::default(),
        ));
        Harness {
            engine,
            driver,
            repository,
            health,
            leadership,
            framework_ids,
        }
    }

    fn app(id: &str, instances: u32) -> AppDefinition {
        AppDefinition {
            id: id.parse().unwrap(),
            instances,
            cpus: 1.0,
            mem: 256.0,
            disk: 0.0,
            cmd: "./run".to_string(),
            ..AppDefinition::default()
        }
    }

    fn offer(id: &str) -> Offer {
        Offer {
            id: id.parse().unwrap(),
            hostname: "node-1".to_string(),
            slave_id: "slave-1".parse().unwrap(),
            resources: Resources {
                cpus: 4.0,
                mem: 4096.0,
                disk: 10240.0,
                port_ranges: vec![(31000, 32000)],
            },
            attributes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_queue_declines_every_offer() {
        let h = harness();

        h.engine
            .resource_offers(vec![offer("o-1"), offer("o-2")])
            .await;

        assert_eq!(h.driver.declined().len(), 2);
        assert!(h.driver.launched().is_empty());
    }

    #[tokio::test]
    async fn test_empty_offer_batch_makes_no_driver_calls() {
        let h = harness();
        h.engine.resource_offers(Vec::new()).await;
        assert!(h.driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_each_offer_answered_exactly_once() {
        let h = harness();
        h.engine.start_app(app("web", 1)).await.unwrap();

        h.engine
            .resource_offers(vec![offer("o-1"), offer("o-2"), offer("o-3")])
            .await;

        // One launch for the single queued task, declines for the rest.
        assert_eq!(h.driver.launched().len(), 1);
        assert_eq!(h.driver.declined().len(), 2);
        assert_eq!(h.driver.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_start_app_twice_fails() {
        let h = harness();
        h.engine.start_app(app("web", 1)).await.unwrap();

        let result = h.engine.start_app(app("web", 2)).await;
        assert!(matches!(result, Err(EngineError::AppAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_start_app_store_rejection_surfaces() {
        let h = harness();
        h.repository.reject_stores();

        let result = h.engine.start_app(app("web", 1)).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
    }

    #[tokio::test]
    async fn test_stop_app_tears_everything_down() {
        let h = harness();
        let web = app("web", 2);
        h.engine.start_app(web.clone()).await.unwrap();
        h.engine.resource_offers(vec![offer("o-1")]).await;
        assert_eq!(h.engine.tracker().count(&web.id).await, 1);

        h.engine.stop_app(&web).await.unwrap();

        assert!(h.repository.current_version(&web.id).await.unwrap().is_none());
        assert_eq!(h.engine.queue().count(&web.id), 0);
        assert_eq!(h.engine.tracker().count(&web.id).await, 0);
        assert_eq!(h.driver.killed().len(), 1);
        assert_eq!(h.health.removed(), vec![web.id.clone()]);
    }

    #[tokio::test]
    async fn test_stop_app_partial_expunge_fails() {
        let h = harness();
        let web = app("web", 1);
        h.engine.start_app(web.clone()).await.unwrap();
        h.repository.fail_expunges();

        let result = h.engine.stop_app(&web).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
    }

    #[tokio::test]
    async fn test_update_app_unknown_fails() {
        let h = harness();
        let result = h
            .engine
            .update_app(&"ghost".parse().unwrap(), AppUpdate::default())
            .await;
        assert!(matches!(result, Err(EngineError::UnknownApp(_))));
    }

    #[tokio::test]
    async fn test_update_app_identity_patch_keeps_definition() {
        let h = harness();
        let web = app("web", 2);
        h.engine.start_app(web.clone()).await.unwrap();

        let updated = h
            .engine
            .update_app(&web.id, AppUpdate::default())
            .await
            .unwrap();

        let current = h
            .repository
            .current_version(&web.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current, updated);
        assert_ne!(current.version, web.version);
        assert_eq!(current.instances, web.instances);
    }

    #[tokio::test]
    async fn test_scale_is_noop_while_upgrade_owns_app() {
        let h = harness();
        let web = app("web", 3);
        h.engine.start_app(web.clone()).await.unwrap();
        // start_app queued 3 launches; drop them to observe scale's work.
        h.engine.queue().purge(&web.id);

        h.engine.set_scaling(&web.id);
        h.engine.scale_app(&web).await;
        assert_eq!(h.engine.queue().count(&web.id), 0);

        h.engine.clear_scaling(&web.id);
        h.engine.scale_app(&web).await;
        assert_eq!(h.engine.queue().count(&web.id), 3);
    }

    #[tokio::test]
    async fn test_scale_does_not_queue_past_target() {
        let h = harness();
        let web = app("web", 2);
        h.engine.start_app(web.clone()).await.unwrap();
        assert_eq!(h.engine.queue().count(&web.id), 2);

        // Launches already queued; a second scale must not double up.
        h.engine.scale_app(&web).await;
        assert_eq!(h.engine.queue().count(&web.id), 2);
    }

    #[tokio::test]
    async fn test_scale_to_zero_kills_everything_and_purges() {
        let h = harness();
        let mut web = app("web", 2);
        h.engine.start_app(web.clone()).await.unwrap();
        h.engine
            .resource_offers(vec![offer("o-1"), offer("o-2")])
            .await;
        assert_eq!(h.engine.tracker().count(&web.id).await, 2);

        web.instances = 0;
        h.engine.scale_app(&web).await;

        assert_eq!(h.driver.killed().len(), 2);
        assert_eq!(h.engine.queue().count(&web.id), 0);
    }

    #[tokio::test]
    async fn test_status_update_for_unknown_task_kills_it() {
        let h = harness();
        h.engine.start_app(app("web", 1)).await.unwrap();

        let stray = TaskId::new("web".parse().unwrap());
        h.engine
            .status_update(TaskStatus::new(stray.clone(), TaskState::Starting))
            .await;

        assert_eq!(h.driver.killed(), vec![stray]);
    }

    #[tokio::test]
    async fn test_staging_update_for_unknown_app_kills_it() {
        let h = harness();
        let stray = TaskId::new("ghost".parse().unwrap());

        h.engine
            .status_update(TaskStatus::new(stray.clone(), TaskState::Staging))
            .await;

        assert_eq!(h.driver.killed(), vec![stray]);
    }

    #[tokio::test]
    async fn test_running_update_promotes_and_emits() {
        let h = harness();
        let web = app("web", 1);
        h.engine.start_app(web.clone()).await.unwrap();
        h.engine.resource_offers(vec![offer("o-1")]).await;
        let task_id = h.driver.launched()[0].task_id.clone();

        let mut events = h.engine.events().subscribe();
        h.engine
            .status_update(TaskStatus::new(task_id.clone(), TaskState::Running))
            .await;

        let tracked = h.engine.tracker().get(&web.id).await;
        assert!(tracked[0].started_at.is_some());
        match events.recv().await.unwrap() {
            SchedulerEvent::TaskStatusUpdate { task_id: id, state, host, .. } => {
                assert_eq!(id, task_id);
                assert_eq!(state, TaskState::Running);
                assert_eq!(host.as_deref(), Some("node-1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registration_persists_framework_id() {
        let h = harness();
        let framework_id: FrameworkId = "framework-7f2a".parse().unwrap();

        h.engine.registered(framework_id.clone()).await;
        assert_eq!(h.framework_ids.load().await, Some(framework_id.clone()));

        // Re-registration stores the same identity again.
        h.engine.reregistered(framework_id.clone()).await;
        assert_eq!(h.framework_ids.load().await, Some(framework_id));
    }

    #[tokio::test]
    async fn test_disconnect_abdicates_leadership() {
        let h = harness();
        h.engine.disconnected().await;
        assert_eq!(h.leadership.abdications(), 1);
    }

    #[tokio::test]
    async fn test_framework_message_is_forwarded_to_bus() {
        let h = harness();
        let mut events = h.engine.events().subscribe();

        h.engine.framework_message(
            "executor-1".parse().unwrap(),
            "slave-1".parse().unwrap(),
            b"ping".to_vec(),
        );

        match events.recv().await.unwrap() {
            SchedulerEvent::FrameworkMessage { payload, .. } => {
                assert_eq!(payload, b"ping".to_vec());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reconcile_skipped_when_repository_dark() {
        let h = harness();
        h.repository.go_dark();
        h.engine.reconcile_tasks().await;
        assert!(h.driver.reconciled().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let h = harness();
        let web = app("web", 2);
        h.engine.start_app(web.clone()).await.unwrap();

        h.engine.reconcile_tasks().await;
        let queued = h.engine.queue().count(&web.id);
        h.engine.reconcile_tasks().await;

        assert_eq!(h.engine.queue().count(&web.id), queued);
        let batches = h.driver.reconciled();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], batches[1]);
    }
}
