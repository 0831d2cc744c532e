//! Test harness for scheduler integration tests.
//!
//! Builds an engine wired to the recording mock driver and in-memory
//! collaborators, plus helpers for apps, offers, and status updates.

use std::collections::HashMap;
use std::sync::Arc;

use armada_events::TaskState;
use armada_id::TaskId;
use armada_scheduler::config::SchedulerConfig;
use armada_scheduler::driver::MockDriver;
use armada_scheduler::engine::SchedulerEngine;
use armada_scheduler::health::NoopHealthCheckManager;
use armada_scheduler::leadership::{InMemoryFrameworkIdStore, NoopLeadershipCoordinator};
use armada_scheduler::model::{AppDefinition, HealthCheck, Offer, Resources, TaskStatus};
use armada_scheduler::repository::InMemoryAppRepository;

#[allow(dead_code)]
pub struct TestScheduler {
    pub engine: Arc<SchedulerEngine>,
    pub driver: Arc<MockDriver>,
    pub repository: Arc<InMemoryAppRepository>,
    pub health: Arc<NoopHealthCheckManager>,
    pub leadership: Arc<NoopLeadershipCoordinator>,
}

#[allow(dead_code)]
pub fn scheduler() -> TestScheduler {
    let driver = Arc::new(MockDriver::new());
    let repository = Arc::new(InMemoryAppRepository::new());
    let health = Arc::new(NoopHealthCheckManager::new());
    let leadership = Arc::new(NoopLeadershipCoordinator::new());
    let engine = Arc::new(SchedulerEngine::new(
        driver.clone(),
        repository.clone(),
        health.clone(),
        leadership.clone(),
        Arc::new(InMemoryFrameworkIdStore::new()),
        SchedulerConfig::default(),
    ));
    TestScheduler {
        engine,
        driver,
        repository,
        health,
        leadership,
    }
}

#[allow(dead_code)]
pub fn app(id: &str, instances: u32) -> AppDefinition {
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

#[allow(dead_code)]
pub fn app_with_health_checks(id: &str, instances: u32) -> AppDefinition {
    AppDefinition {
        health_checks: vec![HealthCheck {
            path: "/health".to_string(),
            port_index: 0,
            interval_secs: 10,
            grace_period_secs: 30,
            max_consecutive_failures: 3,
        }],
        ..app(id, instances)
    }
}

/// An offer big enough for exactly one standard test task.
#[allow(dead_code)]
pub fn single_task_offer(id: &str) -> Offer {
    Offer {
        id: id.parse().unwrap(),
        hostname: format!("node-{id}"),
        slave_id: "slave-1".parse().unwrap(),
        resources: Resources {
            cpus: 1.0,
            mem: 256.0,
            disk: 1024.0,
            port_ranges: vec![(31000, 31010)],
        },
        attributes: HashMap::new(),
    }
}

/// Delivers one status update for the task.
#[allow(dead_code)]
pub async fn send_status(engine: &Arc<SchedulerEngine>, task_id: &TaskId, state: TaskState) {
    engine
        .status_update(TaskStatus::new(task_id.clone(), state))
        .await;
}

/// Waits for spawned engine work (async scales, upgrade phases) to land.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}
