//! End-to-end scenarios for the scheduler engine.
//!
//! Each test drives the engine the way the driver and control plane
//! would: control calls, offer batches, and status updates, asserting on
//! the recorded driver submissions and emitted events.

mod harness;

use armada_events::{SchedulerEvent, TaskState};
use armada_scheduler::model::{Task, TaskStatus};
use chrono::Utc;
use harness::{app, scheduler, send_status, settle, single_task_offer};

/// Drains every event currently buffered on the receiver.
fn drain(rx: &mut armada_events::EventReceiver) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_start_app_launches_one_task_per_offer() {
    let t = scheduler();
    let a = app("a", 2);

    t.engine.start_app(a.clone()).await.unwrap();
    assert_eq!(t.engine.queue().count(&a.id), 2);

    t.engine
        .resource_offers(vec![single_task_offer("o-1")])
        .await;
    assert_eq!(t.driver.launched().len(), 1);
    assert_eq!(t.engine.queue().count(&a.id), 1);

    t.engine
        .resource_offers(vec![single_task_offer("o-2")])
        .await;
    assert_eq!(t.driver.launched().len(), 2);
    assert_eq!(t.engine.queue().count(&a.id), 0);

    t.engine
        .resource_offers(vec![single_task_offer("o-3")])
        .await;
    assert_eq!(t.driver.launched().len(), 2);
    assert_eq!(t.driver.declined().len(), 1);

    // Both launched tasks carry the app id prefix and distinct ids.
    let launched = t.driver.launched();
    assert!(launched.iter().all(|l| l.task_id.app_id() == &a.id));
    assert_ne!(launched[0].task_id, launched[1].task_id);
}

#[tokio::test]
async fn test_lost_task_is_replaced_through_the_rate_limiter() {
    let t = scheduler();
    let a = app("a", 1);
    t.engine.start_app(a.clone()).await.unwrap();
    t.engine
        .resource_offers(vec![single_task_offer("o-1")])
        .await;
    let task_id = t.driver.launched()[0].task_id.clone();
    send_status(&t.engine, &task_id, TaskState::Running).await;

    let mut events = t.engine.events().subscribe();
    send_status(&t.engine, &task_id, TaskState::Lost).await;
    settle().await;

    // The task is gone and exactly one replacement is queued.
    assert_eq!(t.engine.tracker().count(&a.id).await, 0);
    assert_eq!(t.engine.queue().count(&a.id), 1);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        SchedulerEvent::TaskStatusUpdate {
            state: TaskState::Lost,
            ..
        }
    )));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SchedulerEvent::RestartSuccess { .. })));
}

#[tokio::test]
async fn test_queue_plus_tracker_converges_to_instances() {
    let t = scheduler();
    let a = app("a", 3);
    t.engine.start_app(a.clone()).await.unwrap();

    t.engine
        .resource_offers(vec![single_task_offer("o-1"), single_task_offer("o-2")])
        .await;
    for launch in t.driver.launched() {
        send_status(&t.engine, &launch.task_id, TaskState::Running).await;
    }

    let tracked = t.engine.tracker().count(&a.id).await;
    let queued = t.engine.queue().count(&a.id);
    assert_eq!(tracked + queued, 3);

    // A redundant scale changes nothing.
    t.engine.scale_app(&a).await;
    assert_eq!(
        t.engine.tracker().count(&a.id).await + t.engine.queue().count(&a.id),
        3
    );
}

#[tokio::test]
async fn test_reconcile_expunges_apps_missing_from_repository() {
    let t = scheduler();
    let a = app("a", 1);
    t.engine.start_app(a.clone()).await.unwrap();
    t.engine
        .resource_offers(vec![single_task_offer("o-1")])
        .await;
    let a_task = t.driver.launched()[0].task_id.clone();
    send_status(&t.engine, &a_task, TaskState::Running).await;

    // A tracked app the repository has never heard of.
    let b_id: armada_id::AppId = "b".parse().unwrap();
    let b_task = t.engine.tracker().new_task_id(&b_id);
    t.engine
        .tracker()
        .starting(
            &b_id,
            Task {
                id: b_task.clone(),
                app_id: b_id.clone(),
                host: "node-9".to_string(),
                ports: vec![],
                version: Utc::now().to_rfc3339(),
                staged_at: Utc::now(),
                started_at: Some(Utc::now()),
                statuses: vec![TaskStatus::new(b_task.clone(), TaskState::Running)],
            },
        )
        .await;

    t.engine.reconcile_tasks().await;

    assert!(t.driver.killed().contains(&b_task));
    assert!(!t.engine.tracker().contains(&b_id).await);

    let batches = t.driver.reconciled();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].task_id, a_task);
    assert_eq!(batches[0][0].state, TaskState::Running);
}

#[tokio::test]
async fn test_fatal_driver_error_signals_shutdown_without_driver_calls() {
    let t = scheduler();
    let mut shutdown = t.engine.shutdown_signal();
    assert!(!*shutdown.borrow());

    t.engine.error("Framework has been removed");

    shutdown.changed().await.unwrap();
    assert!(*shutdown.borrow());
    assert!(t.driver.calls().is_empty());
}

#[tokio::test]
async fn test_offer_too_small_requeues_app() {
    let t = scheduler();
    let a = app("a", 1);
    t.engine.start_app(a.clone()).await.unwrap();

    let mut tiny = single_task_offer("o-1");
    tiny.resources.mem = 64.0;
    t.engine.resource_offers(vec![tiny]).await;

    // The offer is declined, the launch stays queued for the next offer.
    assert_eq!(t.driver.declined().len(), 1);
    assert_eq!(t.engine.queue().count(&a.id), 1);

    t.engine
        .resource_offers(vec![single_task_offer("o-2")])
        .await;
    assert_eq!(t.driver.launched().len(), 1);
}

#[tokio::test]
async fn test_first_match_wins_and_skipped_apps_requeue() {
    let t = scheduler();
    // "big" is queued first but does not fit the test offer; "small" does.
    let mut big = app("big", 1);
    big.mem = 8192.0;
    let small = app("small", 1);
    t.engine.start_app(big.clone()).await.unwrap();
    t.engine.start_app(small.clone()).await.unwrap();

    t.engine
        .resource_offers(vec![single_task_offer("o-1")])
        .await;

    let launched = t.driver.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(&launched[0].app_id, &small.id);
    // The skipped app stays queued for the next offer.
    assert_eq!(t.engine.queue().count(&big.id), 1);
    assert_eq!(t.engine.queue().count(&small.id), 0);
}
