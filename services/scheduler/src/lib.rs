//! armada Scheduler Library
//!
//! The control core of an offer-based cluster application scheduler. It
//! keeps each application at its declared instance count by matching
//! resource offers against queued launches, reacts to task status
//! transitions, orchestrates health-aware upgrades, and reconciles its
//! in-memory view with the cluster manager after reconnects.
//!
//! ## Architecture
//!
//! ```text
//! SchedulerEngine
//! ├── TaskQueue               (pending launches, FIFO multiset)
//! ├── TaskTracker             (known tasks + status history)
//! ├── RateLimiter             (per-app loss-rescale throttle)
//! ├── StartupCallbackManager  (status-driven upgrade barriers)
//! ├── TaskBuilder             (offer → launch spec, placement seam)
//! └── UpgradeCoordinator      (kill/start/replace phases)
//!     └── ReplaceActor        (one-shot rolling replace worker)
//! ```
//!
//! External collaborators enter through traits: the cluster-manager
//! `Driver`, the `AppRepository`, the `HealthCheckManager`, the
//! `LeadershipCoordinator`, and the `FrameworkIdStore`. The REST layer,
//! persistence, probing, and leader election all live outside this crate.
//!
//! ## Modules
//!
//! - `engine`: the scheduler engine and its driver callbacks
//! - `upgrade`: phased upgrade orchestration
//! - `model`: applications, tasks, offers, launch specs

pub mod callbacks;
pub mod config;
pub mod driver;
pub mod engine;
pub mod health;
pub mod leadership;
pub mod model;
pub mod rate_limiter;
pub mod repository;
pub mod task_builder;
pub mod task_queue;
pub mod task_tracker;
pub mod upgrade;

// Re-export commonly used types
pub use config::SchedulerConfig;
pub use driver::{Driver, DriverCall, MockDriver};
pub use engine::{EngineError, SchedulerEngine};
pub use model::{AppDefinition, AppUpdate, Offer, Resources, Task, TaskStatus};
pub use repository::{AppRepository, InMemoryAppRepository};
