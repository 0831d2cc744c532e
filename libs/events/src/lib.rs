//! # armada-events
//!
//! Domain event definitions and the in-process event bus for the armada
//! scheduler.
//!
//! Events are produced by the scheduler engine and consumed by external
//! subscribers (SSE feeds, audit sinks, the upgrade replace worker). The
//! bus is fire-and-forget: publishing never blocks on consumers, and
//! handlers do not feed back into the core.

mod bus;
mod error;
mod types;

pub use bus::{EventBus, EventReceiver};
pub use error::EventError;
pub use types::{SchedulerEvent, TaskState};
