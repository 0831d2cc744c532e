use std::time::Duration;

use anyhow::Result;

/// Engine configuration, loaded from `ARMADA_*` environment variables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long a task may sit in a pre-running stage before the engine
    /// kills it.
    pub task_launch_timeout: Duration,

    /// Delay between (re)registration and the reconciliation pass.
    pub reconciliation_delay: Duration,

    /// Event bus capacity per subscriber.
    pub event_bus_capacity: usize,

    pub log_level: String,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let task_launch_timeout_secs = std::env::var("ARMADA_TASK_LAUNCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        let reconciliation_delay_secs = std::env::var("ARMADA_RECONCILIATION_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        let event_bus_capacity = std::env::var("ARMADA_EVENT_BUS_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256);

        let log_level = std::env::var("ARMADA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            task_launch_timeout: Duration::from_secs(task_launch_timeout_secs),
            reconciliation_delay: Duration::from_secs(reconciliation_delay_secs),
            event_bus_capacity,
            log_level,
        })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_launch_timeout: Duration::from_secs(300),
            reconciliation_delay: Duration::from_secs(15),
            event_bus_capacity: 256,
            log_level: "info".to_string(),
        }
    }
}
