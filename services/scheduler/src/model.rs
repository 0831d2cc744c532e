//! Core data model: applications, tasks, offers, and launch specs.
//!
//! An [`AppDefinition`] declares a replicated set of identical tasks. A
//! [`Task`] is one tracked instance of an app on a cluster node. An
//! [`Offer`] is a unit of available resource granted by the cluster
//! manager, and a [`TaskLaunch`] is the launch specification handed back
//! to the driver when an offer is accepted.

use std::collections::HashMap;

use armada_id::{AppId, OfferId, SlaveId, TaskId};
use armada_events::TaskState;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Stamps a version string. Fixed-width RFC 3339 so that lexicographic
/// order matches chronological order.
pub(crate) fn version_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// =============================================================================
// Application definition
// =============================================================================

/// A declared application: the desired set of identical tasks.
///
/// Immutable once stored under a given `version`; updates produce a new
/// definition with a fresh version stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    /// Application identity.
    pub id: AppId,

    /// Desired number of running tasks.
    pub instances: u32,

    /// Monotonic version stamp (RFC 3339).
    pub version: String,

    /// CPU shares required per task.
    pub cpus: f64,

    /// Memory required per task, in MiB.
    pub mem: f64,

    /// Disk required per task, in MiB.
    pub disk: f64,

    /// Shell command to run.
    pub cmd: String,

    /// Container image, if the task runs containerized.
    #[serde(default)]
    pub image: Option<String>,

    /// Placement constraints matched against offer attributes.
    #[serde(default)]
    pub constraints: Vec<Constraint>,

    /// Requested ports; `0` means any offered port.
    #[serde(default)]
    pub ports: Vec<u16>,

    /// Artifact URIs fetched before launch.
    #[serde(default)]
    pub uris: Vec<String>,

    /// Permits per second for loss-triggered rescaling.
    #[serde(default = "default_task_rate_limit")]
    pub task_rate_limit: f64,

    /// Declared health checks. Probing happens outside the core; the
    /// engine only uses presence/absence to pick an upgrade strategy.
    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,
}

fn default_task_rate_limit() -> f64 {
    1.0
}

impl AppDefinition {
    /// Returns a copy stamped with a fresh version.
    pub fn with_version_now(mut self) -> Self {
        self.version = version_now();
        self
    }
}

impl Default for AppDefinition {
    fn default() -> Self {
        Self {
            id: "app".parse().expect("static app id"),
            instances: 1,
            version: version_now(),
            cpus: 1.0,
            mem: 128.0,
            disk: 0.0,
            cmd: String::new(),
            image: None,
            constraints: Vec::new(),
            ports: Vec::new(),
            uris: Vec::new(),
            task_rate_limit: default_task_rate_limit(),
            health_checks: Vec::new(),
        }
    }
}

/// A placement constraint on offer attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Attribute name, or `hostname`.
    pub field: String,

    /// Match operator.
    pub operator: ConstraintOperator,

    /// Operand for `Cluster` and `Like`.
    #[serde(default)]
    pub value: Option<String>,
}

/// Constraint operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOperator {
    /// The attribute must equal `value` exactly.
    Cluster,
    /// The attribute must contain `value` as a substring.
    Like,
}

impl Constraint {
    /// Checks this constraint against an offer's hostname and attributes.
    pub fn matches(&self, hostname: &str, attributes: &HashMap<String, String>) -> bool {
        let actual = if self.field == "hostname" {
            Some(hostname)
        } else {
            attributes.get(&self.field).map(String::as_str)
        };
        let Some(actual) = actual else {
            return false;
        };
        match (self.operator, self.value.as_deref()) {
            (ConstraintOperator::Cluster, Some(want)) => actual == want,
            (ConstraintOperator::Like, Some(want)) => actual.contains(want),
            // A Cluster/Like constraint without an operand matches nothing.
            (_, None) => false,
        }
    }
}

/// A declared health check. The probing subsystem is external; the core
/// carries the declaration through storage and upgrade decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// HTTP path probed on the task.
    pub path: String,

    /// Index into the task's assigned ports.
    #[serde(default)]
    pub port_index: usize,

    /// Seconds between probes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds to wait after launch before the first probe counts.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Consecutive failures after which the task is considered unhealthy.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_grace_period_secs() -> u64 {
    30
}

fn default_max_consecutive_failures() -> u32 {
    3
}

// =============================================================================
// Application update patch
// =============================================================================

/// A partial update to an application definition.
///
/// Absent fields keep their current value. Applying a patch always stamps
/// a fresh version, so an identity patch differs from the original only in
/// its version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppUpdate {
    pub instances: Option<u32>,
    pub cpus: Option<f64>,
    pub mem: Option<f64>,
    pub disk: Option<f64>,
    pub cmd: Option<String>,
    pub image: Option<Option<String>>,
    pub constraints: Option<Vec<Constraint>>,
    pub ports: Option<Vec<u16>>,
    pub uris: Option<Vec<String>>,
    pub task_rate_limit: Option<f64>,
    pub health_checks: Option<Vec<HealthCheck>>,
}

impl AppUpdate {
    /// Applies the patch to a current definition, producing the next
    /// version.
    pub fn apply(&self, current: &AppDefinition) -> AppDefinition {
        AppDefinition {
            id: current.id.clone(),
            instances: self.instances.unwrap_or(current.instances),
            cpus: self.cpus.unwrap_or(current.cpus),
            mem: self.mem.unwrap_or(current.mem),
            disk: self.disk.unwrap_or(current.disk),
            cmd: self.cmd.clone().unwrap_or_else(|| current.cmd.clone()),
            image: self
                .image
                .clone()
                .unwrap_or_else(|| current.image.clone()),
            constraints: self
                .constraints
                .clone()
                .unwrap_or_else(|| current.constraints.clone()),
            ports: self.ports.clone().unwrap_or_else(|| current.ports.clone()),
            uris: self.uris.clone().unwrap_or_else(|| current.uris.clone()),
            task_rate_limit: self.task_rate_limit.unwrap_or(current.task_rate_limit),
            health_checks: self
                .health_checks
                .clone()
                .unwrap_or_else(|| current.health_checks.clone()),
            version: version_now(),
        }
    }
}

// =============================================================================
// Tasks and statuses
// =============================================================================

/// One tracked instance of an application on a cluster node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identity; the prefix encodes `app_id`.
    pub id: TaskId,

    /// Owning application.
    pub app_id: AppId,

    /// Node hostname the task was placed on.
    pub host: String,

    /// Ports assigned from the offer, in request order.
    pub ports: Vec<u16>,

    /// App version this task was launched from.
    pub version: String,

    /// When the launch was recorded.
    pub staged_at: DateTime<Utc>,

    /// When the task was observed running, if it ever was.
    pub started_at: Option<DateTime<Utc>>,

    /// Status history, oldest first.
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
}

impl Task {
    /// True while the task has not yet been observed running.
    pub fn is_staged(&self) -> bool {
        self.started_at.is_none()
    }
}

/// A task status record from the cluster manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub slave_id: Option<SlaveId>,
}

impl TaskStatus {
    /// Shorthand constructor for a bare state transition.
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            slave_id: None,
        }
    }
}

// =============================================================================
// Offers and launches
// =============================================================================

/// Resources carried by an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    /// Inclusive port ranges.
    #[serde(default)]
    pub port_ranges: Vec<(u16, u16)>,
}

/// A resource offer from the cluster manager. Not owned by the core; every
/// offer must be answered with a launch or a decline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub hostname: String,
    pub slave_id: SlaveId,
    pub resources: Resources,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// The launch specification handed to the driver for an accepted offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLaunch {
    pub task_id: TaskId,
    pub app_id: AppId,
    pub slave_id: SlaveId,
    pub host: String,
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub ports: Vec<u16>,
    pub cmd: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> AppDefinition {
        AppDefinition {
            id: id.parse().unwrap(),
            instances: 2,
            cpus: 0.5,
            mem: 256.0,
            cmd: "./run".to_string(),
            ..AppDefinition::default()
        }
    }

    #[test]
    fn test_identity_patch_changes_only_version() {
        let current = app("web");
        let patched = AppUpdate::default().apply(&current);

        assert_ne!(patched.version, current.version);
        assert_eq!(
            AppDefinition {
                version: current.version.clone(),
                ..patched
            },
            current
        );
    }

    #[test]
    fn test_patch_overrides_selected_fields() {
        let current = app("web");
        let patch = AppUpdate {
            instances: Some(5),
            mem: Some(512.0),
            ..AppUpdate::default()
        };

        let patched = patch.apply(&current);
        assert_eq!(patched.instances, 5);
        assert_eq!(patched.mem, 512.0);
        assert_eq!(patched.cpus, current.cpus);
        assert_eq!(patched.cmd, current.cmd);
    }

    #[test]
    fn test_constraint_cluster_matches_attribute() {
        let c = Constraint {
            field: "rack".to_string(),
            operator: ConstraintOperator::Cluster,
            value: Some("r2".to_string()),
        };
        let mut attrs = HashMap::new();
        attrs.insert("rack".to_string(), "r2".to_string());

        assert!(c.matches("node-1", &attrs));
        attrs.insert("rack".to_string(), "r3".to_string());
        assert!(!c.matches("node-1", &attrs));
    }

    #[test]
    fn test_constraint_hostname_like() {
        let c = Constraint {
            field: "hostname".to_string(),
            operator: ConstraintOperator::Like,
            value: Some("dc1".to_string()),
        };
        assert!(c.matches("node-7.dc1", &HashMap::new()));
        assert!(!c.matches("node-7.dc2", &HashMap::new()));
    }

    #[test]
    fn test_constraint_missing_attribute_fails() {
        let c = Constraint {
            field: "zone".to_string(),
            operator: ConstraintOperator::Cluster,
            value: Some("a".to_string()),
        };
        assert!(!c.matches("node-1", &HashMap::new()));
    }

    #[test]
    fn test_task_is_staged_until_started() {
        let app_id: AppId = "web".parse().unwrap();
        let mut task = Task {
            id: TaskId::new(app_id.clone()),
            app_id,
            host: "node-1".to_string(),
            ports: vec![],
            version: version_now(),
            staged_at: Utc::now(),
            started_at: None,
            statuses: vec![],
        };
        assert!(task.is_staged());
        task.started_at = Some(Utc::now());
        assert!(!task.is_staged());
    }
}
