//! Health-check manager contract.
//!
//! Probing lives outside the core. The engine only informs the manager
//! when an app's declared checks change and when an app is torn down.

use std::sync::Mutex;

use armada_id::AppId;
use async_trait::async_trait;
use tracing::debug;

use crate::model::AppDefinition;

/// The health-check subsystem consumed by the engine.
#[async_trait]
pub trait HealthCheckManager: Send + Sync {
    /// Aligns active probes with the app's declared checks.
    async fn reconcile_with(&self, app: &AppDefinition);

    /// Drops every probe for the app.
    async fn remove_all_for(&self, app_id: &AppId);
}

/// A manager that records which apps it was told about and probes nothing.
#[derive(Debug, Default)]
pub struct NoopHealthCheckManager {
    reconciled: Mutex<Vec<AppId>>,
    removed: Mutex<Vec<AppId>>,
}

impl NoopHealthCheckManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apps passed to `reconcile_with`, in call order.
    pub fn reconciled(&self) -> Vec<AppId> {
        self.reconciled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apps passed to `remove_all_for`, in call order.
    pub fn removed(&self) -> Vec<AppId> {
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl HealthCheckManager for NoopHealthCheckManager {
    async fn reconcile_with(&self, app: &AppDefinition) {
        debug!(app_id = %app.id, checks = app.health_checks.len(), "Reconciling health checks");
        self.reconciled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(app.id.clone());
    }

    async fn remove_all_for(&self, app_id: &AppId) {
        debug!(app_id = %app_id, "Removing health checks");
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(app_id.clone());
    }
}
