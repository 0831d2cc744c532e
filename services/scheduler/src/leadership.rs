//! Leadership and framework-identity seams.
//!
//! The engine never owns leader election. On driver disconnect it asks an
//! injected [`LeadershipCoordinator`] to abdicate so a peer can take over;
//! on (re)registration it persists the framework id verbatim through a
//! [`FrameworkIdStore`] so identity survives leader handovers.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use armada_id::FrameworkId;
use async_trait::async_trait;
use tracing::info;

/// The surrounding service's leadership handle.
#[async_trait]
pub trait LeadershipCoordinator: Send + Sync {
    /// Gives up leadership so a peer may take over.
    async fn abdicate(&self);
}

/// A coordinator that only counts abdication requests.
#[derive(Debug, Default)]
pub struct NoopLeadershipCoordinator {
    abdications: AtomicUsize,
}

impl NoopLeadershipCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abdications(&self) -> usize {
        self.abdications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadershipCoordinator for NoopLeadershipCoordinator {
    async fn abdicate(&self) {
        info!("Abdicating leadership");
        self.abdications.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store for the framework registration token.
#[async_trait]
pub trait FrameworkIdStore: Send + Sync {
    /// The persisted framework id, if one was ever stored.
    async fn load(&self) -> Option<FrameworkId>;

    /// Persists the framework id verbatim.
    async fn store(&self, framework_id: FrameworkId);
}

/// In-memory framework-id store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryFrameworkIdStore {
    framework_id: Mutex<Option<FrameworkId>>,
}

impl InMemoryFrameworkIdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FrameworkIdStore for InMemoryFrameworkIdStore {
    async fn load(&self) -> Option<FrameworkId> {
        self.framework_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn store(&self, framework_id: FrameworkId) {
        info!(framework_id = %framework_id, "Storing framework id");
        *self.framework_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(framework_id);
    }
}
