//! Application repository contract and in-memory implementation.
//!
//! The engine never persists definitions itself; it talks to a repository
//! collaborator holding every stored version of every app. The in-memory
//! implementation backs tests and local development, with failure
//! injection for the storage-error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use armada_id::AppId;
use async_trait::async_trait;
use thiserror::Error;

use crate::model::AppDefinition;

/// Errors from repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backing store could not be reached.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Store of application definitions, versioned per app.
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// The most recently stored definition for an app, if any.
    async fn current_version(
        &self,
        app_id: &AppId,
    ) -> Result<Option<AppDefinition>, RepositoryError>;

    /// Persists a definition under its version. `Ok(None)` means the
    /// store rejected the write.
    async fn store(
        &self,
        app: AppDefinition,
    ) -> Result<Option<AppDefinition>, RepositoryError>;

    /// Removes every stored version of an app, returning one success flag
    /// per removed version. An empty result means the app was unknown.
    async fn expunge(&self, app_id: &AppId) -> Result<Vec<bool>, RepositoryError>;

    /// All app ids with at least one stored version.
    async fn all_ids(&self) -> Result<Vec<AppId>, RepositoryError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Debug, Default)]
struct Toggles {
    fail_store: bool,
    fail_expunge: bool,
    fail_all: bool,
}

/// In-memory repository: `app_id → version → definition`.
#[derive(Debug, Default)]
pub struct InMemoryAppRepository {
    apps: Mutex<HashMap<AppId, BTreeMap<String, AppDefinition>>>,
    toggles: Mutex<Toggles>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `store` calls report rejection (`Ok(None)`).
    pub fn reject_stores(&self) {
        self.toggles().fail_store = true;
    }

    /// Makes subsequent `expunge` calls report partial failure.
    pub fn fail_expunges(&self) {
        self.toggles().fail_expunge = true;
    }

    /// Makes every subsequent call fail as unavailable.
    pub fn go_dark(&self) {
        self.toggles().fail_all = true;
    }

    /// Number of stored versions for an app.
    pub fn version_count(&self, app_id: &AppId) -> usize {
        self.lock().get(app_id).map(BTreeMap::len).unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.toggles().fail_all {
            return Err(RepositoryError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<AppId, BTreeMap<String, AppDefinition>>> {
        self.apps.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn toggles(&self) -> std::sync::MutexGuard<'_, Toggles> {
        self.toggles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn current_version(
        &self,
        app_id: &AppId,
    ) -> Result<Option<AppDefinition>, RepositoryError> {
        self.check_available()?;
        let apps = self.lock();
        Ok(apps
            .get(app_id)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn store(
        &self,
        app: AppDefinition,
    ) -> Result<Option<AppDefinition>, RepositoryError> {
        self.check_available()?;
        if self.toggles().fail_store {
            return Ok(None);
        }
        let mut apps = self.lock();
        apps.entry(app.id.clone())
            .or_default()
            .insert(app.version.clone(), app.clone());
        Ok(Some(app))
    }

    async fn expunge(&self, app_id: &AppId) -> Result<Vec<bool>, RepositoryError> {
        self.check_available()?;
        let mut apps = self.lock();
        let Some(versions) = apps.remove(app_id) else {
            return Ok(Vec::new());
        };
        if self.toggles().fail_expunge {
            // First version reported failed, remainder succeeded.
            let mut flags = vec![true; versions.len()];
            if let Some(first) = flags.first_mut() {
                *first = false;
            }
            return Ok(flags);
        }
        Ok(vec![true; versions.len()])
    }

    async fn all_ids(&self) -> Result<Vec<AppId>, RepositoryError> {
        self.check_available()?;
        let apps = self.lock();
        Ok(apps.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, version: &str) -> AppDefinition {
        AppDefinition {
            id: id.parse().unwrap(),
            version: version.to_string(),
            ..AppDefinition::default()
        }
    }

    #[tokio::test]
    async fn test_current_version_returns_latest() {
        let repo = InMemoryAppRepository::new();
        repo.store(app("web", "2024-01-01T00:00:00Z")).await.unwrap();
        repo.store(app("web", "2024-06-01T00:00:00Z")).await.unwrap();

        let current = repo
            .current_version(&"web".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.version, "2024-06-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_expunge_removes_all_versions() {
        let repo = InMemoryAppRepository::new();
        let app_id: AppId = "web".parse().unwrap();
        repo.store(app("web", "v1")).await.unwrap();
        repo.store(app("web", "v2")).await.unwrap();

        let flags = repo.expunge(&app_id).await.unwrap();
        assert_eq!(flags, vec![true, true]);
        assert!(repo.current_version(&app_id).await.unwrap().is_none());

        // Unknown app expunges to an empty flag list.
        assert!(repo.expunge(&app_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let repo = InMemoryAppRepository::new();
        repo.reject_stores();
        assert!(repo.store(app("web", "v1")).await.unwrap().is_none());

        let repo = InMemoryAppRepository::new();
        repo.store(app("web", "v1")).await.unwrap();
        repo.fail_expunges();
        let flags = repo.expunge(&"web".parse().unwrap()).await.unwrap();
        assert!(flags.contains(&false));

        let repo = InMemoryAppRepository::new();
        repo.go_dark();
        assert!(repo.all_ids().await.is_err());
    }
}
