//! Application state management.

use anyhow::Context;
use rentora_auth::{FileStore, KeyValueStore, SessionManager};
use rentora_core::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Process-wide state shared by every command.
pub struct AppState {
    /// Effective configuration
    pub config: AppConfig,

    /// File backing the persistent session store
    pub store_path: PathBuf,

    /// The one session manager for this process
    pub session: SessionManager,
}

impl AppState {
    /// Open the session store named by `config` and build the manager.
    ///
    /// The manager is not initialized; call [`SessionManager::initialize`]
    /// from inside the runtime.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store_path = config
            .storage_path()
            .context("failed to resolve session store path")?;
        let store = FileStore::open(&store_path)
            .with_context(|| format!("failed to open session store {}", store_path.display()))?;

        tracing::info!("Session store: {}", store_path.display());

        Self::with_store(config, store_path, Arc::new(store))
    }

    /// Build state over an explicit store.
    pub fn with_store(
        config: AppConfig,
        store_path: PathBuf,
        store: Arc<dyn KeyValueStore>,
    ) -> anyhow::Result<Self> {
        let session =
            SessionManager::from_config(&config, store).context("failed to build session manager")?;

        Ok(Self {
            config,
            store_path,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_uses_configured_store_path() {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.path = Some(tmp.path().join("session.json"));

        let state = AppState::new(config).unwrap();
        assert_eq!(state.store_path, tmp.path().join("session.json"));
        assert!(!state.session.is_authenticated());
    }
}
