//! Backend selection.
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::RealtimeStore;

/// Which store implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local tree. Data is lost on restart.
    #[default]
    Memory,
    /// Firebase Realtime Database over its REST API.
    Firebase,
}

/// Store configuration.
///
/// ```
/// use store::{StoreBackend, StoreConfig};
///
/// let cfg = StoreConfig::firebase("https://demo-default-rtdb.firebaseio.com");
/// assert_eq!(cfg.backend, StoreBackend::Firebase);
/// assert!(cfg.validate().is_ok());
/// assert!(StoreConfig { database_url: None, ..cfg }.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database root, e.g. `https://<project>-default-rtdb.firebaseio.com`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Credential sent as the `auth` query parameter (database secret or ID
    /// token). Requests are unauthenticated when absent.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout against the database.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts before a contended transaction gives up.
    #[serde(default = "default_max_transaction_retries")]
    pub max_transaction_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            auth_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_transaction_retries: default_max_transaction_retries(),
        }
    }
}

impl StoreConfig {
    /// Firebase configuration for the given database URL.
    pub fn firebase<S: Into<String>>(database_url: S) -> Self {
        Self {
            backend: StoreBackend::Firebase,
            database_url: Some(database_url.into()),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_transaction_retries == 0 {
            return Err(StoreError::Config(
                "max_transaction_retries must be at least 1".into(),
            ));
        }
        if self.backend == StoreBackend::Firebase {
            let url = self
                .database_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| {
                    StoreError::Config("database_url is required for the firebase backend".into())
                })?;
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(StoreError::Config(format!(
                    "database_url must be an http(s) URL, got {url:?}"
                )));
            }
        }
        Ok(())
    }

    /// Builds the configured backend.
    pub fn build(&self) -> Result<Arc<dyn RealtimeStore>, StoreError> {
        self.validate()?;
        match self.backend {
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data will not survive a restart");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Firebase => {
                #[cfg(feature = "backend-firebase")]
                {
                    Ok(Arc::new(crate::firebase::FirebaseStore::from_config(self)?))
                }
                #[cfg(not(feature = "backend-firebase"))]
                {
                    Err(StoreError::Config(
                        "firebase backend disabled at compile time".into(),
                    ))
                }
            }
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_transaction_retries() -> u32 {
    25
}
