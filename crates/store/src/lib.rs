//! Hierarchical key-value store used by the postback pipeline.
//!
//! The pipeline only needs a handful of primitives from its database, all
//! captured by the [`RealtimeStore`] trait:
//!
//! - point reads with an existence check
//! - unconditional writes at a path
//! - write-if-absent (the conditional write idempotency relies on)
//! - append under a server-generated, time-ordered key
//! - per-node atomic read-modify-write transactions, retried on contention
//! - a server-assigned timestamp placeholder
//!
//! Two backends ship with the crate:
//!
//! | Backend | Type | Use |
//! |---|---|---|
//! | in-memory | [`MemoryStore`] | tests, local development |
//! | Firebase Realtime Database (REST) | [`FirebaseStore`] | production (`backend-firebase` feature) |
//!
//! Backends are selected through [`StoreConfig`]; the process-wide client is
//! obtained once through [`shared`].
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use store::{MemoryStore, RealtimeStore};
//!
//! # tokio_test_block_on(async {
//! let store = MemoryStore::new();
//! assert!(store.set_if_absent("transactions/T1", json!({"uid": "u1"})).await.unwrap());
//! assert!(!store.set_if_absent("transactions/T1", json!({"uid": "u2"})).await.unwrap());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

mod config;
mod error;
#[cfg(feature = "backend-firebase")]
mod firebase;
mod memory;
pub mod path;
pub mod push_id;

pub use crate::config::{StoreBackend, StoreConfig};
pub use crate::error::StoreError;
#[cfg(feature = "backend-firebase")]
pub use crate::firebase::FirebaseStore;
pub use crate::memory::MemoryStore;

/// Outcome of [`RealtimeStore::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult {
    /// False when the update function aborted by returning `None`.
    pub committed: bool,
    /// Value at the node after the transaction.
    pub value: Option<Value>,
}

/// Database primitives consumed by the postback pipeline.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Reads the value at `path`; `None` if nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// True if any value is stored at `path`.
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.get(path).await?.is_some())
    }

    /// Replaces the value at `path`. Writing `null` deletes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Writes `value` only if nothing is stored at `path`, atomically.
    /// Returns false, without writing, when the node already exists.
    async fn set_if_absent(&self, path: &str, value: Value) -> Result<bool, StoreError>;

    /// Stores `value` under a new unique child of `path` and returns its key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Atomically replaces the value at `path` with `update(current)`.
    ///
    /// `update` may run several times under contention and must be pure.
    /// Returning `None` aborts without writing.
    async fn transaction(
        &self,
        path: &str,
        update: &(dyn for<'a> Fn(Option<&'a Value>) -> Option<Value> + Send + Sync),
    ) -> Result<TransactionResult, StoreError>;

    /// Placeholder the backend replaces with its own clock at write time.
    fn server_timestamp(&self) -> Value {
        server_timestamp()
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// The Realtime Database server-value placeholder for "now".
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// True if `value` is the [`server_timestamp`] placeholder.
pub fn is_server_timestamp(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp")
    })
}

static SHARED: OnceCell<Arc<dyn RealtimeStore>> = OnceCell::const_new();

/// Returns the process-wide store, building it from `config` on first use.
///
/// Concurrent first callers wait for a single initialization; later calls
/// return the same client and ignore `config`. A failed initialization is
/// not cached, so the next call tries again.
pub async fn shared(config: &StoreConfig) -> Result<Arc<dyn RealtimeStore>, StoreError> {
    SHARED
        .get_or_try_init(|| async {
            let store = config.build()?;
            tracing::info!(backend = store.name(), "store_initialized");
            Ok::<_, StoreError>(store)
        })
        .await
        .cloned()
}
