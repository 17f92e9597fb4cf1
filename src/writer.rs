use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use ingest::Identity;
use store::path::join;
use store::{RealtimeStore, StoreError};

/// Where an accepted postback was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Child key under the transactions collection.
    pub key: String,
    /// True when the key is the partner-supplied identifier.
    pub idempotent: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    /// A record already exists under this identifier. Nothing was written.
    #[error("transaction {0:?} already exists")]
    Duplicate(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persists `document` under the transactions collection.
///
/// With an identifier the write is conditional: it only succeeds while
/// `{collection}/{id}` is absent, so a retried postback is rejected rather
/// than overwriting the first one. Without an identifier the document is
/// appended under a fresh time-ordered key.
pub async fn write_transaction(
    store: &dyn RealtimeStore,
    collection: &str,
    identity: &Identity,
    document: Value,
) -> Result<WriteOutcome, WriteError> {
    match identity {
        Identity::Key(id) => {
            let path = join(&[collection, id.as_str()])?;
            if !store.set_if_absent(&path, document).await? {
                info!(collection, key = %id, "duplicate_transaction");
                return Err(WriteError::Duplicate(id.clone()));
            }
            debug!(collection, key = %id, "transaction_written");
            Ok(WriteOutcome {
                key: id.clone(),
                idempotent: true,
            })
        }
        Identity::None => {
            let path = join(&[collection])?;
            let key = store.push(&path, document).await?;
            debug!(collection, key = %key, "transaction_appended");
            Ok(WriteOutcome {
                key,
                idempotent: false,
            })
        }
    }
}
