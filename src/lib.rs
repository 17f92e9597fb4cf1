//! Idempotent ingestion of partner postbacks.
//!
//! A postback is a partner's server-to-server notification that a conversion
//! happened for a `(uid, mid)` pair. [`Pipeline::process`] takes a normalized
//! [`IncomingEvent`] through the stages below, in order:
//!
//! 1. reject empty payloads and missing or unusable identifiers
//! 2. [`validate_user_and_model`]: the model must exist in every mirror
//! 3. [`write_transaction`]: write-if-absent under the partner's transaction
//!    id, or append under a generated key when there is none
//! 4. [`update_counters`]: bump `subs` and replace `clicks` in every mirror
//!
//! Stages 2 and 3 fail the request. Stage 4 is best-effort and reports per
//! mirror through [`CounterReport`].
//!
//! ```
//! use postback::{Pipeline, PipelineConfig};
//! use postback::ingest::RawPostback;
//! use serde_json::json;
//! use std::sync::Arc;
//! use store::{MemoryStore, RealtimeStore};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.set("publicDashboards/u1/models/m1/subs", json!(0)).await.unwrap();
//! store.set("users/u1/models/m1/subs", json!(0)).await.unwrap();
//!
//! let pipeline = Pipeline::new(store.clone(), PipelineConfig::default()).unwrap();
//! let mut raw = RawPostback::default();
//! raw.query = serde_json::from_value(json!({"uid": "u1", "mid": "m1", "tid": "T1"})).unwrap();
//!
//! let accepted = pipeline.process(&pipeline.normalize(raw)).await.unwrap();
//! assert_eq!(accepted.key, "T1");
//! assert!(accepted.subs_updated());
//! assert_eq!(store.get("users/u1/models/m1/subs").await.unwrap(), Some(json!(1)));
//! # });
//! ```

pub use ingest;
pub use store;

pub mod config;
pub mod counters;
mod validate;
mod writer;

pub use crate::config::{ConfigError, PipelineConfig};
pub use crate::counters::{
    ClicksStatus, CounterReport, MirrorStatus, coerce_clicks, increment_subs, update_counters,
};
pub use crate::validate::validate_user_and_model;
pub use crate::writer::{WriteError, WriteOutcome, write_transaction};

use ingest::{IncomingEvent, RawPostback, normalize_payload, resolve_id};
use store::path::is_valid_key;
use store::{RealtimeStore, StoreError};

use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Reasons a postback is not accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum PostbackError {
    /// Query and body together carried no fields.
    EmptyPayload,
    /// `uid` or `mid` could not be resolved.
    MissingRequiredFields,
    /// An identifier cannot be used as a store key.
    InvalidIdentifier,
    /// The model is missing from at least one mirror, or a lookup failed.
    InvalidUserModel,
    /// A transaction with this identifier was already recorded.
    Duplicate(String),
    /// The primary write failed.
    Store(StoreError),
}

impl fmt::Display for PostbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostbackError::EmptyPayload => write!(f, "empty payload"),
            PostbackError::MissingRequiredFields => write!(f, "missing required fields"),
            PostbackError::InvalidIdentifier => write!(f, "invalid identifier"),
            PostbackError::InvalidUserModel => write!(f, "user/model not found in every mirror"),
            PostbackError::Duplicate(key) => write!(f, "transaction {key:?} already present"),
            PostbackError::Store(err) => write!(f, "store failure: {err}"),
        }
    }
}

impl Error for PostbackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PostbackError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WriteError> for PostbackError {
    fn from(value: WriteError) -> Self {
        match value {
            WriteError::Duplicate(key) => PostbackError::Duplicate(key),
            WriteError::Store(StoreError::InvalidPath(_)) => PostbackError::InvalidIdentifier,
            WriteError::Store(err) => PostbackError::Store(err),
        }
    }
}

impl PostbackError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PostbackError::EmptyPayload => "empty_payload",
            PostbackError::MissingRequiredFields => "missing_required_fields",
            PostbackError::InvalidIdentifier => "invalid_identifier",
            PostbackError::InvalidUserModel => "invalid_user_model",
            PostbackError::Duplicate(_) => "duplicate",
            PostbackError::Store(_) => "store",
        }
    }
}

/// A postback that was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub key: String,
    pub idempotent: bool,
    pub counters: CounterReport,
}

impl Accepted {
    /// True if every mirror's counters were fully updated.
    pub fn subs_updated(&self) -> bool {
        self.counters.all_updated()
    }
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_validation(&self, latency: Duration, valid: bool);
    fn record_write(&self, latency: Duration, result: Result<&WriteOutcome, &PostbackError>);
    fn record_counters(&self, latency: Duration, report: &CounterReport);
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

struct MetricsSpan {
    recorder: Arc<dyn PipelineMetrics>,
    start: Instant,
}

impl MetricsSpan {
    fn start() -> Option<Self> {
        metrics_recorder().map(|recorder| Self {
            recorder,
            start: Instant::now(),
        })
    }

    fn record_validation(self, valid: bool) {
        self.recorder.record_validation(self.start.elapsed(), valid);
    }

    fn record_write(self, result: Result<&WriteOutcome, &PostbackError>) {
        self.recorder.record_write(self.start.elapsed(), result);
    }

    fn record_counters(self, report: &CounterReport) {
        self.recorder.record_counters(self.start.elapsed(), report);
    }
}

/// The validate → write → count sequence over one store.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn RealtimeStore>,
    config: PipelineConfig,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Pipeline {
    pub fn new(store: Arc<dyn RealtimeStore>, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Normalizes a raw request, stamping it with the store's server
    /// timestamp placeholder.
    pub fn normalize(&self, raw: RawPostback) -> IncomingEvent {
        normalize_payload(raw, &self.config.ingest, self.store.server_timestamp())
    }

    /// Validates, stores and counts one postback.
    pub async fn process(&self, event: &IncomingEvent) -> Result<Accepted, PostbackError> {
        if event.is_empty() {
            return Err(PostbackError::EmptyPayload);
        }
        let (Some(uid), Some(mid)) = (event.uid(), event.mid()) else {
            return Err(PostbackError::MissingRequiredFields);
        };
        let identity = resolve_id(event);
        let ids_usable = is_valid_key(&uid)
            && is_valid_key(&mid)
            && identity.as_key().is_none_or(is_valid_key);
        if !ids_usable {
            tracing::info!(uid = %uid, mid = %mid, "postback_invalid_identifier");
            return Err(PostbackError::InvalidIdentifier);
        }

        let mirrors = &self.config.mirror_collections;
        let span = MetricsSpan::start();
        let valid = validate_user_and_model(self.store.as_ref(), mirrors, &uid, &mid).await;
        if let Some(span) = span {
            span.record_validation(valid);
        }
        if !valid {
            tracing::info!(uid = %uid, mid = %mid, "postback_unknown_model");
            return Err(PostbackError::InvalidUserModel);
        }

        let span = MetricsSpan::start();
        let written = write_transaction(
            self.store.as_ref(),
            &self.config.transactions_collection,
            &identity,
            event.to_document(),
        )
        .await
        .map_err(PostbackError::from);
        if let Some(span) = span {
            span.record_write(written.as_ref());
        }
        let WriteOutcome { key, idempotent } = written?;

        let span = MetricsSpan::start();
        let counters =
            update_counters(self.store.as_ref(), mirrors, &uid, &mid, event.clicks()).await;
        if let Some(span) = span {
            span.record_counters(&counters);
        }
        if !counters.all_updated() {
            tracing::warn!(
                key = %key,
                failed = ?counters.failed_mirrors(),
                "counter_update_incomplete"
            );
        }

        tracing::info!(key = %key, idempotent, uid = %uid, mid = %mid, "postback_accepted");
        Ok(Accepted {
            key,
            idempotent,
            counters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use store::MemoryStore;

    fn raw(fields: Value) -> RawPostback {
        RawPostback {
            query: serde_json::from_value(fields).unwrap(),
            ..RawPostback::default()
        }
    }

    async fn seeded_pipeline() -> (Arc<MemoryStore>, Pipeline) {
        let store = Arc::new(MemoryStore::new());
        for collection in ["publicDashboards", "users"] {
            store
                .set(&format!("{collection}/u1/models/m1/subs"), json!(0))
                .await
                .unwrap();
        }
        let pipeline = Pipeline::new(store.clone(), PipelineConfig::default()).unwrap();
        (store, pipeline)
    }

    #[tokio::test]
    async fn rejects_before_touching_the_store() {
        let (store, pipeline) = seeded_pipeline().await;

        let empty = pipeline.normalize(RawPostback::default());
        assert_eq!(pipeline.process(&empty).await, Err(PostbackError::EmptyPayload));

        let missing = pipeline.normalize(raw(json!({"uid": "u1"})));
        assert_eq!(
            pipeline.process(&missing).await,
            Err(PostbackError::MissingRequiredFields)
        );

        let bad = pipeline.normalize(raw(json!({"uid": "u1", "mid": "m1", "tid": "a.b"})));
        assert_eq!(pipeline.process(&bad).await, Err(PostbackError::InvalidIdentifier));

        assert!(!store.exists("transactions").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_model_is_not_written() {
        let (store, pipeline) = seeded_pipeline().await;
        let event = pipeline.normalize(raw(json!({"uid": "u1", "mid": "m9", "tid": "T1"})));
        assert_eq!(
            pipeline.process(&event).await,
            Err(PostbackError::InvalidUserModel)
        );
        assert!(!store.exists("transactions/T1").await.unwrap());
    }

    #[tokio::test]
    async fn stores_document_with_meta() {
        let (store, pipeline) = seeded_pipeline().await;
        let event = pipeline.normalize(raw(json!({"user_id": " u1 ", "model": "m1", "clicks": "3"})));

        let accepted = pipeline.process(&event).await.unwrap();
        assert!(!accepted.idempotent);
        assert!(accepted.subs_updated());

        let stored = store
            .get(&format!("transactions/{}", accepted.key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["uid"], json!("u1"));
        assert_eq!(stored["clicks"], json!("3"));
        assert!(stored["_meta"]["receivedAt"].is_number());
        assert_eq!(
            store.get("users/u1/models/m1").await.unwrap(),
            Some(json!({"subs": 1, "clicks": 3}))
        );
    }

    #[tokio::test]
    async fn duplicate_leaves_counters_alone() {
        let (store, pipeline) = seeded_pipeline().await;
        let event = pipeline.normalize(raw(json!({"uid": "u1", "mid": "m1", "tid": "T1"})));

        pipeline.process(&event).await.unwrap();
        assert_eq!(
            pipeline.process(&event).await,
            Err(PostbackError::Duplicate("T1".into()))
        );
        assert_eq!(
            store.get("publicDashboards/u1/models/m1/subs").await.unwrap(),
            Some(json!(1))
        );
    }
}
