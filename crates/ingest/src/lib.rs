//! Postback Ingest Layer
//!
//! This is where partner postbacks enter the system. We take the query
//! string, the (optional) body and a few transport facts, and produce one
//! clean [`IncomingEvent`] that the rest of the pipeline can trust to have a
//! predictable shape.
//!
//! ## What we do here
//!
//! - **Merge** query parameters and body fields (body wins on collisions)
//! - **Trim** every top-level string value
//! - **Resolve identifiers** - `uid`, `mid` and `tid` from the configured
//!   synonym lists, first non-empty value wins
//! - **Stamp receipt metadata** - client IP, user agent, method and a
//!   server-assigned receipt time under `_meta`
//!
//! Normalization never fails. A postback with no usable `uid` simply has
//! `uid: null`; deciding whether that is acceptable is the caller's job.
//!
//! ## Example
//!
//! ```
//! use ingest::{normalize_payload, resolve_id, fields_from_pairs, Identity, IngestConfig, RawPostback};
//! use serde_json::json;
//!
//! let raw = RawPostback {
//!     query: fields_from_pairs(vec![
//!         ("user_id".to_string(), " u1 ".to_string()),
//!         ("model".to_string(), "m1".to_string()),
//!         ("tx_id".to_string(), "T-100".to_string()),
//!     ]),
//!     ..RawPostback::default()
//! };
//!
//! let event = normalize_payload(raw, &IngestConfig::default(), json!(0));
//! assert_eq!(event.uid().as_deref(), Some("u1"));
//! assert_eq!(event.mid().as_deref(), Some("m1"));
//! assert_eq!(resolve_id(&event), Identity::Key("T-100".to_string()));
//! ```
use serde_json::Value;
use tracing::debug;

mod config;
mod error;
mod metadata;
mod payload;
mod types;

use crate::metadata::build_meta;
use crate::types::is_present;

pub use crate::config::{ConfigError, IngestConfig};
pub use crate::error::IngestError;
pub use crate::payload::{decode_body, fields_from_pairs, merge_fields, trim_strings};
pub use crate::types::{
    key_string, FieldMap, Identity, IncomingEvent, RawPostback, RequestContext, RequestMeta,
    CLICKS_FIELD, MID_FIELD, TID_FIELD, UID_FIELD,
};

/// Normalizes a raw postback into an [`IncomingEvent`].
///
/// `received_at` becomes `_meta.receivedAt`; pass the store's server
/// timestamp placeholder so the receipt time is assigned server-side.
pub fn normalize_payload(
    raw: RawPostback,
    cfg: &IngestConfig,
    received_at: Value,
) -> IncomingEvent {
    let RawPostback {
        query,
        body,
        context,
    } = raw;

    let mut fields = merge_fields(query, body);
    // `_meta` is ours; a caller-supplied one is dropped before counting.
    fields.remove(config::META_FIELD);
    let supplied_fields = fields.len();

    trim_strings(&mut fields);

    let uid = first_present(&fields, &cfg.uid_fields);
    let mid = first_present(&fields, &cfg.mid_fields);
    let tid = first_present(&fields, &cfg.tid_fields);
    fields.insert(UID_FIELD.to_string(), uid);
    fields.insert(MID_FIELD.to_string(), mid);
    fields.insert(TID_FIELD.to_string(), tid);

    let meta = build_meta(&context, received_at);

    debug!(
        method = %meta.method,
        supplied_fields,
        has_tid = fields.get(TID_FIELD).is_some_and(is_present),
        "postback_normalized"
    );

    IncomingEvent {
        fields,
        meta,
        supplied_fields,
    }
}

/// Derives the idempotency key for an event.
///
/// Returns [`Identity::Key`] whenever a `tid` synonym carried a present
/// value and [`Identity::None`] otherwise.
pub fn resolve_id(event: &IncomingEvent) -> Identity {
    match event.tid() {
        Some(tid) => Identity::Key(tid),
        None => Identity::None,
    }
}

/// First value among `names` that counts as present, else `null`.
fn first_present(fields: &FieldMap, names: &[String]) -> Value {
    names
        .iter()
        .filter_map(|name| fields.get(name))
        .find(|value| is_present(value))
        .cloned()
        .unwrap_or(Value::Null)
}
