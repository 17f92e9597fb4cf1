//! Aggregate counter updates across the mirrored collections.
//!
//! Each accepted postback bumps `subs` by one under
//! `{collection}/{uid}/models/{mid}` in every mirror, and replaces `clicks`
//! there when the partner sent a usable value. Mirrors are updated
//! concurrently and independently: no transaction spans both, so one mirror
//! can succeed while the other fails. The outcome is reported per mirror in a
//! [`CounterReport`] and never fails the request.
use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::warn;

use store::RealtimeStore;
use store::path::join;

/// What happened to the `clicks` node in one mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClicksStatus {
    /// The postback carried no `clicks` field.
    Skipped,
    /// `clicks` was replaced with the coerced value.
    Updated,
    /// `clicks` was present but not numeric; nothing was written.
    Invalid,
    /// The write to the store failed.
    Failed,
}

impl ClicksStatus {
    fn is_ok(self) -> bool {
        matches!(self, ClicksStatus::Skipped | ClicksStatus::Updated)
    }
}

/// Per-mirror outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorStatus {
    /// The `subs` transaction committed.
    pub subs: bool,
    pub clicks: ClicksStatus,
}

impl MirrorStatus {
    pub fn is_ok(&self) -> bool {
        self.subs && self.clicks.is_ok()
    }
}

/// Outcome of [`update_counters`], keyed by collection name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CounterReport {
    pub mirrors: BTreeMap<String, MirrorStatus>,
}

impl CounterReport {
    /// True only if every mirror fully succeeded. This is the flat
    /// `subsUpdated` flag of the HTTP response.
    pub fn all_updated(&self) -> bool {
        !self.mirrors.is_empty() && self.mirrors.values().all(MirrorStatus::is_ok)
    }

    /// Collections whose update did not fully succeed.
    pub fn failed_mirrors(&self) -> Vec<&str> {
        self.mirrors
            .iter()
            .filter(|(_, status)| !status.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Next `subs` value given the current node.
///
/// Absent → 1; a number or numeric string → value + 1; anything else is
/// treated as corrupted and reset to 1.
pub fn increment_subs(current: Option<&Value>) -> Value {
    let next = match current {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => return Value::from(i.saturating_add(1)),
            None => n.as_f64().map(|f| f + 1.0),
        },
        Some(Value::String(s)) => parse_finite(s).map(|f| f + 1.0),
        _ => None,
    };
    next.map_or_else(|| Value::from(1), number_value)
}

/// Coerces an untrusted `clicks` value to a JSON number.
///
/// Accepts finite numbers and strings that parse as finite numbers after
/// trimming. Empty strings, `null`, booleans, arrays and objects are
/// rejected.
pub fn coerce_clicks(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::Number(n.clone())),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(number_value),
        Value::String(s) => parse_finite(s).map(number_value),
        _ => None,
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Integral values become JSON integers so `"42"` is stored as `42`.
fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

/// Applies the counter protocol to every mirror concurrently.
///
/// `clicks` is the raw field from the postback, `None` when absent.
pub async fn update_counters(
    store: &dyn RealtimeStore,
    mirrors: &[String],
    uid: &str,
    mid: &str,
    clicks: Option<&Value>,
) -> CounterReport {
    let coerced = clicks.map(coerce_clicks);
    let updates = mirrors
        .iter()
        .map(|collection| update_mirror(store, collection, uid, mid, coerced.as_ref()));
    let results = join_all(updates).await;

    CounterReport {
        mirrors: mirrors.iter().cloned().zip(results).collect(),
    }
}

/// `coerced` is `None` when clicks was absent, `Some(None)` when it was
/// present but not numeric.
async fn update_mirror(
    store: &dyn RealtimeStore,
    collection: &str,
    uid: &str,
    mid: &str,
    coerced: Option<&Option<Value>>,
) -> MirrorStatus {
    let (subs_path, clicks_path) = match (
        join(&[collection, uid, "models", mid, "subs"]),
        join(&[collection, uid, "models", mid, "clicks"]),
    ) {
        (Ok(subs_path), Ok(clicks_path)) => (subs_path, clicks_path),
        (Err(err), _) | (_, Err(err)) => {
            warn!(collection, error = %err, "counter_update_invalid_path");
            return MirrorStatus {
                subs: false,
                clicks: ClicksStatus::Failed,
            };
        }
    };

    let bump = |current: Option<&Value>| Some(increment_subs(current));
    let subs = match store.transaction(&subs_path, &bump).await {
        Ok(result) => result.committed,
        Err(err) => {
            warn!(collection, uid, mid, error = %err, "subs_increment_failed");
            false
        }
    };

    let clicks = match coerced {
        None => ClicksStatus::Skipped,
        Some(None) => {
            warn!(collection, uid, mid, "clicks_not_numeric");
            ClicksStatus::Invalid
        }
        Some(Some(value)) => match store.set(&clicks_path, value.clone()).await {
            Ok(()) => ClicksStatus::Updated,
            Err(err) => {
                warn!(collection, uid, mid, error = %err, "clicks_update_failed");
                ClicksStatus::Failed
            }
        },
    };

    MirrorStatus { subs, clicks }
}
