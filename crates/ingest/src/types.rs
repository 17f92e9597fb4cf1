//! Core data types for postback ingestion.
//!
//! A request enters as a [`RawPostback`] (query pairs, an optional decoded
//! body and the transport-level [`RequestContext`]) and leaves normalization
//! as an [`IncomingEvent`]: one flat field map with the canonical `uid`, `mid`
//! and `tid` fields filled in and a [`RequestMeta`] block attached.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::META_FIELD;

/// Untrusted field map as merged from query parameters and body.
pub type FieldMap = Map<String, Value>;

/// Canonical field name for the subject identifier.
pub const UID_FIELD: &str = "uid";
/// Canonical field name for the referenced model identifier.
pub const MID_FIELD: &str = "mid";
/// Canonical field name for the partner transaction identifier.
pub const TID_FIELD: &str = "tid";
/// Optional click counter carried by some partners.
pub const CLICKS_FIELD: &str = "clicks";

/// Transport facts about the request that produced a postback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// HTTP method, upper case (`GET`, `POST`, ...).
    pub method: String,
    /// Raw `X-Forwarded-For` header, passed through verbatim.
    pub forwarded_for: Option<String>,
    /// Peer address of the TCP connection.
    pub peer_addr: Option<String>,
    /// Raw `User-Agent` header.
    pub user_agent: Option<String>,
}

/// Everything the HTTP layer hands to normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPostback {
    /// Decoded query string.
    pub query: FieldMap,
    /// Decoded body, `None` when absent or of an unsupported content type.
    pub body: Option<FieldMap>,
    pub context: RequestContext,
}

/// Receipt metadata stored alongside every transaction under `_meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: String,
    /// Server-assigned receipt time. Holds the store's timestamp placeholder
    /// until the store resolves it at write time.
    pub received_at: Value,
}

/// A normalized postback.
///
/// Always carries `uid`, `mid` and `tid` keys (possibly `null`).
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingEvent {
    pub(crate) fields: FieldMap,
    pub(crate) meta: RequestMeta,
    /// Number of fields the caller actually supplied, before canonical
    /// fields were added.
    pub(crate) supplied_fields: usize,
}

impl IncomingEvent {
    /// Resolved subject identifier, if any.
    pub fn uid(&self) -> Option<String> {
        self.fields.get(UID_FIELD).and_then(key_string)
    }

    /// Resolved model identifier, if any.
    pub fn mid(&self) -> Option<String> {
        self.fields.get(MID_FIELD).and_then(key_string)
    }

    /// Resolved transaction identifier, if any.
    pub fn tid(&self) -> Option<String> {
        self.fields.get(TID_FIELD).and_then(key_string)
    }

    /// The raw `clicks` value when the caller supplied the field at all.
    pub fn clicks(&self) -> Option<&Value> {
        self.fields.get(CLICKS_FIELD)
    }

    /// True when neither query nor body carried any field.
    pub fn is_empty(&self) -> bool {
        self.supplied_fields == 0
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// The JSON document persisted for this event: all fields plus `_meta`.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert(
            META_FIELD.to_string(),
            serde_json::to_value(&self.meta).unwrap_or(Value::Null),
        );
        Value::Object(doc)
    }
}

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// The partner supplied a transaction identifier.
    Key(String),
    /// No identifier; the event is appended under a generated key.
    None,
}

impl Identity {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Identity::Key(key) => Some(key),
            Identity::None => None,
        }
    }
}

/// Returns true for values that count as "provided".
///
/// Empty strings, `null`, `false` and numeric zero count as absent.
pub(crate) fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders an identifier value as a string key.
///
/// Every present value yields a key, so a field that won synonym resolution
/// is never silently dropped. Booleans and numbers render as text, arrays
/// join their rendered items with `,` and objects render as compact JSON.
/// The result may still be unusable as a path segment (for example `[]`
/// renders as `""`); callers check it with the store's key rules.
pub fn key_string(value: &Value) -> Option<String> {
    is_present(value).then(|| render_key(value))
}

fn render_key(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_key).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn presence_follows_truthiness() {
        assert!(!is_present(&json!(null)));
        assert!(!is_present(&json!("")));
        assert!(!is_present(&json!(0)));
        assert!(!is_present(&json!(false)));
        assert!(is_present(&json!("0")));
        assert!(is_present(&json!(7)));
        assert!(is_present(&json!(["a"])));
    }

    #[test]
    fn key_string_renders_numbers() {
        assert_eq!(key_string(&json!(42)), Some("42".to_string()));
        assert_eq!(key_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(key_string(&json!(0)), None);
        assert_eq!(key_string(&json!(false)), None);
        assert_eq!(key_string(&json!("")), None);
    }

    #[test]
    fn key_string_agrees_with_presence() {
        for value in [
            json!(true),
            json!(["T1", "T1"]),
            json!([]),
            json!({"a": 1}),
            json!(1.5),
            json!("0"),
        ] {
            assert_eq!(key_string(&value).is_some(), is_present(&value), "{value}");
        }
        assert_eq!(key_string(&json!(true)), Some("true".to_string()));
        assert_eq!(key_string(&json!(["T1", "T1"])), Some("T1,T1".to_string()));
        assert_eq!(key_string(&json!(["a", 1, null, ["b"]])), Some("a,1,,b".to_string()));
        assert_eq!(key_string(&json!([])), Some(String::new()));
        assert_eq!(key_string(&json!({"a": 1})), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn meta_serializes_camel_case() {
        let meta = RequestMeta {
            ip: Some("10.0.0.1".into()),
            user_agent: None,
            method: "GET".into(),
            received_at: json!(1),
        };
        let value = serde_json::to_value(meta).unwrap();
        assert_eq!(
            value,
            json!({"ip": "10.0.0.1", "userAgent": null, "method": "GET", "receivedAt": 1})
        );
    }
}
