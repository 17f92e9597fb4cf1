//! Field-map decoding and merging.
//!
//! Postbacks arrive as a query string, a JSON body, a URL-encoded body, or a
//! mix of query and body. This module turns each of those into a
//! [`FieldMap`] and merges them.
//!
//! # Flow
//!
//! ```text
//! query pairs ──► fields_from_pairs ─┐
//!                                    ├─► merge_fields ─► trim_strings
//! body bytes  ──► decode_body ───────┘     (body wins)
//! ```
use serde_json::Value;

use crate::error::IngestError;
use crate::types::FieldMap;

const JSON_MIME: &str = "application/json";
const FORM_MIME: &str = "application/x-www-form-urlencoded";

/// Builds a field map from decoded key/value pairs.
///
/// A key repeated in the input collects into an array in order of
/// appearance, so `a=1&a=2` becomes `{"a": ["1", "2"]}`.
///
/// ```rust
/// use ingest::fields_from_pairs;
/// use serde_json::json;
///
/// let map = fields_from_pairs(vec![
///     ("uid".to_string(), "u1".to_string()),
///     ("tag".to_string(), "a".to_string()),
///     ("tag".to_string(), "b".to_string()),
/// ]);
/// assert_eq!(map["uid"], json!("u1"));
/// assert_eq!(map["tag"], json!(["a", "b"]));
/// ```
pub fn fields_from_pairs<I>(pairs: I) -> FieldMap
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut map = FieldMap::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}

/// Decodes a request body according to its content type.
///
/// Returns `Ok(None)` for an empty body or a content type that is neither
/// JSON nor URL-encoded; such bodies are ignored rather than rejected.
pub fn decode_body(
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<Option<FieldMap>, IngestError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let Some(mime) = content_type.map(essence) else {
        return Ok(None);
    };

    if mime == JSON_MIME || mime.ends_with("+json") {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| IngestError::MalformedJson(err.to_string()))?;
        return match value {
            Value::Object(map) => Ok(Some(map)),
            other => Err(IngestError::BodyNotObject(kind_name(&other))),
        };
    }

    if mime == FORM_MIME {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
            .map_err(|err| IngestError::MalformedForm(err.to_string()))?;
        return Ok(Some(fields_from_pairs(pairs)));
    }

    Ok(None)
}

/// Overlays `body` on top of `query`. On key collisions the body wins.
pub fn merge_fields(query: FieldMap, body: Option<FieldMap>) -> FieldMap {
    let mut merged = query;
    if let Some(body) = body {
        for (key, value) in body {
            merged.insert(key, value);
        }
    }
    merged
}

/// Trims leading and trailing whitespace from every top-level string value.
pub fn trim_strings(fields: &mut FieldMap) {
    for value in fields.values_mut() {
        if let Value::String(s) = value {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
    }
}

/// `"Application/JSON; charset=utf-8"` -> `"application/json"`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn json_body_is_decoded() {
        let body = decode_body(
            Some("application/json; charset=utf-8"),
            br#"{"uid": "u1", "clicks": 3}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(body["uid"], json!("u1"));
        assert_eq!(body["clicks"], json!(3));
    }

    #[test]
    fn form_body_is_decoded() {
        let body = decode_body(
            Some("application/x-www-form-urlencoded"),
            b"uid=u%201&mid=m1&mid=m2",
        )
        .unwrap()
        .unwrap();
        assert_eq!(body["uid"], json!("u 1"));
        assert_eq!(body["mid"], json!(["m1", "m2"]));
    }

    #[test]
    fn unknown_content_type_is_ignored() {
        assert_eq!(decode_body(Some("text/plain"), b"uid=u1").unwrap(), None);
        assert_eq!(decode_body(None, b"{}").unwrap(), None);
        assert_eq!(decode_body(Some(JSON_MIME), b"").unwrap(), None);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = decode_body(Some(JSON_MIME), b"{not json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedJson(_)));
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert_eq!(
            decode_body(Some(JSON_MIME), b"[1, 2]").unwrap_err(),
            IngestError::BodyNotObject("array")
        );
    }

    #[test]
    fn body_overrides_query() {
        let query = map(json!({"uid": "from-query", "mid": "m1"}));
        let body = map(json!({"uid": "from-body"}));
        let merged = merge_fields(query, Some(body));
        assert_eq!(merged["uid"], json!("from-body"));
        assert_eq!(merged["mid"], json!("m1"));
    }

    #[test]
    fn only_strings_are_trimmed() {
        let mut fields = map(json!({"a": "  x ", "b": 5, "c": [" y "]}));
        trim_strings(&mut fields);
        assert_eq!(fields["a"], json!("x"));
        assert_eq!(fields["b"], json!(5));
        assert_eq!(fields["c"], json!([" y "]));
    }
}
