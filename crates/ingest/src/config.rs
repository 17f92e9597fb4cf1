//! Configuration types for postback normalization.
//!
//! [`IngestConfig`] lists the synonym field names that partners use for the
//! three canonical identifiers. Partners disagree on naming (`user_id` vs
//! `user`, `tx_id` vs `reference`, ...), so each canonical field is resolved
//! from an ordered list where the first non-empty value wins.
//!
//! # Example
//!
//! ```rust
//! use ingest::IngestConfig;
//!
//! let config = IngestConfig::default();
//! assert_eq!(config.uid_fields, ["uid", "user_id", "user"]);
//! assert!(config.validate().is_ok());
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field names that are written by normalization and must not be configured
/// as synonyms.
pub(crate) const META_FIELD: &str = "_meta";

/// Runtime configuration for payload normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Synonyms for the subject identifier, in priority order.
    ///
    /// Default: `["uid", "user_id", "user"]`
    #[serde(default = "default_uid_fields")]
    pub uid_fields: Vec<String>,

    /// Synonyms for the referenced model identifier, in priority order.
    ///
    /// Default: `["mid", "model_id", "model"]`
    #[serde(default = "default_mid_fields")]
    pub mid_fields: Vec<String>,

    /// Synonyms for the partner transaction identifier, in priority order.
    ///
    /// The resolved value is the idempotency key. Default:
    /// `["tid", "id", "tx_id", "transaction_id", "reference"]`
    #[serde(default = "default_tid_fields")]
    pub tid_fields: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            uid_fields: default_uid_fields(),
            mid_fields: default_mid_fields(),
            tid_fields: default_tid_fields(),
        }
    }
}

impl IngestConfig {
    /// Checks that every synonym list is non-empty and free of reserved names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, fields) in [
            ("uid_fields", &self.uid_fields),
            ("mid_fields", &self.mid_fields),
            ("tid_fields", &self.tid_fields),
        ] {
            if fields.is_empty() {
                return Err(ConfigError::EmptyFieldList(name));
            }
            if let Some(bad) = fields
                .iter()
                .find(|f| f.trim().is_empty() || f.as_str() == META_FIELD)
            {
                return Err(ConfigError::InvalidFieldName {
                    list: name,
                    field: bad.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Errors returned by [`IngestConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must list at least one field name")]
    EmptyFieldList(&'static str),

    #[error("{list} contains an invalid field name: {field:?}")]
    InvalidFieldName { list: &'static str, field: String },
}

fn default_uid_fields() -> Vec<String> {
    vec!["uid".into(), "user_id".into(), "user".into()]
}

fn default_mid_fields() -> Vec<String> {
    vec!["mid".into(), "model_id".into(), "model".into()]
}

fn default_tid_fields() -> Vec<String> {
    vec![
        "tid".into(),
        "id".into(),
        "tx_id".into(),
        "transaction_id".into(),
        "reference".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = IngestConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.mid_fields, ["mid", "model_id", "model"]);
        assert_eq!(
            cfg.tid_fields,
            ["tid", "id", "tx_id", "transaction_id", "reference"]
        );
    }

    #[test]
    fn empty_list_is_rejected() {
        let cfg = IngestConfig {
            tid_fields: Vec::new(),
            ..IngestConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyFieldList("tid_fields"))
        );
    }

    #[test]
    fn meta_field_cannot_be_a_synonym() {
        let cfg = IngestConfig {
            uid_fields: vec!["uid".into(), "_meta".into()],
            ..IngestConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidFieldName { list: "uid_fields", .. })
        ));
    }

    #[test]
    fn missing_lists_deserialize_to_defaults() {
        let cfg: IngestConfig =
            serde_json::from_str(r#"{"uid_fields": ["member"]}"#).unwrap();
        assert_eq!(cfg.uid_fields, ["member"]);
        assert_eq!(cfg.mid_fields, IngestConfig::default().mid_fields);
    }
}
