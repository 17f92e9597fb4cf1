//! Pipeline configuration: where transactions land and which collections
//! mirror the aggregate counters.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ingest::{ConfigError as IngestConfigError, IngestConfig};
use store::path::is_valid_key;

/// Errors returned by [`PipelineConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid ingest configuration: {0}")]
    Ingest(#[from] IngestConfigError),

    #[error("invalid transactions collection name: {0:?}")]
    InvalidTransactionsCollection(String),

    #[error("mirror_collections must name at least one collection")]
    NoMirrors,

    #[error("invalid mirror collection name: {0:?}")]
    InvalidMirrorCollection(String),

    #[error("mirror collection listed twice: {0:?}")]
    DuplicateMirror(String),
}

/// Configuration for [`crate::Pipeline`].
///
/// ```
/// use postback::PipelineConfig;
///
/// let cfg = PipelineConfig::default();
/// assert_eq!(cfg.transactions_collection, "transactions");
/// assert_eq!(cfg.mirror_collections, ["publicDashboards", "users"]);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Collection accepted postbacks are written to.
    #[serde(default = "default_transactions_collection")]
    pub transactions_collection: String,

    /// Collections holding a copy of every `{uid}/models/{mid}` record.
    /// Validation requires the model in all of them; counters are bumped in
    /// each one.
    #[serde(default = "default_mirror_collections")]
    pub mirror_collections: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            transactions_collection: default_transactions_collection(),
            mirror_collections: default_mirror_collections(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ingest.validate()?;

        if !is_valid_key(&self.transactions_collection) {
            return Err(ConfigError::InvalidTransactionsCollection(
                self.transactions_collection.clone(),
            ));
        }
        if self.mirror_collections.is_empty() {
            return Err(ConfigError::NoMirrors);
        }
        for (idx, name) in self.mirror_collections.iter().enumerate() {
            if !is_valid_key(name) {
                return Err(ConfigError::InvalidMirrorCollection(name.clone()));
            }
            if self.mirror_collections[..idx].contains(name) {
                return Err(ConfigError::DuplicateMirror(name.clone()));
            }
        }
        Ok(())
    }
}

fn default_transactions_collection() -> String {
    "transactions".to_string()
}

fn default_mirror_collections() -> Vec<String> {
    vec!["publicDashboards".to_string(), "users".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_collection_names() {
        let cfg = PipelineConfig {
            transactions_collection: "tx/archive".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTransactionsCollection(_))
        ));

        let cfg = PipelineConfig {
            mirror_collections: vec!["users".into(), "bad.name".into()],
            ..PipelineConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidMirrorCollection("bad.name".into()))
        );
    }

    #[test]
    fn requires_distinct_mirrors() {
        let cfg = PipelineConfig {
            mirror_collections: Vec::new(),
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoMirrors));

        let cfg = PipelineConfig {
            mirror_collections: vec!["users".into(), "users".into()],
            ..PipelineConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateMirror("users".into()))
        );
    }

    #[test]
    fn surfaces_ingest_errors() {
        let mut cfg = PipelineConfig::default();
        cfg.ingest.uid_fields.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Ingest(_))));
    }

    #[test]
    fn deserializes_partial_config() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"transactions_collection": "postbacks"}"#).unwrap();
        assert_eq!(cfg.transactions_collection, "postbacks");
        assert_eq!(cfg.mirror_collections.len(), 2);
    }
}
