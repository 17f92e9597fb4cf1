//! Error types produced by the ingest crate.
//!
//! Normalization itself never fails: missing identifiers simply resolve to
//! `null`. The only fallible step is decoding an untrusted request body into a
//! field map, which is what [`IngestError`] describes. Every variant maps to a
//! `400 Bad Request` at the HTTP layer.
use thiserror::Error;

/// Errors raised while decoding a postback body.
///
/// ```rust
/// use ingest::IngestError;
///
/// let err = IngestError::BodyNotObject("array");
/// assert_eq!(err.to_string(), "body must be an object, got array");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// The body claimed to be JSON but did not parse.
    #[error("malformed JSON body: {0}")]
    MalformedJson(String),

    /// The body claimed to be URL-encoded but did not parse.
    #[error("malformed form body: {0}")]
    MalformedForm(String),

    /// JSON parsed, but the top-level value is not an object.
    #[error("body must be an object, got {0}")]
    BodyNotObject(&'static str),
}
