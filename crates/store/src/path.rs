//! Slash-separated node paths.
//!
//! Paths look like `users/u1/models/m1/subs`. Every segment must be a valid
//! key: non-empty, at most [`MAX_KEY_BYTES`] bytes, and free of `. $ # [ ] /`
//! and ASCII control characters. Identifiers taken from untrusted input are
//! checked with [`is_valid_key`] before being spliced into a path, otherwise
//! a value like `u1/../other` would address a different node.
use crate::error::StoreError;

/// Longest key the Realtime Database accepts.
pub const MAX_KEY_BYTES: usize = 768;

const FORBIDDEN: &[char] = &['.', '$', '#', '[', ']', '/'];

/// True if `key` can be used as a single path segment.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_BYTES
        && !key
            .chars()
            .any(|c| FORBIDDEN.contains(&c) || c.is_ascii_control())
}

/// Joins validated segments into a path.
pub fn join<S: AsRef<str>>(segments: &[S]) -> Result<String, StoreError> {
    let mut path = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if !is_valid_key(segment) {
            return Err(StoreError::InvalidPath(format!("invalid key {segment:?}")));
        }
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(segment);
    }
    Ok(path)
}

/// Splits a path into segments, rejecting empty or invalid ones.
pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|segment| {
            if is_valid_key(segment) {
                Ok(segment)
            } else {
                Err(StoreError::InvalidPath(path.to_string()))
            }
        })
        .collect()
}

/// `{collection}/{uid}/models/{mid}`: the aggregate record for one model.
pub fn model_path(collection: &str, uid: &str, mid: &str) -> Result<String, StoreError> {
    join(&[collection, uid, "models", mid])
}
