//! Firebase Realtime Database backend over the REST API.
//!
//! Every node is addressed as `{database_url}/{path}.json`. Conditional
//! writes use ETags: a `GET` with `X-Firebase-ETag: true` returns the node's
//! current ETag, and a `PUT` carrying `if-match` only succeeds while the node
//! still has that ETag (`412 Precondition Failed` otherwise, with the fresh
//! value and ETag in the response). An absent node has the ETag `null_etag`,
//! which turns write-if-absent into a single conditional `PUT`.
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ETAG, IF_MATCH};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::path::segments;
use crate::{RealtimeStore, TransactionResult};

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";
const NULL_ETAG: &str = "null_etag";

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// REST client for one Realtime Database instance.
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
    max_retries: u32,
}

impl FirebaseStore {
    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let raw_url = cfg
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("database_url is required".into()))?;
        let base_url = Url::parse(raw_url.trim_end_matches('/'))
            .map_err(|err| StoreError::Config(format!("invalid database_url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "database_url cannot be a base URL: {raw_url}"
            )));
        }

        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(cfg.request_timeout())
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|err| StoreError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url,
            auth_token: cfg.auth_token.clone().filter(|t| !t.is_empty()),
            max_retries: cfg.max_transaction_retries,
        })
    }

    /// `{base}/{seg}/.../{last}.json`, every segment percent-encoded.
    fn node_url(&self, path: &str) -> Result<Url, StoreError> {
        let segs = segments(path)?;
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| StoreError::Config("database_url cannot be a base URL".into()))?;
            parts.pop_if_empty();
            match segs.split_last() {
                Some((last, init)) => {
                    parts.extend(init.iter().copied());
                    parts.push(&format!("{last}.json"));
                }
                None => {
                    parts.push(".json");
                }
            }
        }
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    /// Reads a node together with its ETag.
    async fn get_with_etag(&self, path: &str) -> Result<(String, Option<Value>), StoreError> {
        let url = self.node_url(path)?;
        let response = self
            .authed(self.client.get(url))
            .header(ETAG_REQUEST_HEADER, "true")
            .send()
            .await?;
        let response = expect_success(response).await?;
        let etag = etag_of(&response)?;
        let value = null_to_none(response.json().await?);
        Ok((etag, value))
    }
}

#[async_trait]
impl RealtimeStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let url = self.node_url(path)?;
        let response = self.authed(self.client.get(url)).send().await?;
        let response = expect_success(response).await?;
        Ok(null_to_none(response.json().await?))
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let url = self.node_url(path)?;
        // Shallow reads return `true` for objects instead of the subtree.
        let response = self
            .authed(self.client.get(url))
            .query(&[("shallow", "true")])
            .send()
            .await?;
        let response = expect_success(response).await?;
        let value: Value = response.json().await?;
        Ok(!value.is_null())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let url = self.node_url(path)?;
        let response = self
            .authed(self.client.put(url))
            .query(&[("print", "silent")])
            .json(&value)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn set_if_absent(&self, path: &str, value: Value) -> Result<bool, StoreError> {
        let url = self.node_url(path)?;
        let response = self
            .authed(self.client.put(url))
            .header(IF_MATCH, NULL_ETAG)
            .query(&[("print", "silent")])
            .json(&value)
            .send()
            .await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!(path, "set_if_absent: node already exists");
            return Ok(false);
        }
        expect_success(response).await?;
        Ok(true)
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let url = self.node_url(path)?;
        let response = self.authed(self.client.post(url)).json(&value).send().await?;
        let response = expect_success(response).await?;
        let PushResponse { name } = response.json().await?;
        Ok(name)
    }

    async fn transaction(
        &self,
        path: &str,
        update: &(dyn for<'a> Fn(Option<&'a Value>) -> Option<Value> + Send + Sync),
    ) -> Result<TransactionResult, StoreError> {
        let start = Instant::now();
        let url = self.node_url(path)?;
        let (mut etag, mut current) = self.get_with_etag(path).await?;

        for attempt in 1..=self.max_retries {
            let Some(next) = update(current.as_ref()) else {
                return Ok(TransactionResult {
                    committed: false,
                    value: current,
                });
            };

            let if_match = HeaderValue::from_str(&etag)
                .map_err(|err| StoreError::Decode(format!("unusable ETag {etag:?}: {err}")))?;
            let response = self
                .authed(self.client.put(url.clone()))
                .header(IF_MATCH, if_match)
                .json(&next)
                .send()
                .await?;

            if response.status() == StatusCode::PRECONDITION_FAILED {
                // Lost the race: the 412 carries the fresh value and ETag.
                etag = etag_of(&response)?;
                current = null_to_none(response.json().await?);
                debug!(path, attempt, "transaction contended, retrying");
                continue;
            }

            let response = expect_success(response).await?;
            let value = null_to_none(response.json().await?);
            debug!(
                path,
                attempt,
                elapsed_micros = start.elapsed().as_micros(),
                "transaction_committed"
            );
            return Ok(TransactionResult {
                committed: true,
                value,
            });
        }

        warn!(path, attempts = self.max_retries, "transaction_max_retries");
        Err(StoreError::MaxRetries {
            path: path.to_string(),
            attempts: self.max_retries,
        })
    }

    fn name(&self) -> &'static str {
        "firebase"
    }
}

async fn expect_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

fn etag_of(response: &Response) -> Result<String, StoreError> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode("response is missing an ETag header".into()))
}

fn null_to_none(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> FirebaseStore {
        FirebaseStore::from_config(&StoreConfig::firebase(url)).unwrap()
    }

    #[test]
    fn builds_node_urls() {
        let store = store("https://demo-default-rtdb.firebaseio.com/");
        assert_eq!(
            store.node_url("users/u1/models/m1/subs").unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/users/u1/models/m1/subs.json"
        );
        assert_eq!(
            store.node_url("").unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/.json"
        );
    }

    #[test]
    fn encodes_segments() {
        let store = store("https://db.example.com");
        let url = store.node_url("transactions/a b?c").unwrap();
        assert_eq!(url.path(), "/transactions/a%20b%3Fc.json");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn keeps_base_path_prefix() {
        let store = store("http://localhost:9000/ns");
        assert_eq!(
            store.node_url("t/x").unwrap().as_str(),
            "http://localhost:9000/ns/t/x.json"
        );
    }

    #[test]
    fn rejects_invalid_paths() {
        let store = store("https://db.example.com");
        assert!(matches!(
            store.node_url("a/b.c"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn empty_auth_token_is_ignored() {
        let cfg = StoreConfig {
            auth_token: Some(String::new()),
            ..StoreConfig::firebase("https://db.example.com")
        };
        let store = FirebaseStore::from_config(&cfg).unwrap();
        assert!(store.auth_token.is_none());
    }
}
