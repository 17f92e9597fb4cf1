//! In-process store backend.
//!
//! Holds the whole tree as one JSON value behind a `RwLock`. Every operation
//! takes the lock once, so conditional writes and transactions are atomic
//! with respect to each other. Writes follow Realtime Database semantics:
//! `null` children are dropped, an object that ends up empty disappears, and
//! server-value placeholders are resolved at write time.
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::path::segments;
use crate::push_id::PushIdGenerator;
use crate::{is_server_timestamp, RealtimeStore, TransactionResult};

#[derive(Debug, Default)]
struct Inner {
    root: Option<Value>,
    last_timestamp: i64,
}

impl Inner {
    /// Strictly increasing millisecond clock.
    fn next_timestamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn lookup(&self, segs: &[&str]) -> Option<&Value> {
        let mut node = self.root.as_ref()?;
        for seg in segs {
            node = node.as_object()?.get(*seg)?;
        }
        Some(node)
    }

    fn write(&mut self, segs: &[&str], value: Value) {
        let mut value = value;
        if contains_server_value(&value) {
            let ts = self.next_timestamp();
            resolve_server_values(&mut value, ts);
        }
        let value = prune(value);

        let root = self.root.take();
        self.root = write_at(root, segs, value);
    }
}

/// Store backed by process memory. Used for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    push_ids: PushIdGenerator,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segs = segments(path)?;
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.lookup(&segs).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segs = segments(path)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.write(&segs, value);
        Ok(())
    }

    async fn set_if_absent(&self, path: &str, value: Value) -> Result<bool, StoreError> {
        let segs = segments(path)?;
        // One write lock covers both the check and the write.
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.lookup(&segs).is_some() {
            return Ok(false);
        }
        guard.write(&segs, value);
        Ok(true)
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let key = self.push_ids.next_id();
        let mut segs = segments(path)?;
        segs.push(key.as_str());
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.write(&segs, value);
        Ok(key)
    }

    async fn transaction(
        &self,
        path: &str,
        update: &(dyn for<'a> Fn(Option<&'a Value>) -> Option<Value> + Send + Sync),
    ) -> Result<TransactionResult, StoreError> {
        let segs = segments(path)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(next) = update(guard.lookup(&segs)) else {
            return Ok(TransactionResult {
                committed: false,
                value: guard.lookup(&segs).cloned(),
            });
        };
        guard.write(&segs, next);
        Ok(TransactionResult {
            committed: true,
            value: guard.lookup(&segs).cloned(),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Returns the new subtree rooted at `node` after writing `value` at `segs`.
fn write_at(node: Option<Value>, segs: &[&str], value: Option<Value>) -> Option<Value> {
    let Some((first, rest)) = segs.split_first() else {
        return value;
    };
    let mut map = match node {
        Some(Value::Object(map)) => map,
        // Deleting below a leaf is a no-op.
        other if value.is_none() => return other,
        // Writing below a leaf replaces the leaf with an object.
        _ => Map::new(),
    };
    let child = map.remove(*first);
    if let Some(updated) = write_at(child, rest, value) {
        map.insert((*first).to_string(), updated);
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

/// Drops `null` children and empty objects; `None` means "nothing stored".
fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            if pruned.is_empty() {
                None
            } else {
                Some(Value::Object(pruned))
            }
        }
        other => Some(other),
    }
}

fn contains_server_value(value: &Value) -> bool {
    if is_server_timestamp(value) {
        return true;
    }
    match value {
        Value::Object(map) => map.values().any(contains_server_value),
        Value::Array(items) => items.iter().any(contains_server_value),
        _ => false,
    }
}

fn resolve_server_values(value: &mut Value, timestamp: i64) {
    if is_server_timestamp(value) {
        *value = Value::from(timestamp);
        return;
    }
    match value {
        Value::Object(map) => map
            .values_mut()
            .for_each(|v| resolve_server_values(v, timestamp)),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| resolve_server_values(v, timestamp)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::server_timestamp;

    #[tokio::test]
    async fn set_then_get_nested() {
        let store = MemoryStore::new();
        store.set("users/u1/models/m1", json!({"subs": 2})).await.unwrap();
        assert_eq!(
            store.get("users/u1/models/m1/subs").await.unwrap(),
            Some(json!(2))
        );
        assert!(store.exists("users/u1").await.unwrap());
        assert!(!store.exists("users/u2").await.unwrap());
        assert!(!store.exists("users/u1/models/m1/subs/deeper").await.unwrap());
    }

    #[tokio::test]
    async fn null_write_removes_and_prunes_parents() {
        let store = MemoryStore::new();
        store.set("a/b/c", json!(1)).await.unwrap();
        store.set("a/b/c", Value::Null).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn null_children_are_not_stored() {
        let store = MemoryStore::new();
        store
            .set("t/x", json!({"tid": null, "uid": "u1"}))
            .await
            .unwrap();
        assert_eq!(store.get("t/x").await.unwrap(), Some(json!({"uid": "u1"})));
    }

    #[tokio::test]
    async fn set_if_absent_claims_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("tx/T1", json!({"n": 1})).await.unwrap());
        assert!(!store.set_if_absent("tx/T1", json!({"n": 2})).await.unwrap());
        assert_eq!(store.get("tx/T1").await.unwrap(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn concurrent_set_if_absent_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.set_if_absent("tx/same", json!({"attempt": i})).await
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn push_generates_distinct_ordered_keys() {
        let store = MemoryStore::new();
        let a = store.push("tx", json!({"n": 1})).await.unwrap();
        let b = store.push("tx", json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(store.get(&format!("tx/{b}")).await.unwrap(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn server_timestamps_are_resolved_and_increasing() {
        let store = MemoryStore::new();
        store
            .set("t/a", json!({"_meta": {"receivedAt": server_timestamp()}}))
            .await
            .unwrap();
        store
            .set("t/b", json!({"_meta": {"receivedAt": server_timestamp()}}))
            .await
            .unwrap();
        let a = store.get("t/a/_meta/receivedAt").await.unwrap().unwrap();
        let b = store.get("t/b/_meta/receivedAt").await.unwrap().unwrap();
        assert!(a.as_i64().unwrap() < b.as_i64().unwrap());
    }

    #[tokio::test]
    async fn transaction_commits_and_aborts() {
        let store = MemoryStore::new();
        let bump = |current: Option<&Value>| {
            Some(json!(current.and_then(Value::as_i64).unwrap_or(0) + 1))
        };
        let first = store.transaction("c", &bump).await.unwrap();
        assert!(first.committed);
        assert_eq!(first.value, Some(json!(1)));
        store.transaction("c", &bump).await.unwrap();
        assert_eq!(store.get("c").await.unwrap(), Some(json!(2)));

        let abort = |_: Option<&Value>| -> Option<Value> { None };
        let result = store.transaction("c", &abort).await.unwrap();
        assert!(!result.committed);
        assert_eq!(result.value, Some(json!(2)));
    }

    #[tokio::test]
    async fn concurrent_transactions_do_not_lose_increments() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let bump = |current: Option<&Value>| {
                    Some(json!(current.and_then(Value::as_i64).unwrap_or(0) + 1))
                };
                store.transaction("counter", &bump).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().committed);
        }
        assert_eq!(store.get("counter").await.unwrap(), Some(json!(50)));
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected() {
        let store = MemoryStore::new();
        let err = store.set("a/b.c", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }
}
