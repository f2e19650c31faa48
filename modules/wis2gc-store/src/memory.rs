//! An in-process fake of [`DedupStore`], used by pipeline tests so the
//! dedup/commit/metric invariants can be exercised without a real Redis.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use wis2gc_common::Wis2Error;

use crate::traits::DedupStore;

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all keys, for assertions in tests.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().unwrap().clone()
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Wis2Error> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), Wis2Error> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, Wis2Error> {
        let mut guard = self.values.lock().unwrap();
        let current: i64 = guard
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = current + delta;
        guard.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> Result<bool, Wis2Error> {
        let mut guard = self.values.lock().unwrap();
        if guard.contains_key(key) {
            Ok(false)
        } else {
            guard.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k", 1).await.unwrap(), 1);
        assert_eq!(store.incr("k", 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn set_if_absent_only_sets_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_secs(60)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("a".to_string()));
    }
}
