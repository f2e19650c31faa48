//! An in-process fake of [`BlobStore`], used by pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use wis2gc_common::Wis2Error;

use crate::traits::BlobStore;

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    bucket: String,
}

impl MemoryBlobStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            bucket: bucket.to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, Wis2Error> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("https://{}.s3.amazonaws.com/{key}", self.bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_overwrite_is_idempotent_by_key() {
        let store = MemoryBlobStore::new("bucket");
        let url1 = store.upload("data/a.bin", b"v1").await.unwrap();
        let url2 = store.upload("data/a.bin", b"v2").await.unwrap();
        assert_eq!(url1, url2);
        assert_eq!(store.get("data/a.bin"), Some(b"v2".to_vec()));
        assert_eq!(store.len(), 1);
    }
}
