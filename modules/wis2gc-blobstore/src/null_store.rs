use async_trait::async_trait;

use wis2gc_common::Wis2Error;

use crate::traits::BlobStore;

/// Dev-mode stand-in: logs what would have been uploaded and returns the
/// canonical URL the object would have received, without touching S3.
pub struct NullBlobStore {
    bucket: String,
}

impl NullBlobStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for NullBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, Wis2Error> {
        tracing::info!(bucket = %self.bucket, key, bytes = bytes.len(), "dev mode: skipping upload");
        Ok(format!("https://{}.s3.amazonaws.com/{key}", self.bucket))
    }
}
