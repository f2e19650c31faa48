use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use wis2gc_common::Wis2Error;

use crate::traits::BlobStore;

/// S3-backed implementation of [`BlobStore`].
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS credential chain (environment,
    /// profile, or instance role), pinned to `region`.
    pub async fn new(bucket: &str, region: &str) -> Self {
        let shared_config = aws_config::from_env()
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: S3Client::new(&shared_config),
            bucket: bucket.to_string(),
        }
    }

    pub fn canonical_url(&self, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{key}", self.bucket)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, Wis2Error> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| Wis2Error::Upload(e.to_string()))?;

        tracing::info!(bucket = %self.bucket, key, bytes = bytes.len(), "uploaded object");
        Ok(self.canonical_url(key))
    }
}
