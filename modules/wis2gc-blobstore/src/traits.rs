use async_trait::async_trait;

use wis2gc_common::Wis2Error;

/// Durable object storage backing the global cache's copies of downloaded
/// data (C5). Upload is keyed and idempotent: re-uploading the same `key`
/// with different bytes simply overwrites, matching how the original
/// treated re-caching an updated object as a normal occurrence rather than
/// a conflict.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `bytes` under `key` and return the canonical HTTPS URL a
    /// downstream consumer can dereference.
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, Wis2Error>;
}
