//! C7: the per-message pipeline orchestrator —
//! `PARSE → DEDUP_CHECK1 → [FETCH → VERIFY → UPLOAD] → DEDUP_CHECK2 → COMMIT → PUBLISH`.

pub mod outcome;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use outcome::{Outcome, Stage};

use wis2gc_blobstore::BlobStore;
use wis2gc_common::{Notification, Wis2Error};
use wis2gc_egress::Publisher;
use wis2gc_metrics::MetricsRecorder;
use wis2gc_store::DedupStore;

/// Dedup-record TTL (design default 360 minutes).
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(360 * 60);

pub struct PipelineConfig {
    pub tmp_dir: PathBuf,
    pub dev_mode: bool,
    pub dedup_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tmp_dir: PathBuf::from("/tmp"),
            dev_mode: false,
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn DedupStore>,
    blobstore: Arc<dyn BlobStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<MetricsRecorder>,
    fetch_client: reqwest::Client,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DedupStore>,
        blobstore: Arc<dyn BlobStore>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<MetricsRecorder>,
        fetch_client: reqwest::Client,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            blobstore,
            publisher,
            metrics,
            fetch_client,
            config,
        }
    }

    /// Run one notification through the full pipeline.
    pub async fn process(&self, raw: &[u8]) -> Outcome {
        let mut notification = match Notification::parse(raw) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "malformed notification, dropping");
                return Outcome::Skipped { reason: e.to_string() };
            }
        };

        let last = match self.store.get(&notification.data_id).await {
            Ok(v) => v,
            Err(e) => return self.handle_failure(Stage::Dedup1, e, &notification, None).await,
        };
        if !is_novel(&notification, last.as_deref()) {
            tracing::info!(data_id = %notification.data_id, "duplicate notification, dropping");
            return Outcome::Duplicate;
        }

        let (cache_url, dataserver) = if notification.do_cache {
            match self.cache_object(&mut notification).await {
                Ok((url, ds)) => (Some(url), Some(ds)),
                Err(outcome) => return outcome,
            }
        } else {
            (None, None)
        };

        let last2 = match self.store.get(&notification.data_id).await {
            Ok(v) => v,
            Err(e) => {
                return self
                    .handle_failure(Stage::Dedup2, e, &notification, dataserver.as_deref())
                    .await
            }
        };
        if !is_novel(&notification, last2.as_deref()) {
            tracing::info!(
                data_id = %notification.data_id,
                "duplicate at commit time, discarding upload without undoing it"
            );
            return Outcome::Duplicate;
        }

        if let Err(e) = self
            .store
            .set(
                &notification.data_id,
                &notification.pubtime_epoch.to_string(),
                self.config.dedup_ttl,
            )
            .await
        {
            return self
                .handle_failure(Stage::Commit, e, &notification, dataserver.as_deref())
                .await;
        }

        let payload = notification.format_downstream(cache_url.as_deref());
        let bytes = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                return self
                    .handle_failure(
                        Stage::Publish,
                        Wis2Error::Publish(e.to_string()),
                        &notification,
                        dataserver.as_deref(),
                    )
                    .await
            }
        };
        let topic = notification.new_topic();
        if let Err(e) = self.publisher.publish(&topic, &bytes).await {
            if !self.config.dev_mode {
                return Outcome::Failed {
                    stage: Stage::Publish,
                    error: e,
                    retry: true,
                };
            }
            tracing::warn!(error = %e, "dev mode: swallowing downstream publish failure");
        }

        if notification.do_cache {
            let _ = self
                .metrics
                .successful_cache(&notification.centre, dataserver.as_deref())
                .await;
            Outcome::Cached {
                url: cache_url.expect("do_cache path always produces a url"),
            }
        } else {
            let _ = self.metrics.passthrough(&notification.centre).await;
            Outcome::Passthrough
        }
    }

    /// FETCH → VERIFY → UPLOAD. Returns the cache URL and resolved
    /// dataserver on success, or the terminal [`Outcome`] to return
    /// immediately (already carrying whatever metric/error-publish side
    /// effects its disposition requires).
    async fn cache_object(&self, notification: &mut Notification) -> Result<(String, String), Outcome> {
        let source = match notification.select_source() {
            Ok(s) => s,
            Err(e) if e.is_silent_skip() => {
                tracing::info!(
                    data_id = %notification.data_id,
                    error = %e,
                    "silent skip: no usable source link"
                );
                return Err(Outcome::Skipped { reason: e.to_string() });
            }
            Err(e) => return Err(self.handle_failure(Stage::Fetch, e, notification, None).await),
        };
        let dataserver = source.dataserver.clone();

        let fetched = match wis2gc_fetch::fetch(
            &self.fetch_client,
            &source,
            notification.content_block.as_ref(),
            &self.config.tmp_dir,
        )
        .await
        {
            Ok(f) => f,
            Err(e) => {
                return Err(self
                    .handle_failure(Stage::Fetch, e, notification, Some(&dataserver))
                    .await)
            }
        };

        if let Some(block) = notification.integrity_block.clone() {
            if let Err(e) = wis2gc_integrity::verify(&fetched.bytes, &block) {
                cleanup(&fetched.tmp_path).await;
                return Err(self
                    .handle_failure(Stage::Verify, e, notification, Some(&dataserver))
                    .await);
            }
        } else {
            let block = wis2gc_integrity::ensure(&fetched.bytes, None);
            notification.set_integrity_block(block);
        }

        let key = notification.cached_blob_key(&source.filename);
        let url = match self.blobstore.upload(&key, &fetched.bytes).await {
            Ok(u) => u,
            Err(e) => {
                cleanup(&fetched.tmp_path).await;
                return Err(self
                    .handle_failure(Stage::Upload, e, notification, Some(&dataserver))
                    .await);
            }
        };

        cleanup(&fetched.tmp_path).await;
        Ok((url, dataserver))
    }

    /// Apply the error taxonomy's metric side effect for `error`, publish an
    /// error notification, and produce the terminal `Failed` outcome.
    async fn handle_failure(
        &self,
        stage: Stage,
        error: Wis2Error,
        notification: &Notification,
        dataserver: Option<&str>,
    ) -> Outcome {
        match &error {
            Wis2Error::Fetch(_)
            | Wis2Error::UnsupportedEncoding(_)
            | Wis2Error::InsufficientStorage { .. }
            | Wis2Error::BadSourceHost(_) => {
                let _ = self.metrics.cache_failed(&notification.centre, dataserver).await;
            }
            Wis2Error::ChecksumFailed { .. } | Wis2Error::UnsupportedHash(_) => {
                let _ = self.metrics.integrity_failed(&notification.centre).await;
            }
            Wis2Error::Upload(_) => {
                let _ = self.metrics.cache_failed(&notification.centre, dataserver).await;
            }
            _ => {}
        }

        let payload = notification.to_error_payload(&error.to_string(), "");
        let topic = notification.error_topic();
        if let Ok(bytes) = serde_json::to_vec(&payload) {
            if let Err(publish_err) = self.publisher.publish(&topic, &bytes).await {
                if self.config.dev_mode {
                    tracing::warn!(error = %publish_err, "dev mode: swallowing error-publish failure");
                } else {
                    tracing::error!(error = %publish_err, "failed to publish error notification");
                }
            }
        }

        tracing::warn!(stage = %stage, error = %error, data_id = %notification.data_id, "pipeline stage failed");
        Outcome::Failed {
            stage,
            error,
            retry: true,
        }
    }
}

async fn cleanup(tmp_path: &Option<PathBuf>) {
    if let Some(path) = tmp_path {
        let _ = tokio::fs::remove_file(path).await;
    }
}

/// Matches the original's `is_unique`: a record is novel only if there was
/// none before, or the new `pubtime_epoch` is strictly greater *and* the
/// notification carries an `update` link.
fn is_novel(notification: &Notification, last: Option<&str>) -> bool {
    let last_epoch = match last {
        None => return true,
        Some(raw) => raw.parse::<f64>().unwrap_or(f64::NEG_INFINITY),
    };
    notification.pubtime_epoch > last_epoch && notification.has_update_link()
}

/// Remove every regular file under `dir` (C10 cleanup), run once at process
/// startup so files left behind by a prior crashed run don't accumulate.
pub async fn clean_scratch_dir(dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
