//! Test harness for pipeline scenario tests.
//!
//! Fakes every external dependency (store, blobstore, publisher) so a full
//! `PARSE -> ... -> PUBLISH` run exercises only pipeline logic, no network.

use std::sync::Arc;

use wis2gc_blobstore::MemoryBlobStore;
use wis2gc_egress::{MemoryPublisher, Published};
use wis2gc_metrics::MetricsRecorder;
use wis2gc_pipeline::{Pipeline, PipelineConfig};
use wis2gc_store::MemoryStore;

pub struct TestHarness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub blobstore: Arc<MemoryBlobStore>,
    pub publisher: Arc<MemoryPublisher>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig {
            tmp_dir: std::env::temp_dir(),
            dev_mode: true,
            dedup_ttl: wis2gc_pipeline::DEFAULT_DEDUP_TTL,
        })
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobstore = Arc::new(MemoryBlobStore::new("test-bucket"));
        let publisher = Arc::new(MemoryPublisher::new());
        let metrics = Arc::new(MetricsRecorder::new(store.clone()));
        let client = wis2gc_fetch::build_client(false).expect("client");

        let pipeline = Pipeline::new(
            store.clone(),
            blobstore.clone(),
            publisher.clone(),
            metrics,
            client,
            config,
        );

        Self {
            pipeline,
            store,
            blobstore,
            publisher,
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.publisher.published()
    }

    pub fn dedup_record(&self, data_id: &str) -> Option<String> {
        self.store.snapshot().get(data_id).cloned()
    }

    pub fn counter(&self, key: &str) -> Option<String> {
        self.store.snapshot().get(key).cloned()
    }
}

/// Build a sample notification JSON body with inline base64 content.
pub fn inline_notification(data_id: &str, pubtime: &str, extra_links: &str, extra_props: &str) -> Vec<u8> {
    format!(
        r#"{{
            "id": "msg-{data_id}",
            "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {{
                "data_id": "{data_id}",
                "pubtime": "{pubtime}",
                "content": {{"value": "aGVsbG8=", "encoding": "base64", "size": 5}}
                {extra_props}
            }},
            "links": [
                {{"rel": "canonical", "href": "https://src.example.com/a/weather.bin"}}
                {extra_links}
            ]
        }}"#
    )
    .into_bytes()
}
