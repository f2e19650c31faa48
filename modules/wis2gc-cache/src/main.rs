use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wis2gc_blobstore::{BlobStore, NullBlobStore, S3BlobStore};
use wis2gc_common::Config;
use wis2gc_egress::MqttPublisher;
use wis2gc_fetch::build_client;
use wis2gc_ingress::{Ingress, IngressConfig};
use wis2gc_metrics::MetricsRecorder;
use wis2gc_pipeline::{clean_scratch_dir, Pipeline, PipelineConfig};
use wis2gc_store::{DedupStore, MemoryStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wis2gc=info".parse()?))
        .init();

    info!("WIS2 Global Cache node starting...");

    let config = Config::from_env();
    config.log_redacted();

    let tmp_dir = PathBuf::from(&config.tmp_dir);
    clean_scratch_dir(&tmp_dir).await?;

    let store: Arc<dyn DedupStore> = match &config.gb_connection_string {
        Some(conn) => Arc::new(RedisStore::connect(conn).await?),
        None => {
            tracing::warn!("GB_CONNECTION_STRING not set, using in-memory dedup store (dev only)");
            Arc::new(MemoryStore::new())
        }
    };

    let blobstore: Arc<dyn BlobStore> = if config.dev_mode {
        tracing::warn!("DEV-MODE enabled, uploads are no-ops");
        Arc::new(NullBlobStore::new(&config.bucket_name))
    } else {
        Arc::new(S3BlobStore::new(&config.bucket_name, &config.dest_bucket_region).await)
    };

    let metrics = Arc::new(MetricsRecorder::new(store.clone()));

    let publisher = Arc::new(MqttPublisher::connect(
        &config.mqtt_broker_host,
        config.mqtt_broker_port,
        &config.mqtt_pub_user,
        &config.mqtt_pub_password,
        &format!("{}-egress", config.queue_name),
    ));

    let fetch_client = build_client(config.dev_mode)?;

    let pipeline = Arc::new(Pipeline::new(
        store,
        blobstore,
        publisher,
        metrics,
        fetch_client,
        PipelineConfig {
            tmp_dir,
            dev_mode: config.dev_mode,
            ..PipelineConfig::default()
        },
    ));

    let ingress = Ingress::new(pipeline, config.bucket_name.clone());
    ingress
        .run(IngressConfig {
            host: config.mqtt_broker_host.clone(),
            port: config.mqtt_broker_port,
            user: config.mqtt_pub_user.clone(),
            password: config.mqtt_pub_password.clone(),
            client_id: format!("{}-ingress", config.queue_name),
            bucket_name: config.bucket_name.clone(),
        })
        .await
}
