//! C8: upstream MQTT v5 subscriber, in-process dedup, and per-group work
//! queue feeding the C7 pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use moka::future::Cache;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, MqttOptions};
use tokio::sync::mpsc;

use wis2gc_common::{derive_message_group_id, raw_already_cached_by, Wis2Error};
use wis2gc_pipeline::{Outcome, Pipeline, Stage};

const TOPICS: [&str; 4] = [
    "origin/a/wis2/+/data/core/#",
    "origin/a/wis2/+/metadata/#",
    "cache/a/wis2/+/data/core/#",
    "cache/a/wis2/+/metadata/#",
];

const SESSION_EXPIRY_SECS: u32 = 300;
const KEEP_ALIVE: Duration = Duration::from_secs(300);
const ID_CACHE_CAPACITY: u64 = 100_000;
const ID_CACHE_TTL: Duration = Duration::from_secs(45 * 60);
const INITIAL_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);
/// Overall per-work-item deadline (spec §5): bounds one group's worker from
/// stalling forever on a stuck fetch/upload.
const WORK_ITEM_TIMEOUT: Duration = Duration::from_secs(15 * 60);

pub struct IngressConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub client_id: String,
    pub bucket_name: String,
}

/// Upstream subscriber: owns the in-process dedup cache and the
/// `message_group_id`-keyed fan-out of work onto per-group sequential
/// worker tasks. `run` never returns under normal operation — reconnects
/// with exponential backoff on every disconnect.
pub struct Ingress {
    pipeline: Arc<Pipeline>,
    bucket_name: String,
    id_cache: Cache<String, ()>,
    groups: Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl Ingress {
    pub fn new(pipeline: Arc<Pipeline>, bucket_name: String) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            bucket_name,
            id_cache: Cache::builder()
                .max_capacity(ID_CACHE_CAPACITY)
                .time_to_live(ID_CACHE_TTL)
                .build(),
            groups: Mutex::new(HashMap::new()),
        })
    }

    pub async fn run(self: Arc<Self>, config: IngressConfig) -> ! {
        let mut backoff = INITIAL_RECONNECT_BACKOFF;
        loop {
            match self.clone().connect_and_serve(&config).await {
                Ok(()) => backoff = INITIAL_RECONNECT_BACKOFF,
                Err(e) => {
                    tracing::warn!(error = %e, backoff_secs = backoff.as_secs(), "ingress disconnected, reconnecting");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
        }
    }

    async fn connect_and_serve(self: Arc<Self>, config: &IngressConfig) -> anyhow::Result<()> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_credentials(&config.user, &config.password);
        options.set_session_expiry_interval(Some(SESSION_EXPIRY_SECS));
        options.set_clean_start(false);
        options.set_transport(rumqttc::Transport::tls_with_default_config());

        let (client, mut eventloop) = AsyncClient::new(options, 10_000);
        for topic in TOPICS {
            client.subscribe(topic, QoS::AtLeastOnce).await?;
        }
        tracing::info!(topics = ?TOPICS, "ingress subscribed");

        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::Publish(publish)) => {
                    let topic = String::from_utf8_lossy(&publish.topic).to_string();
                    self.handle_publish(topic, publish.payload.to_vec());
                }
                _ => {}
            }
        }
    }

    fn handle_publish(self: &Arc<Self>, topic: String, payload: Vec<u8>) {
        let raw: serde_json::Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(topic, error = %e, "dropping malformed ingress message");
                return;
            }
        };

        if raw_already_cached_by(&raw, &self.bucket_name) {
            tracing::debug!(topic, "loop prevention: href references destination bucket");
            return;
        }

        let id = raw.get("id").and_then(|v| v.as_str()).map(str::to_string);
        if let Some(id) = id.clone() {
            if self.id_cache.contains_key(&id) {
                tracing::debug!(topic, id, "duplicate message id, dropping before enqueue");
                return;
            }
            let cache = self.id_cache.clone();
            tokio::spawn(async move { cache.insert(id, ()).await });
        }

        let (group_key, body) = match annotate_for_pipeline(raw, &topic, id) {
            Some(pair) => pair,
            None => return,
        };

        self.enqueue(group_key, body);
    }

    fn enqueue(self: &Arc<Self>, group_key: String, body: Vec<u8>) {
        let mut groups = self.groups.lock().unwrap();
        let sender = groups.entry(group_key).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let this = self.clone();
            tokio::spawn(this.drain_group(rx));
            tx
        });
        let _ = sender.send(body);
    }

    async fn drain_group(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(body) = rx.recv().await {
            let outcome = match tokio::time::timeout(WORK_ITEM_TIMEOUT, self.pipeline.process(&body)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = WORK_ITEM_TIMEOUT.as_secs(),
                        "pipeline stage exceeded overall deadline, marking failed for retry"
                    );
                    Outcome::Failed {
                        stage: Stage::Fetch,
                        error: Wis2Error::Fetch("exceeded overall work item deadline".to_string()),
                        retry: true,
                    }
                }
            };
            tracing::debug!(?outcome, "pipeline finished processing work item");
        }
    }
}

/// Annotate `raw` with its MQTT `topic` (delivered out-of-band, but required
/// by `Notification::parse`) and derive the `message_group_id` the work
/// queue will fan out on. Returns `None` if re-serialization fails, which
/// should never happen for a value that itself came from `serde_json`.
fn annotate_for_pipeline(
    mut raw: serde_json::Value,
    topic: &str,
    id: Option<String>,
) -> Option<(String, Vec<u8>)> {
    let group_key = raw
        .pointer("/properties/data_id")
        .and_then(|v| v.as_str())
        .map(derive_message_group_id)
        .or(id)
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(obj) = raw.as_object_mut() {
        obj.insert("topic".to_string(), serde_json::Value::String(topic.to_string()));
    }
    let body = serde_json::to_vec(&raw).ok()?;
    Some((group_key, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_derived_from_data_id_when_present() {
        let raw = serde_json::json!({"id": "msg-1", "properties": {"data_id": "P1"}});
        let (key, body) = annotate_for_pipeline(raw, "origin/a/wis2/xyz/data/core/x", Some("msg-1".to_string())).unwrap();
        assert_eq!(key, "P1");
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["topic"], "origin/a/wis2/xyz/data/core/x");
    }

    #[test]
    fn group_key_falls_back_to_message_id_without_data_id() {
        let raw = serde_json::json!({"id": "msg-1"});
        let (key, _) = annotate_for_pipeline(raw, "t", Some("msg-1".to_string())).unwrap();
        assert_eq!(key, "msg-1");
    }

    #[test]
    fn group_key_falls_back_to_unknown_with_neither() {
        let raw = serde_json::json!({});
        let (key, _) = annotate_for_pipeline(raw, "t", None).unwrap();
        assert_eq!(key, "unknown");
    }
}
