use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use tokio::sync::{oneshot, Mutex};

use wis2gc_common::Wis2Error;

use crate::traits::Publisher;

const KEEP_ALIVE: Duration = Duration::from_secs(300);
const SESSION_EXPIRY_SECS: u32 = 300;

type AckSender = oneshot::Sender<Result<(), Wis2Error>>;

/// MQTT v5 publisher, holding a long-lived session against the downstream
/// broker. The event loop is driven on a background task; `publish` waits
/// for the matching `PUBACK` rather than returning as soon as the request
/// is handed to `rumqttc`'s internal channel.
///
/// Acks are matched to callers by queue order, not packet id: `publish`
/// holds `pending` locked across the call that hands the packet to
/// `rumqttc`, so the order entries are pushed always matches the order
/// packets are handed off, and a broker acking QoS 1 publishes in send
/// order (true of every broker this pipeline targets) keeps the two
/// queues in lockstep.
pub struct MqttPublisher {
    client: AsyncClient,
    pending: Arc<Mutex<VecDeque<AckSender>>>,
}

impl MqttPublisher {
    /// Connect and spawn the background event-loop driver. `client_id`
    /// should be unique per process to avoid the broker evicting a
    /// previous session.
    pub fn connect(host: &str, port: u16, user: &str, password: &str, client_id: &str) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_credentials(user, password);
        options.set_session_expiry_interval(Some(SESSION_EXPIRY_SECS));
        options.set_clean_start(false);
        options.set_transport(rumqttc::Transport::tls_with_default_config());

        let (client, eventloop) = AsyncClient::new(options, 100);
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        tokio::spawn(drive_event_loop(eventloop, pending.clone()));
        Self { client, pending }
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, pending: Arc<Mutex<VecDeque<AckSender>>>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                if let Some(tx) = pending.lock().await.pop_front() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Disconnect(_))) => {
                tracing::warn!("broker sent disconnect, failing pending publishes");
                fail_all_pending(&pending, "broker disconnected").await;
            }
            Ok(Event::Incoming(pkt)) => tracing::trace!(?pkt, "egress event loop incoming"),
            Ok(Event::Outgoing(pkt)) => tracing::trace!(?pkt, "egress event loop outgoing"),
            Err(e) => {
                tracing::warn!(error = %e, "egress event loop error, reconnecting");
                fail_all_pending(&pending, &e.to_string()).await;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn fail_all_pending(pending: &Arc<Mutex<VecDeque<AckSender>>>, reason: &str) {
    let mut guard = pending.lock().await;
    while let Some(tx) = guard.pop_front() {
        let _ = tx.send(Err(Wis2Error::Publish(reason.to_string())));
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), Wis2Error> {
        let (tx, rx) = oneshot::channel();

        let send_result = {
            let mut pending = self.pending.lock().await;
            let result = self
                .client
                .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
                .await;
            if result.is_ok() {
                pending.push_back(tx);
            }
            result
        };
        send_result.map_err(|e| Wis2Error::Publish(e.to_string()))?;

        rx.await
            .map_err(|_| Wis2Error::Publish("event loop terminated before ack".to_string()))?
    }
}
