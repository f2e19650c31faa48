use async_trait::async_trait;

use wis2gc_common::Wis2Error;

/// Downstream MQTT publish side (C9): cache/passthrough notifications and
/// error notifications all flow through the same `publish`.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), Wis2Error>;
}
