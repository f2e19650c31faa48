//! An in-process fake of [`Publisher`], used by pipeline tests.

use std::sync::Mutex;

use async_trait::async_trait;

use wis2gc_common::Wis2Error;

use crate::traits::Publisher;

#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<Published>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), Wis2Error> {
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_published_messages() {
        let publisher = MemoryPublisher::new();
        publisher.publish("cache/a/wis2/xyz", b"{}").await.unwrap();
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "cache/a/wis2/xyz");
    }
}
