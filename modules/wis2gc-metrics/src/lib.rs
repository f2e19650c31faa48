//! C6: a thin typed wrapper over the dedup/metric store, recording the
//! counters and gauges the pipeline updates at each decision point.

use std::sync::Arc;
use std::time::Duration;

use wis2gc_common::{metric_keys as keys, Wis2Error};
use wis2gc_store::DedupStore;

const GAUGE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Records the C7 decision-point events defined by the metrics table,
/// falling back to `unknown_dataserver` when no dataserver is known.
pub struct MetricsRecorder {
    store: Arc<dyn DedupStore>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }

    pub async fn successful_cache(&self, centre: &str, dataserver: Option<&str>) -> Result<(), Wis2Error> {
        let ds = dataserver.unwrap_or(keys::UNKNOWN_DATASERVER);
        self.store.incr(&keys::key(centre, None, keys::DOWNLOADED_TOTAL), 1).await?;
        self.store
            .set(
                &keys::key(centre, Some(ds), keys::DATASERVER_LAST_DOWNLOAD_TIMESTAMP_SECONDS),
                &now_epoch().to_string(),
                GAUGE_TTL,
            )
            .await?;
        self.store
            .set(&keys::key(centre, Some(ds), keys::DATASERVER_STATUS_FLAG), "1", GAUGE_TTL)
            .await?;
        Ok(())
    }

    pub async fn passthrough(&self, centre: &str) -> Result<(), Wis2Error> {
        self.store.incr(&keys::key(centre, None, keys::NO_CACHE_TOTAL), 1).await?;
        Ok(())
    }

    pub async fn integrity_failed(&self, centre: &str) -> Result<(), Wis2Error> {
        self.store
            .incr(&keys::key(centre, None, keys::INTEGRITY_FAILED_TOTAL), 1)
            .await?;
        Ok(())
    }

    pub async fn cache_failed(&self, centre: &str, dataserver: Option<&str>) -> Result<(), Wis2Error> {
        let ds = dataserver.unwrap_or(keys::UNKNOWN_DATASERVER);
        self.store
            .incr(&keys::key(centre, Some(ds), keys::DOWNLOADED_ERRORS_TOTAL), 1)
            .await?;
        self.store
            .set(&keys::key(centre, Some(ds), keys::DATASERVER_STATUS_FLAG), "0", GAUGE_TTL)
            .await?;
        Ok(())
    }
}

fn now_epoch() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
