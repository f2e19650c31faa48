//! Metric name constants and the `centre|[dataserver|]metric_name` key format.

pub const DOWNLOADED_TOTAL: &str = "wmo_wis2_gc_downloaded_total";
pub const NO_CACHE_TOTAL: &str = "wmo_wis2_gc_no_cache_total";
pub const INTEGRITY_FAILED_TOTAL: &str = "wmo_wis2_gc_integrity_failed_total";
pub const DOWNLOADED_ERRORS_TOTAL: &str = "wmo_wis2_gc_downloaded_errors_total";
pub const DATASERVER_STATUS_FLAG: &str = "wmo_wis2_gc_dataserver_status_flag";
pub const DATASERVER_LAST_DOWNLOAD_TIMESTAMP_SECONDS: &str =
    "wmo_wis2_gc_dataserver_last_download_timestamp_seconds";

pub const UNKNOWN_DATASERVER: &str = "unknown_dataserver";

/// Build a metric key of the shape `centre|metric` or `centre|dataserver|metric`.
pub fn key(centre: &str, dataserver: Option<&str>, metric: &str) -> String {
    match dataserver {
        Some(ds) => format!("{centre}|{ds}|{metric}"),
        None => format!("{centre}|{metric}"),
    }
}
