use thiserror::Error;

/// Unified error taxonomy for the ingest-dedupe-cache-republish pipeline.
///
/// Variants line up 1:1 with the disposition table: the pipeline orchestrator
/// matches on these to decide silent-skip vs error-publish vs batch retry.
#[derive(Error, Debug)]
pub enum Wis2Error {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid JSON payload: {0}")]
    BadJson(String),

    #[error("unparseable pubtime")]
    BadPubtime,

    #[error("missing canonical or update source link")]
    MissingSourceLink,

    #[error("bad source URL: {0}")]
    BadSourceUrl(String),

    #[error("bad source host: {0}")]
    BadSourceHost(String),

    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("insufficient scratch storage: need {needed} bytes, have {available} bytes free")]
    InsufficientStorage { needed: u64, available: u64 },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("checksum failed for method {method}")]
    ChecksumFailed { method: String },

    #[error("unsupported hash method: {0}")]
    UnsupportedHash(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("dedup/metric store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("downstream publish failed: {0}")]
    Publish(String),
}

impl Wis2Error {
    /// Whether this error is a silent-skip condition per the error taxonomy
    /// (no metric, no error publish) rather than a reportable failure.
    ///
    /// `BadSourceHost` (an unresolvable/missing hostname) is deliberately
    /// excluded: the original's `get_source_link` raises for this case in a
    /// way that is not caught alongside the missing-link/empty-URL case and
    /// falls through to a reported failure, so it is routed through
    /// `handle_failure` like any other fetch-stage error instead.
    pub fn is_silent_skip(&self) -> bool {
        matches!(
            self,
            Wis2Error::MissingSourceLink | Wis2Error::BadSourceUrl(_)
        )
    }
}
