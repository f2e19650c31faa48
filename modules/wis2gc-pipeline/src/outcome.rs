use wis2gc_common::Wis2Error;

/// Where in the state machine a [`Outcome::Failed`] occurred — carried
/// purely for logging/observability, not branched on by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dedup1,
    Fetch,
    Verify,
    Upload,
    Dedup2,
    Commit,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Dedup1 => "dedup_check1",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Upload => "upload",
            Stage::Dedup2 => "dedup_check2",
            Stage::Commit => "commit",
            Stage::Publish => "publish",
        };
        f.write_str(s)
    }
}

/// The tagged disposition of one pipeline run, replacing exception-based
/// control flow: a work-item handler matches on this rather than catching.
#[derive(Debug)]
pub enum Outcome {
    /// Object cached; downstream cache notification published.
    Cached { url: String },
    /// Caching disabled for this notification; passthrough republished.
    Passthrough,
    /// DEDUP_CHECK1 or DEDUP_CHECK2 determined this notification is not novel.
    Duplicate,
    /// A silent-skip condition (malformed input, no usable source link).
    /// No metric, no error publish.
    Skipped { reason: String },
    /// A reportable failure. `retry` says whether the work-item boundary
    /// should treat this as a failed batch item (eligible for redelivery).
    Failed {
        stage: Stage,
        error: Wis2Error,
        retry: bool,
    },
}
