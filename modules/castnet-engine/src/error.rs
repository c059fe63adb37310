use castnet_common::{Platform, SearchMode};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing credential/endpoint. Fatal for the run; the job keeps its
    /// prior status so a retry succeeds once configuration is fixed.
    #[error("Missing configuration: {0}")]
    Config(String),

    /// No adapter claimed the job. Includes every discriminator dispatch
    /// examined so the failure is diagnosable.
    #[error("Unsupported platform: platform={platform}, mode={mode}, runner={runner}, has_keywords={has_keywords}, has_target_handle={has_target_handle}")]
    UnsupportedPlatform {
        platform: Platform,
        mode: SearchMode,
        runner: &'static str,
        has_keywords: bool,
        has_target_handle: bool,
    },

    /// The job's lifetime API-call budget ran out before the search finished.
    /// Distinct from normal completion so the caller can tell "stalled,
    /// needs attention" from "done".
    #[error("API call budget exhausted for job {job_id}: {used}/{limit} calls used")]
    BudgetExhausted { job_id: String, used: u32, limit: u32 },

    /// The persisted continuation state does not match the adapter that was
    /// dispatched — the job document was edited out-of-band or corrupted.
    #[error("Continuation state mismatch for job {job_id}: expected runner '{expected}'")]
    StateMismatch { job_id: String, expected: &'static str },

    #[error(transparent)]
    Store(#[from] castnet_store::StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
