//! Provider adapter contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use castnet_common::{EngineConfig, Job, JobStatus, RunMetrics};
use castnet_store::JobStore;

use crate::continuation::StopReason;
use crate::error::Result;
use crate::expansion::KeywordExpander;
use crate::retry::RetryPolicy;
use crate::source::SourceClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Partial,
    Error,
}

/// The uniform result every adapter run reports back through the dispatcher.
/// `has_more` is the engine's only signal to the external scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub processed_results: i64,
    pub cursor: i64,
    pub has_more: bool,
    pub metrics: RunMetrics,
}

/// Everything an adapter needs for one invocation. Passed in explicitly —
/// adapters hold no state of their own, and there are no process-global
/// caches shared between jobs.
pub struct RunContext {
    pub store: Arc<dyn JobStore>,
    pub source: Arc<dyn SourceClient>,
    pub expander: Arc<dyn KeywordExpander>,
    pub config: EngineConfig,
    pub retry: RetryPolicy,
}

/// Platform-specific fetch -> normalize -> merge -> continue cycle. One run
/// is a state machine per invocation; the job's full lifecycle spans many.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this adapter claims the job. Dispatch evaluates adapters in
    /// declaration order, first match wins.
    fn matches(&self, job: &Job) -> bool;

    async fn run(&self, job: &Job, ctx: &RunContext) -> Result<RunOutcome>;
}

/// Finalize a job as completed and build the terminal outcome. Shared by the
/// precondition short-circuit and end-of-run stopping paths.
pub(crate) async fn finalize_completed(
    job_id: &str,
    reason: StopReason,
    metrics: RunMetrics,
    ctx: &RunContext,
) -> Result<RunOutcome> {
    info!(job_id, reason = reason.as_str(), "Finalizing search job");
    let job = ctx.store.complete(job_id, JobStatus::Completed, None).await?;
    Ok(RunOutcome {
        status: RunStatus::Completed,
        processed_results: job.processed_results,
        cursor: job.cursor,
        has_more: false,
        metrics,
    })
}

/// Empty metrics for runs that finalize before doing any work.
pub(crate) fn idle_metrics() -> RunMetrics {
    let now = Utc::now();
    let mut metrics = RunMetrics::started(now);
    metrics.finished_at = Some(now);
    metrics
}
