//! Stopping-condition checks shared by every adapter.
//!
//! All inputs come from the job row and its persisted search_params, so the
//! same decision is reached after a process restart.

use castnet_common::{EngineConfig, Job, PlatformLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    TargetReached,
    MaxRunsReached,
    ConsecutiveEmptyRuns,
    KeywordsExhausted,
    QueueExhausted,
}

impl StopReason {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            StopReason::TargetReached => "target_reached",
            StopReason::MaxRunsReached => "max_runs_reached",
            StopReason::ConsecutiveEmptyRuns => "consecutive_empty_runs",
            StopReason::KeywordsExhausted => "keywords_exhausted",
            StopReason::QueueExhausted => "queue_exhausted",
        }
    }
}

/// Checks evaluated before any new work is attempted. Budget is handled
/// separately because it is an error path, not a completion.
pub(crate) fn pre_run_stop(job: &Job, config: &EngineConfig, run_number: u32) -> Option<StopReason> {
    if job.target_reached() {
        return Some(StopReason::TargetReached);
    }
    if run_number > config.max_continuation_runs {
        return Some(StopReason::MaxRunsReached);
    }
    if job.search_params.consecutive_empty_runs >= config.max_consecutive_empty_runs {
        return Some(StopReason::ConsecutiveEmptyRuns);
    }
    None
}

/// External calls the job may still make in its lifetime.
pub(crate) fn remaining_budget(api_calls_used: u32, limits: PlatformLimits) -> i64 {
    limits.max_api_calls as i64 - api_calls_used as i64
}

/// End-of-run continuation decision.
pub(crate) fn wants_more(
    target_reached: bool,
    run_number: u32,
    consecutive_empty_runs: u32,
    work_exhausted: bool,
    config: &EngineConfig,
) -> bool {
    !(target_reached
        || run_number >= config.max_continuation_runs
        || consecutive_empty_runs >= config.max_consecutive_empty_runs
        || work_exhausted)
}
