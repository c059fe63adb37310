//! Similar-creators runner.
//!
//! Walks a frontier of handles: each run pops a few from the queue, fetches
//! lookalike profiles for them, and feeds newly discovered handles back into
//! the queue (bounded, so one dense cluster cannot grow it without limit).
//! Failed handles return to the back of the queue for a later run.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use castnet_common::{
    progress_pct, BatchStat, ContinuationState, Creator, Job, JobStatus, RunMetrics, SearchMode,
};
use castnet_store::{identity_key, CounterWrite, ProgressUpdate};

use crate::adapter::{finalize_completed, idle_metrics, ProviderAdapter, RunContext, RunOutcome, RunStatus};
use crate::adapters::unit_stream;
use crate::continuation::{pre_run_stop, remaining_budget, wants_more, StopReason};
use crate::error::{EngineError, Result};
use crate::ledger::CostLedger;
use crate::normalize::normalize_profile;

pub struct SimilarCreatorsAdapter;

fn normalized(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

/// Push discovered handles onto the queue, skipping anything already seen
/// and respecting the queue cap.
fn enqueue_discovered(
    queue: &mut Vec<String>,
    discovered: &[Creator],
    completed: &[String],
    cap: usize,
) {
    let mut seen: HashSet<String> = completed.iter().map(|h| normalized(h)).collect();
    seen.extend(queue.iter().map(|h| normalized(h)));

    for creator in discovered {
        if queue.len() >= cap {
            break;
        }
        let Some(handle) = (if creator.identity.trim().is_empty() {
            creator.username.clone()
        } else {
            Some(creator.identity.clone())
        }) else {
            continue;
        };
        if seen.insert(normalized(&handle)) {
            queue.push(handle);
        }
    }
}

#[async_trait]
impl ProviderAdapter for SimilarCreatorsAdapter {
    fn name(&self) -> &'static str {
        "similar-creators"
    }

    fn matches(&self, job: &Job) -> bool {
        job.mode == SearchMode::SimilarCreators && job.target_handle.is_some()
    }

    async fn run(&self, job: &Job, ctx: &RunContext) -> Result<RunOutcome> {
        let run_number = job.processed_runs as u32 + 1;
        let (mut queue, mut completed) = match &job.search_params.state {
            ContinuationState::SimilarCreators { handle_queue, completed_handles } => {
                (handle_queue.clone(), completed_handles.clone())
            }
            _ => {
                return Err(EngineError::StateMismatch {
                    job_id: job.id.clone(),
                    expected: "similar_creators",
                })
            }
        };

        if let Some(reason) = pre_run_stop(job, &ctx.config, run_number) {
            return finalize_completed(&job.id, reason, idle_metrics(), ctx).await;
        }
        if queue.is_empty() {
            return finalize_completed(&job.id, StopReason::QueueExhausted, idle_metrics(), ctx)
                .await;
        }

        let limits = ctx.config.limits(job.platform);
        let used = job.search_params.api_calls_used;
        let remaining = remaining_budget(used, limits);
        if remaining <= 0 {
            ctx.store
                .complete(
                    &job.id,
                    JobStatus::Error,
                    Some(format!(
                        "api call budget exhausted ({used}/{} calls)",
                        limits.max_api_calls
                    )),
                )
                .await?;
            return Err(EngineError::BudgetExhausted {
                job_id: job.id.clone(),
                used,
                limit: limits.max_api_calls,
            });
        }

        let take = ctx.config.handles_per_run.min(remaining as usize).min(queue.len());
        let work: Vec<String> = queue.drain(..take).collect();

        info!(
            job_id = %job.id,
            run_number,
            unit_count = work.len(),
            queued = queue.len(),
            "Starting similar-creators run"
        );

        let mut metrics = RunMetrics::started(Utc::now());
        let mut ledger = CostLedger::seeded(job.search_params.total_cost_usd);
        let provider = ctx.source.provider();

        let platform = job.platform;
        let limit = ctx.config.batch_limit;
        let fetch = |handle: String| {
            let source = Arc::clone(&ctx.source);
            let retry = ctx.retry;
            async move {
                retry
                    .run_counted("similar_creators", || {
                        source.similar_creators(platform, &handle, limit)
                    })
                    .await
            }
        };
        let mut stream = unit_stream(work, ctx.config.fetch_fan_out, fetch);

        let mut stored_total = job.processed_results;
        let mut run_new = 0i64;
        let mut any_succeeded = false;
        let mut failures: Vec<String> = Vec::new();

        while let Some(unit) = stream.next().await {
            metrics.api_calls += unit.attempts;
            match unit.outcome {
                Ok(batch) => {
                    if let Some(cost) = batch.cost {
                        ledger.add_cost(
                            provider,
                            "compute_unit",
                            cost.quantity,
                            cost.unit_cost_usd,
                            cost.reported_total_usd,
                            Some(unit.unit.clone()),
                        );
                    }
                    let creators: Vec<Creator> = batch
                        .items
                        .iter()
                        .filter_map(|raw| normalize_profile(platform, raw, provider, Some(&unit.unit)))
                        .collect();
                    metrics.batches.push(BatchStat {
                        index: unit.index,
                        size: creators.len() as u32,
                        duration_ms: unit.duration_ms,
                    });
                    completed.push(unit.unit);
                    enqueue_discovered(&mut queue, &creators, &completed, ctx.config.handle_queue_cap);
                    if !creators.is_empty() {
                        let outcome = ctx.store.merge_creators(&job.id, creators, &identity_key).await?;
                        stored_total = outcome.total;
                        run_new += outcome.new_count;
                    }
                    any_succeeded = true;
                }
                Err(e) => {
                    warn!(job_id = %job.id, handle = %unit.unit, error = %e, "Similar-creators fetch failed");
                    metrics.batches.push(BatchStat {
                        index: unit.index,
                        size: 0,
                        duration_ms: unit.duration_ms,
                    });
                    failures.push(format!("{}: {e:#}", unit.unit));
                    // Back of the queue: a later run retries it after the
                    // rest of the frontier.
                    queue.push(unit.unit);
                }
            }
        }

        metrics.finished_at = Some(Utc::now());
        metrics.cost_entries = ledger.entries().to_vec();
        metrics.total_cost_usd = ledger.run_total_usd();

        if !any_succeeded {
            ctx.store.record_benchmark(&job.id, &metrics).await?;
            ctx.store
                .complete(&job.id, JobStatus::Error, Some(failures.join("; ")))
                .await?;
            return Ok(RunOutcome {
                status: RunStatus::Error,
                processed_results: stored_total,
                cursor: job.cursor,
                has_more: false,
                metrics,
            });
        }

        let streak = if run_new > 0 {
            0
        } else {
            job.search_params.consecutive_empty_runs + 1
        };
        let work_exhausted = queue.is_empty();
        let cursor = completed.len() as i64;
        let state = ContinuationState::SimilarCreators {
            handle_queue: queue,
            completed_handles: completed,
        };

        ctx.store
            .record_progress(
                &job.id,
                ProgressUpdate {
                    processed_runs: Some(CounterWrite::Delta(1)),
                    processed_results: None,
                    cursor: Some(cursor),
                    progress: Some(progress_pct(stored_total, job.target_results)),
                    search_params_patch: Some(json!({
                        "consecutive_empty_runs": streak,
                        "state": state,
                    })),
                },
            )
            .await?;
        let job_after = ctx.store.record_benchmark(&job.id, &metrics).await?;

        info!(
            job_id = %job.id,
            run_number,
            new_creators = run_new,
            total = stored_total,
            run_cost_usd = ledger.run_total_usd(),
            job_cost_usd = ledger.job_total_usd(),
            failed_units = failures.len(),
            "Similar-creators run finished"
        );

        if !wants_more(job_after.target_reached(), run_number, streak, work_exhausted, &ctx.config) {
            let reason = if job_after.target_reached() {
                StopReason::TargetReached
            } else if work_exhausted {
                StopReason::QueueExhausted
            } else if streak >= ctx.config.max_consecutive_empty_runs {
                StopReason::ConsecutiveEmptyRuns
            } else {
                StopReason::MaxRunsReached
            };
            return finalize_completed(&job.id, reason, metrics, ctx).await;
        }

        Ok(RunOutcome {
            status: RunStatus::Partial,
            processed_results: job_after.processed_results,
            cursor: job_after.cursor,
            has_more: true,
            metrics,
        })
    }
}
