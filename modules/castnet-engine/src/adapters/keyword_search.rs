//! Keyword-search runner.
//!
//! Each run takes a slice of not-yet-processed query keywords (falling back
//! to expansion once the originals are used up), fetches them concurrently,
//! and folds every batch into the stored result set as it completes. Failed
//! keywords are not marked processed, so a later run retries them.

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
use crate::expansion::expand_with_fallback;
use crate::ledger::CostLedger;
use crate::normalize::normalize_profile;

pub struct KeywordSearchAdapter;

/// Original keywords not yet sent upstream, in submission order.
fn pending_keywords(keywords: &[String], processed: &[String], cap: usize) -> Vec<String> {
    let processed: HashSet<String> = processed.iter().map(|k| k.trim().to_lowercase()).collect();
    keywords
        .iter()
        .filter(|k| !processed.contains(&k.trim().to_lowercase()))
        .take(cap)
        .cloned()
        .collect()
}

#[async_trait]
impl ProviderAdapter for KeywordSearchAdapter {
    fn name(&self) -> &'static str {
        "keyword-search"
    }

    fn matches(&self, job: &Job) -> bool {
        job.mode == SearchMode::KeywordSearch && !job.keywords.is_empty()
    }

    async fn run(&self, job: &Job, ctx: &RunContext) -> Result<RunOutcome> {
        let run_number = job.processed_runs as u32 + 1;
        let (mut processed_keywords, page) = match &job.search_params.state {
            ContinuationState::KeywordSearch { processed_keywords, page } => {
                (processed_keywords.clone(), *page)
            }
            _ => {
                return Err(EngineError::StateMismatch {
                    job_id: job.id.clone(),
                    expected: "keyword_search",
                })
            }
        };

        if let Some(reason) = pre_run_stop(job, &ctx.config, run_number) {
            return finalize_completed(&job.id, reason, idle_metrics(), ctx).await;
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

        let mut work = pending_keywords(&job.keywords, &processed_keywords, ctx.config.keywords_per_run);
        if work.is_empty() {
            // matches() guarantees at least one original keyword to seed from.
            work = expand_with_fallback(
                ctx.expander.as_ref(),
                &job.keywords[0],
                &processed_keywords,
                ctx.config.keywords_per_run,
            )
            .await;
        }
        if work.is_empty() {
            return finalize_completed(&job.id, StopReason::KeywordsExhausted, idle_metrics(), ctx)
                .await;
        }
        work.truncate(remaining as usize);

        info!(
            job_id = %job.id,
            run_number,
            page,
            unit_count = work.len(),
            "Starting keyword search run"
        );

        let mut metrics = RunMetrics::started(Utc::now());
        let mut ledger = CostLedger::seeded(job.search_params.total_cost_usd);
        let provider = ctx.source.provider();

        let platform = job.platform;
        let limit = ctx.config.batch_limit;
        let fetch = |keyword: String| {
            let source = Arc::clone(&ctx.source);
            let retry = ctx.retry;
            async move {
                retry
                    .run_counted("search_creators", || {
                        source.search_creators(platform, &keyword, page, limit)
                    })
                    .await
            }
        };
        let mut stream = unit_stream(work, ctx.config.fetch_fan_out, fetch);

        let mut stored_total = job.processed_results;
        let mut run_new = 0i64;
        let mut upstream_has_more = false;
        let mut succeeded: Vec<String> = Vec::new();
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
                    upstream_has_more |= batch.has_more;
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
                    if !creators.is_empty() {
                        let outcome = ctx.store.merge_creators(&job.id, creators, &identity_key).await?;
                        stored_total = outcome.total;
                        run_new += outcome.new_count;
                    }
                    succeeded.push(unit.unit);
                }
                Err(e) => {
                    warn!(job_id = %job.id, keyword = %unit.unit, error = %e, "Keyword fetch failed");
                    metrics.batches.push(BatchStat {
                        index: unit.index,
                        size: 0,
                        duration_ms: unit.duration_ms,
                    });
                    failures.push(format!("{}: {e:#}", unit.unit));
                }
            }
        }

        metrics.finished_at = Some(Utc::now());
        metrics.cost_entries = ledger.entries().to_vec();
        metrics.total_cost_usd = ledger.run_total_usd();

        if succeeded.is_empty() {
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
        processed_keywords.extend(succeeded);
        let next_page = page + 1;
        let state = ContinuationState::KeywordSearch { processed_keywords, page: next_page };

        ctx.store
            .record_progress(
                &job.id,
                ProgressUpdate {
                    processed_runs: Some(CounterWrite::Delta(1)),
                    processed_results: None,
                    cursor: Some(next_page as i64),
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
            upstream_has_more,
            failed_units = failures.len(),
            "Keyword search run finished"
        );

        if !wants_more(job_after.target_reached(), run_number, streak, false, &ctx.config) {
            let reason = if job_after.target_reached() {
                StopReason::TargetReached
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
