//! In-memory `JobStore` with the same transactional semantics as Postgres.
//!
//! One mutex guards the whole map, so every mutator is a single atomic
//! transaction — including the status re-check that makes merges against
//! finalized jobs a silent skip. Used by the engine test suite and by local
//! development without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use castnet_common::{Creator, Job, JobStatus, RunMetrics, SearchParams};

use crate::error::{Result, StoreError};
use crate::merge::merge_batches;
use crate::store::{merge_params_patch, IdentityFn, JobStore, MergeOutcome, ProgressUpdate};

#[derive(Debug, Clone)]
struct Entry {
    job: Job,
    /// None until the first merge/replace — the result set is created lazily.
    creators: Option<Vec<Creator>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn touch(job: &mut Job) {
    job.updated_at = Utc::now();
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(id).map(|e| e.job.clone()))
    }

    async fn create(&self, job: &Job) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.insert(job.id.clone(), Entry { job: job.clone(), creators: None });
        Ok(())
    }

    async fn mark_processing(&self, id: &str) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !entry.job.status.is_terminal() {
            entry.job.status = JobStatus::Processing;
            if entry.job.started_at.is_none() {
                entry.job.started_at = Some(Utc::now());
            }
            touch(&mut entry.job);
        }
        Ok(entry.job.clone())
    }

    async fn record_progress(&self, id: &str, update: ProgressUpdate) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Ok(entry.job.clone());
        }
        let job = &mut entry.job;
        if let Some(write) = update.processed_runs {
            job.processed_runs = write.apply(job.processed_runs);
        }
        if let Some(write) = update.processed_results {
            job.processed_results = write.apply(job.processed_results);
        }
        if let Some(cursor) = update.cursor {
            job.cursor = cursor;
        }
        if let Some(progress) = update.progress {
            // Monotonic floor: a lagging partial-merge writer never makes
            // visible progress regress.
            job.progress = progress.clamp(0, 100).max(job.progress);
        }
        if let Some(patch) = update.search_params_patch {
            apply_params_patch(job, &patch)?;
        }
        touch(job);
        Ok(job.clone())
    }

    async fn merge_creators(
        &self,
        id: &str,
        batch: Vec<Creator>,
        identity: IdentityFn<'_>,
    ) -> Result<MergeOutcome> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let existing = entry.creators.as_deref().unwrap_or(&[]);
        // Another invocation finalized this job: skip rather than clobber.
        if entry.job.status.is_terminal() {
            return Ok(MergeOutcome { total: existing.len() as i64, new_count: 0 });
        }
        let (union, new_count) = merge_batches(existing, &batch, identity);
        let total = union.len() as i64;
        entry.creators = Some(union);
        entry.job.processed_results = total;
        touch(&mut entry.job);
        Ok(MergeOutcome { total, new_count: new_count as i64 })
    }

    async fn replace_creators(&self, id: &str, batch: Vec<Creator>) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Ok(entry.creators.as_ref().map(|c| c.len()).unwrap_or(0) as i64);
        }
        let total = batch.len() as i64;
        entry.creators = Some(batch);
        entry.job.processed_results = total;
        touch(&mut entry.job);
        Ok(total)
    }

    async fn update_search_params(&self, id: &str, patch: Value) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Ok(entry.job.clone());
        }
        apply_params_patch(&mut entry.job, &patch)?;
        touch(&mut entry.job);
        Ok(entry.job.clone())
    }

    async fn complete(&self, id: &str, status: JobStatus, error: Option<String>) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let job = &mut entry.job;
        if !job.status.is_terminal() {
            job.status = status;
            job.error = error;
            job.completed_at = Some(Utc::now());
            if status == JobStatus::Completed {
                job.progress = 100;
            }
            touch(job);
        }
        Ok(job.clone())
    }

    async fn record_benchmark(&self, id: &str, metrics: &RunMetrics) -> Result<Job> {
        let mut inner = self.inner.lock().await;
        let entry = inner.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let params = &mut entry.job.search_params;
        params.api_calls_used += metrics.api_calls;
        params.total_cost_usd += metrics.total_cost_usd;
        params.last_benchmark = Some(metrics.clone());
        touch(&mut entry.job);
        Ok(entry.job.clone())
    }

    async fn load_creators(&self, id: &str) -> Result<Vec<Creator>> {
        let inner = self.inner.lock().await;
        let entry = inner.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(entry.creators.clone().unwrap_or_default())
    }
}

/// Shallow-merge a JSON patch into the typed search_params by round-tripping
/// through serde_json::Value, mirroring what Postgres `||` does to the JSONB
/// column.
fn apply_params_patch(job: &mut Job, patch: &Value) -> Result<()> {
    let mut bag = serde_json::to_value(&job.search_params)?;
    merge_params_patch(&mut bag, patch);
    job.search_params = serde_json::from_value::<SearchParams>(bag)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use castnet_common::{BatchStat, Platform, SearchMode};
    use serde_json::json;

    use crate::merge::identity_key;
    use crate::store::CounterWrite;

    fn creator(identity: &str) -> Creator {
        Creator {
            platform: Platform::Tiktok,
            identity: identity.to_string(),
            username: Some(identity.to_string()),
            display_name: None,
            follower_count: Some(100),
            engagement_rate: None,
            bio: None,
            emails: Vec::new(),
            profile_url: None,
            metadata: json!({}),
            raw: json!({"uniqueId": identity}),
        }
    }

    async fn seeded(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let job = Job::new(id, "owner-1", Platform::Tiktok, SearchMode::KeywordSearch)
            .with_keywords(vec!["fitness".into()])
            .with_target_results(10);
        store.create(&job).await.unwrap();
        store
    }

    #[tokio::test]
    async fn merge_twice_is_idempotent() {
        let store = seeded("j1").await;
        let batch = vec![creator("alice"), creator("bob")];

        let first = store.merge_creators("j1", batch.clone(), &identity_key).await.unwrap();
        assert_eq!(first, MergeOutcome { total: 2, new_count: 2 });

        let second = store.merge_creators("j1", batch, &identity_key).await.unwrap();
        assert_eq!(second, MergeOutcome { total: 2, new_count: 0 });

        let job = store.load("j1").await.unwrap().unwrap();
        assert_eq!(job.processed_results, 2);
    }

    #[tokio::test]
    async fn concurrent_merges_produce_the_true_union() {
        let store = Arc::new(seeded("j1").await);
        // Overlapping sets: alice appears in both.
        let a = vec![creator("alice"), creator("bob"), creator("carol")];
        let b = vec![creator("alice"), creator("dave")];

        let (store_a, store_b) = (store.clone(), store.clone());
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { store_a.merge_creators("j1", a, &identity_key).await }),
            tokio::spawn(async move { store_b.merge_creators("j1", b, &identity_key).await }),
        );
        ra.unwrap().unwrap();
        rb.unwrap().unwrap();

        let creators = store.load_creators("j1").await.unwrap();
        assert_eq!(creators.len(), 4, "union of {{alice,bob,carol,dave}}");
        let job = store.load("j1").await.unwrap().unwrap();
        assert_eq!(job.processed_results, 4);
    }

    #[tokio::test]
    async fn merge_against_finalized_job_is_skipped() {
        let store = seeded("j1").await;
        store
            .merge_creators("j1", vec![creator("alice")], &identity_key)
            .await
            .unwrap();
        store.complete("j1", JobStatus::Completed, None).await.unwrap();

        let outcome = store
            .merge_creators("j1", vec![creator("bob")], &identity_key)
            .await
            .unwrap();
        assert_eq!(outcome, MergeOutcome { total: 1, new_count: 0 });
        assert_eq!(store.load_creators("j1").await.unwrap().len(), 1);

        let job = store.load("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_status_never_regresses() {
        let store = seeded("j1").await;
        store.complete("j1", JobStatus::Completed, None).await.unwrap();

        let job = store.mark_processing("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let job = store
            .record_progress(
                "j1",
                ProgressUpdate {
                    processed_runs: Some(CounterWrite::Delta(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_runs, 0);

        // A later error write must not overwrite the completed status either.
        let job = store
            .complete("j1", JobStatus::Error, Some("late failure".into()))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn mark_processing_is_idempotent_and_keeps_started_at() {
        let store = seeded("j1").await;
        let first = store.mark_processing("j1").await.unwrap();
        let started = first.started_at.unwrap();
        let second = store.mark_processing("j1").await.unwrap();
        assert_eq!(second.status, JobStatus::Processing);
        assert_eq!(second.started_at, Some(started));
    }

    #[tokio::test]
    async fn progress_floor_and_counter_clamps() {
        let store = seeded("j1").await;
        let job = store
            .record_progress(
                "j1",
                ProgressUpdate { progress: Some(60), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(job.progress, 60);

        // A lagging writer reporting 40 must not regress the checkpoint.
        let job = store
            .record_progress(
                "j1",
                ProgressUpdate {
                    progress: Some(40),
                    processed_results: Some(CounterWrite::Delta(-100)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(job.progress, 60);
        assert_eq!(job.processed_results, 0);
    }

    #[tokio::test]
    async fn search_params_patch_strips_nulls_and_merges_shallowly() {
        let store = seeded("j1").await;
        let job = store
            .update_search_params(
                "j1",
                json!({
                    "consecutive_empty_runs": 2,
                    "total_cost_usd": null,
                    "state": {"runner": "keyword_search", "processed_keywords": ["fitness"], "page": 1},
                }),
            )
            .await
            .unwrap();
        assert_eq!(job.search_params.consecutive_empty_runs, 2);
        assert_eq!(job.search_params.total_cost_usd, 0.0);
        match &job.search_params.state {
            castnet_common::ContinuationState::KeywordSearch { processed_keywords, page } => {
                assert_eq!(processed_keywords, &vec!["fitness".to_string()]);
                assert_eq!(*page, 1);
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_params_are_frozen_after_finalize() {
        let store = seeded("j1").await;
        store.complete("j1", JobStatus::Completed, None).await.unwrap();

        let job = store
            .update_search_params("j1", json!({"consecutive_empty_runs": 7}))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.search_params.consecutive_empty_runs, 0);
    }

    #[tokio::test]
    async fn replace_overwrites_and_respects_terminal_guard() {
        let store = seeded("j1").await;
        store
            .merge_creators("j1", vec![creator("alice"), creator("bob")], &identity_key)
            .await
            .unwrap();

        let total = store.replace_creators("j1", vec![creator("carol")]).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(store.load("j1").await.unwrap().unwrap().processed_results, 1);

        store.complete("j1", JobStatus::Completed, None).await.unwrap();
        let total = store.replace_creators("j1", vec![]).await.unwrap();
        assert_eq!(total, 1, "replace after finalize returns prior total");
    }

    #[tokio::test]
    async fn benchmark_totals_accumulate_across_runs() {
        let store = seeded("j1").await;
        let mut metrics = RunMetrics::started(Utc::now());
        metrics.api_calls = 5;
        metrics.total_cost_usd = 0.25;
        metrics.batches.push(BatchStat { index: 0, size: 10, duration_ms: 120 });
        store.record_benchmark("j1", &metrics).await.unwrap();

        metrics.api_calls = 3;
        metrics.total_cost_usd = 0.10;
        let job = store.record_benchmark("j1", &metrics).await.unwrap();

        assert_eq!(job.search_params.api_calls_used, 8);
        assert!((job.search_params.total_cost_usd - 0.35).abs() < 1e-9);
        assert_eq!(job.search_params.last_benchmark.as_ref().unwrap().api_calls, 3);
    }

    #[tokio::test]
    async fn load_missing_job_is_none() {
        let store = MemoryStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }
}
