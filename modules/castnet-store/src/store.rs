use async_trait::async_trait;
use serde_json::Value;

use castnet_common::{Creator, Job, JobStatus, RunMetrics};

use crate::error::Result;

/// Resolves the merge key for a creator record. Returning None/empty hands
/// key synthesis over to the merge engine's content-hash fallback.
pub type IdentityFn<'a> = &'a (dyn Fn(&Creator) -> Option<String> + Send + Sync);

/// How a counter field is written: overwrite, or add to the stored value.
/// Streaming adapters emit deltas mid-run; batch adapters compute the full
/// count once and overwrite.
#[derive(Debug, Clone, Copy)]
pub enum CounterWrite {
    Absolute(i64),
    Delta(i64),
}

impl CounterWrite {
    /// Resulting counter value, clamped to >= 0.
    pub fn apply(self, existing: i64) -> i64 {
        match self {
            CounterWrite::Absolute(n) => n.max(0),
            CounterWrite::Delta(d) => existing.saturating_add(d).max(0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub processed_runs: Option<CounterWrite>,
    pub processed_results: Option<CounterWrite>,
    pub cursor: Option<i64>,
    pub progress: Option<i16>,
    /// Shallow-merged into the search_params bag; null values are stripped
    /// before persisting.
    pub search_params_patch: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Deduplicated creator count after the merge.
    pub total: i64,
    /// Creators this batch added that were not already stored.
    pub new_count: i64,
}

/// The persistence contract for jobs and their result sets. All mutation of
/// the shared Job+ResultSet pair goes through this trait; the merge
/// transaction is the sole concurrency-control boundary, because concurrent
/// invocations may run in different processes.
///
/// Every mutator returns the re-fetched job so a caller chaining two
/// mutations always operates on post-first-call state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job. Absence is "nothing to do", never an error.
    async fn load(&self, id: &str) -> Result<Option<Job>>;

    /// Insert a freshly submitted job.
    async fn create(&self, job: &Job) -> Result<()>;

    /// status -> processing, started_at := existing or now. Idempotent, and
    /// a no-op against a terminal job.
    async fn mark_processing(&self, id: &str) -> Result<Job>;

    /// Write progress counters/cursor/progress and optionally patch the
    /// search_params bag. Counters clamp to >= 0; the progress write applies
    /// a monotonic floor (never below the stored checkpoint). No-op on
    /// terminal jobs.
    async fn record_progress(&self, id: &str, update: ProgressUpdate) -> Result<Job>;

    /// The idempotent write path: fold a batch into the stored deduplicated
    /// set. Read-union-write happens in one transaction that first re-checks
    /// status; if another invocation already finalized the job this merge is
    /// skipped entirely and prior totals are returned with new_count = 0.
    async fn merge_creators(
        &self,
        id: &str,
        batch: Vec<Creator>,
        identity: IdentityFn<'_>,
    ) -> Result<MergeOutcome>;

    /// Non-incremental overwrite for adapters that recompute their full
    /// result set each run. Same terminal-status guard as merge. Returns the
    /// stored total.
    async fn replace_creators(&self, id: &str, batch: Vec<Creator>) -> Result<i64>;

    /// Shallow-merge a patch into search_params, stripping null values.
    async fn update_search_params(&self, id: &str, patch: Value) -> Result<Job>;

    /// Terminal transition. progress := 100 only on Completed. Never
    /// overwrites an already-terminal status.
    async fn complete(&self, id: &str, status: JobStatus, error: Option<String>) -> Result<Job>;

    /// Persist the latest run metrics snapshot and roll its api-call count
    /// and run cost into the job-level totals.
    async fn record_benchmark(&self, id: &str, metrics: &RunMetrics) -> Result<Job>;

    /// Stored deduplicated creators for a job. Empty if no merge/replace has
    /// happened yet.
    async fn load_creators(&self, id: &str) -> Result<Vec<Creator>>;
}

/// Shallow merge of `patch` into `target` (both expected to be JSON objects).
/// Null values in the patch are dropped rather than written, so a bag
/// contaminated with nulls can never corrupt the stored document.
pub(crate) fn merge_params_patch(target: &mut Value, patch: &Value) {
    let Some(patch_map) = patch.as_object() else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let target_map = target.as_object_mut().expect("target coerced to object above");
    for (key, value) in patch_map {
        if value.is_null() {
            continue;
        }
        target_map.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counter_write_clamps_negative() {
        assert_eq!(CounterWrite::Absolute(-5).apply(10), 0);
        assert_eq!(CounterWrite::Delta(-20).apply(10), 0);
        assert_eq!(CounterWrite::Delta(5).apply(10), 15);
        assert_eq!(CounterWrite::Absolute(7).apply(10), 7);
    }

    #[test]
    fn patch_strips_nulls() {
        let mut target = json!({"a": 1, "b": "keep"});
        merge_params_patch(&mut target, &json!({"a": 2, "b": null, "c": [1, 2]}));
        assert_eq!(target, json!({"a": 2, "b": "keep", "c": [1, 2]}));
    }

    #[test]
    fn patch_is_shallow() {
        let mut target = json!({"state": {"runner": "keyword_search", "page": 1}});
        merge_params_patch(&mut target, &json!({"state": {"runner": "keyword_search", "page": 2}}));
        assert_eq!(target["state"]["page"], 2);
        assert_eq!(target["state"]["runner"], "keyword_search");
    }

    #[test]
    fn non_object_patch_is_ignored() {
        let mut target = json!({"a": 1});
        merge_params_patch(&mut target, &json!("junk"));
        assert_eq!(target, json!({"a": 1}));
    }
}
