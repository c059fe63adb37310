// Postgres persistence for jobs and result sets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use castnet_common::{Creator, Job, JobStatus, Platform, RunMetrics, SearchMode, SearchParams};

use crate::error::{Result, StoreError};
use crate::merge::merge_batches;
use crate::store::{merge_params_patch, IdentityFn, JobStore, MergeOutcome, ProgressUpdate};

const JOB_COLUMNS: &str = "id, owner_id, platform, mode, keywords, target_handle, search_params, \
     target_results, processed_results, processed_runs, cursor_pos, progress, status, error, \
     created_at, started_at, completed_at, updated_at";

pub struct PgJobStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    owner_id: String,
    platform: String,
    mode: String,
    keywords: Value,
    target_handle: Option<String>,
    search_params: Value,
    target_results: i64,
    processed_results: i64,
    processed_runs: i64,
    cursor_pos: i64,
    progress: i16,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Job> {
        let corrupt = |reason: String| StoreError::CorruptRow { id: row.id.clone(), reason };
        let platform = Platform::parse(&row.platform)
            .ok_or_else(|| corrupt(format!("unknown platform '{}'", row.platform)))?;
        let mode = SearchMode::parse(&row.mode)
            .ok_or_else(|| corrupt(format!("unknown mode '{}'", row.mode)))?;
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", row.status)))?;
        let keywords: Vec<String> = serde_json::from_value(row.keywords)?;
        let search_params: SearchParams = serde_json::from_value(row.search_params)?;
        Ok(Job {
            id: row.id,
            owner_id: row.owner_id,
            platform,
            mode,
            keywords,
            target_handle: row.target_handle,
            search_params,
            target_results: row.target_results,
            processed_results: row.processed_results,
            processed_runs: row.processed_runs,
            cursor: row.cursor_pos,
            progress: row.progress,
            status,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Job> {
        self.load(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn load(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM search_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Job::try_from).transpose()
    }

    async fn create(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_jobs
                (id, owner_id, platform, mode, keywords, target_handle, search_params,
                 target_results, processed_results, processed_runs, cursor_pos, progress,
                 status, error, created_at, started_at, completed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&job.id)
        .bind(&job.owner_id)
        .bind(job.platform.as_str())
        .bind(job.mode.as_str())
        .bind(serde_json::to_value(&job.keywords)?)
        .bind(&job.target_handle)
        .bind(serde_json::to_value(&job.search_params)?)
        .bind(job.target_results)
        .bind(job.processed_results)
        .bind(job.processed_runs)
        .bind(job.cursor)
        .bind(job.progress)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_processing(&self, id: &str) -> Result<Job> {
        sqlx::query(
            r#"
            UPDATE search_jobs
            SET status = 'processing',
                started_at = COALESCE(started_at, now()),
                updated_at = now()
            WHERE id = $1
              AND status NOT IN ('completed', 'error', 'cancelled', 'timeout')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.fetch(id).await
    }

    async fn record_progress(&self, id: &str, update: ProgressUpdate) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM search_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let job = Job::try_from(row)?;

        if job.status.is_terminal() {
            tx.rollback().await?;
            return Ok(job);
        }

        let processed_runs = update
            .processed_runs
            .map(|w| w.apply(job.processed_runs))
            .unwrap_or(job.processed_runs);
        let processed_results = update
            .processed_results
            .map(|w| w.apply(job.processed_results))
            .unwrap_or(job.processed_results);
        let cursor = update.cursor.unwrap_or(job.cursor);
        // Monotonic floor on write.
        let progress = update
            .progress
            .map(|p| p.clamp(0, 100).max(job.progress))
            .unwrap_or(job.progress);
        let mut params = serde_json::to_value(&job.search_params)?;
        if let Some(patch) = &update.search_params_patch {
            merge_params_patch(&mut params, patch);
        }

        sqlx::query(
            r#"
            UPDATE search_jobs
            SET processed_runs = $2,
                processed_results = $3,
                cursor_pos = $4,
                progress = $5,
                search_params = $6,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(processed_runs)
        .bind(processed_results)
        .bind(cursor)
        .bind(progress)
        .bind(&params)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.fetch(id).await
    }

    async fn merge_creators(
        &self,
        id: &str,
        batch: Vec<Creator>,
        identity: IdentityFn<'_>,
    ) -> Result<MergeOutcome> {
        let mut tx = self.pool.begin().await?;

        // Lock the job row first: this serializes concurrent merges and lets
        // us observe a finalization that happened since our caller loaded
        // the job.
        let status: String =
            sqlx::query_scalar("SELECT status FROM search_jobs WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let status = JobStatus::parse(&status).ok_or_else(|| StoreError::CorruptRow {
            id: id.to_string(),
            reason: format!("unknown status '{status}'"),
        })?;

        let stored: Option<Value> =
            sqlx::query_scalar("SELECT creators FROM search_results WHERE job_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let existing: Vec<Creator> = match stored {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };

        if status.is_terminal() {
            // Another invocation already finalized the job; writing now
            // would clobber its results with stale data.
            tx.rollback().await?;
            return Ok(MergeOutcome { total: existing.len() as i64, new_count: 0 });
        }

        let (union, new_count) = merge_batches(&existing, &batch, identity);
        let total = union.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO search_results (job_id, creators, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (job_id)
            DO UPDATE SET creators = EXCLUDED.creators, updated_at = now()
            "#,
        )
        .bind(id)
        .bind(serde_json::to_value(&union)?)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE search_jobs SET processed_results = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(total)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(MergeOutcome { total, new_count: new_count as i64 })
    }

    async fn replace_creators(&self, id: &str, batch: Vec<Creator>) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let status: String =
            sqlx::query_scalar("SELECT status FROM search_jobs WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if JobStatus::parse(&status).is_some_and(|s| s.is_terminal()) {
            let stored: Option<Value> = sqlx::query_scalar(
                "SELECT creators FROM search_results WHERE job_id = $1",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;
            let existing: Vec<Creator> = match stored {
                Some(value) => serde_json::from_value(value)?,
                None => Vec::new(),
            };
            return Ok(existing.len() as i64);
        }

        let total = batch.len() as i64;
        sqlx::query(
            r#"
            INSERT INTO search_results (job_id, creators, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (job_id)
            DO UPDATE SET creators = EXCLUDED.creators, updated_at = now()
            "#,
        )
        .bind(id)
        .bind(serde_json::to_value(&batch)?)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE search_jobs SET processed_results = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(total)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(total)
    }

    async fn update_search_params(&self, id: &str, patch: Value) -> Result<Job> {
        // Strip nulls before handing the patch to JSONB `||`.
        let mut stripped = Value::Object(serde_json::Map::new());
        merge_params_patch(&mut stripped, &patch);

        sqlx::query(
            r#"
            UPDATE search_jobs
            SET search_params = search_params || $2::jsonb,
                updated_at = now()
            WHERE id = $1
              AND status NOT IN ('completed', 'error', 'cancelled', 'timeout')
            "#,
        )
        .bind(id)
        .bind(&stripped)
        .execute(&self.pool)
        .await?;
        self.fetch(id).await
    }

    async fn complete(&self, id: &str, status: JobStatus, error: Option<String>) -> Result<Job> {
        sqlx::query(
            r#"
            UPDATE search_jobs
            SET status = $2,
                error = $3,
                completed_at = now(),
                progress = CASE WHEN $2 = 'completed' THEN 100 ELSE progress END,
                updated_at = now()
            WHERE id = $1
              AND status NOT IN ('completed', 'error', 'cancelled', 'timeout')
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&error)
        .execute(&self.pool)
        .await?;
        self.fetch(id).await
    }

    async fn record_benchmark(&self, id: &str, metrics: &RunMetrics) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let params: Value =
            sqlx::query_scalar("SELECT search_params FROM search_jobs WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut params: SearchParams = serde_json::from_value(params)?;
        params.api_calls_used += metrics.api_calls;
        params.total_cost_usd += metrics.total_cost_usd;
        params.last_benchmark = Some(metrics.clone());

        sqlx::query(
            "UPDATE search_jobs SET search_params = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::to_value(&params)?)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.fetch(id).await
    }

    async fn load_creators(&self, id: &str) -> Result<Vec<Creator>> {
        let stored: Option<Value> =
            sqlx::query_scalar("SELECT creators FROM search_results WHERE job_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match stored {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}
