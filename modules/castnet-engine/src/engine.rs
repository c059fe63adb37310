//! The engine entry point: one call = one continuation run.
//!
//! Everything stateful lives behind the injected store and source client, so
//! any number of engine instances (in any number of processes) can serve the
//! same job table.

use std::sync::Arc;

use tracing::info;

use castnet_common::{EngineConfig, Job, JobStatus};
use castnet_store::JobStore;
use scrapedeck_client::ScrapeDeckClient;

use crate::adapter::{idle_metrics, RunContext, RunOutcome, RunStatus};
use crate::adapters::{KeywordSearchAdapter, SimilarCreatorsAdapter};
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, Result};
use crate::expansion::{KeywordExpander, ModifierExpander};
use crate::retry::RetryPolicy;
use crate::source::SourceClient;

pub struct SearchEngine {
    ctx: RunContext,
    dispatcher: Dispatcher,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        source: Arc<dyn SourceClient>,
        expander: Arc<dyn KeywordExpander>,
        config: EngineConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(vec![
            Arc::new(KeywordSearchAdapter),
            Arc::new(SimilarCreatorsAdapter),
        ]);
        Self {
            ctx: RunContext {
                store,
                source,
                expander,
                config,
                retry: RetryPolicy::default(),
            },
            dispatcher,
        }
    }

    /// Build an engine against the real ScrapeDeck API with the modifier
    /// expander. A missing token is a configuration error, not a silent
    /// downgrade to a no-op source.
    pub fn with_scrapedeck(
        store: Arc<dyn JobStore>,
        token: Option<String>,
        config: EngineConfig,
    ) -> Result<Self> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EngineError::Config("SCRAPEDECK_TOKEN is required".to_string()))?;
        Ok(Self::new(
            store,
            Arc::new(ScrapeDeckClient::new(token)),
            Arc::new(ModifierExpander),
            config,
        ))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.ctx.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.ctx.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Insert a freshly submitted job.
    pub async fn submit(&self, job: &Job) -> Result<()> {
        self.ctx.store.create(job).await?;
        info!(job_id = %job.id, platform = %job.platform, mode = %job.mode, "Submitted search job");
        Ok(())
    }

    /// Execute one continuation run for `job_id`. Returns None for unknown
    /// ids; a terminal job short-circuits to its stored outcome without
    /// touching the source.
    pub async fn run(&self, job_id: &str) -> Result<Option<RunOutcome>> {
        let Some(job) = self.ctx.store.load(job_id).await? else {
            info!(job_id, "Skipping run for unknown job");
            return Ok(None);
        };

        if job.status.is_terminal() {
            info!(job_id, status = %job.status, "Job already finalized");
            let status = if job.status == JobStatus::Completed {
                RunStatus::Completed
            } else {
                RunStatus::Error
            };
            return Ok(Some(RunOutcome {
                status,
                processed_results: job.processed_results,
                cursor: job.cursor,
                has_more: false,
                metrics: idle_metrics(),
            }));
        }

        let adapter = self.dispatcher.select(&job)?;
        let job = self.ctx.store.mark_processing(job_id).await?;
        info!(
            job_id,
            adapter = adapter.name(),
            run_number = job.processed_runs + 1,
            "Dispatching search run"
        );
        adapter.run(&job, &self.ctx).await.map(Some)
    }
}
