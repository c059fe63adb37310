//! Adapter selection.
//!
//! A deterministic, ordered predicate list: the first adapter whose
//! `matches` returns true gets the job. A job no adapter claims fails with a
//! descriptive error carrying every discriminator that was examined — never
//! a silent default.

use std::sync::Arc;

use castnet_common::Job;

use crate::adapter::ProviderAdapter;
use crate::error::{EngineError, Result};

pub struct Dispatcher {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl Dispatcher {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn select(&self, job: &Job) -> Result<Arc<dyn ProviderAdapter>> {
        for adapter in &self.adapters {
            if adapter.matches(job) {
                return Ok(adapter.clone());
            }
        }
        Err(EngineError::UnsupportedPlatform {
            platform: job.platform,
            mode: job.mode,
            runner: job.search_params.state.runner_tag(),
            has_keywords: !job.keywords.is_empty(),
            has_target_handle: job.target_handle.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use castnet_common::{Platform, SearchMode};

    use super::*;
    use crate::adapter::{RunContext, RunOutcome};

    struct OnlyTiktok;

    #[async_trait]
    impl ProviderAdapter for OnlyTiktok {
        fn name(&self) -> &'static str {
            "only-tiktok"
        }
        fn matches(&self, job: &Job) -> bool {
            job.platform == Platform::Tiktok
        }
        async fn run(&self, _: &Job, _: &RunContext) -> crate::error::Result<RunOutcome> {
            unreachable!("dispatch tests never run adapters")
        }
    }

    struct Anything;

    #[async_trait]
    impl ProviderAdapter for Anything {
        fn name(&self) -> &'static str {
            "anything"
        }
        fn matches(&self, _: &Job) -> bool {
            true
        }
        async fn run(&self, _: &Job, _: &RunContext) -> crate::error::Result<RunOutcome> {
            unreachable!("dispatch tests never run adapters")
        }
    }

    #[test]
    fn first_match_wins() {
        let dispatcher = Dispatcher::new(vec![Arc::new(OnlyTiktok), Arc::new(Anything)]);
        let job = Job::new("j1", "o1", Platform::Tiktok, SearchMode::KeywordSearch);
        assert_eq!(dispatcher.select(&job).unwrap().name(), "only-tiktok");

        let job = Job::new("j2", "o1", Platform::Youtube, SearchMode::KeywordSearch);
        assert_eq!(dispatcher.select(&job).unwrap().name(), "anything");
    }

    #[test]
    fn unmatched_job_reports_discriminators() {
        let dispatcher = Dispatcher::new(vec![Arc::new(OnlyTiktok)]);
        let job = Job::new("j1", "o1", Platform::Instagram, SearchMode::StructuredQuery)
            .with_keywords(vec!["x".into()]);
        let err = dispatcher.select(&job).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("instagram"), "got: {message}");
        assert!(message.contains("structured_query"), "got: {message}");
        assert!(message.contains("has_keywords=true"), "got: {message}");
    }
}
