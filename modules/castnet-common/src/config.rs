use std::collections::HashMap;
use std::env;

use crate::types::Platform;

/// Per-platform external-call limits, resolved by platform tag. Adapters
/// must read these instead of hardcoding budgets.
#[derive(Debug, Clone, Copy)]
pub struct PlatformLimits {
    /// Cap on external API calls a job may make across its whole lifetime.
    pub max_api_calls: u32,
    /// Delay the external scheduler should wait before re-invoking a job
    /// that returned has_more=true.
    pub continuation_delay_ms: u64,
}

/// Engine configuration loaded from environment variables, with defaults
/// that work for local development.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A run numbered past this finalizes with reason max_runs_reached.
    pub max_continuation_runs: u32,
    /// Back-to-back runs adding zero new creators before the job is judged
    /// exhausted.
    pub max_consecutive_empty_runs: u32,
    /// Bounded fan-out for concurrent external fetches within one run.
    pub fetch_fan_out: usize,
    /// Keyword units attempted per keyword-search run.
    pub keywords_per_run: usize,
    /// Handles popped from the queue per similar-creators run.
    pub handles_per_run: usize,
    /// Cap on discovered handles waiting in a similar-creators queue.
    pub handle_queue_cap: usize,
    /// Items requested per external call.
    pub batch_limit: u32,
    limits: HashMap<Platform, PlatformLimits>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert(
            Platform::Tiktok,
            PlatformLimits { max_api_calls: 200, continuation_delay_ms: 30_000 },
        );
        limits.insert(
            Platform::Instagram,
            PlatformLimits { max_api_calls: 200, continuation_delay_ms: 45_000 },
        );
        limits.insert(
            Platform::Youtube,
            PlatformLimits { max_api_calls: 150, continuation_delay_ms: 60_000 },
        );
        Self {
            max_continuation_runs: 20,
            max_consecutive_empty_runs: 3,
            fetch_fan_out: 4,
            keywords_per_run: 5,
            handles_per_run: 3,
            handle_queue_cap: 25,
            batch_limit: 50,
            limits,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.max_continuation_runs = env_u32("CASTNET_MAX_CONTINUATION_RUNS", config.max_continuation_runs);
        config.max_consecutive_empty_runs =
            env_u32("CASTNET_MAX_CONSECUTIVE_EMPTY_RUNS", config.max_consecutive_empty_runs);
        config.fetch_fan_out = env_u32("CASTNET_FETCH_FAN_OUT", config.fetch_fan_out as u32) as usize;
        config.keywords_per_run = env_u32("CASTNET_KEYWORDS_PER_RUN", config.keywords_per_run as u32) as usize;
        config.handles_per_run = env_u32("CASTNET_HANDLES_PER_RUN", config.handles_per_run as u32) as usize;
        config.batch_limit = env_u32("CASTNET_BATCH_LIMIT", config.batch_limit);
        for (platform, limits) in config.limits.iter_mut() {
            let prefix = format!("CASTNET_{}", platform.as_str().to_uppercase());
            limits.max_api_calls = env_u32(&format!("{prefix}_MAX_API_CALLS"), limits.max_api_calls);
            limits.continuation_delay_ms = env_u32(
                &format!("{prefix}_CONTINUATION_DELAY_MS"),
                limits.continuation_delay_ms as u32,
            ) as u64;
        }
        config
    }

    pub fn limits(&self, platform: Platform) -> PlatformLimits {
        self.limits.get(&platform).copied().unwrap_or(PlatformLimits {
            max_api_calls: 100,
            continuation_delay_ms: 60_000,
        })
    }

    pub fn set_limits(&mut self, platform: Platform, limits: PlatformLimits) {
        self.limits.insert(platform, limits);
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_per_platform() {
        let config = EngineConfig::default();
        assert_eq!(config.limits(Platform::Tiktok).max_api_calls, 200);
        assert_eq!(config.limits(Platform::Youtube).continuation_delay_ms, 60_000);
        assert_eq!(config.max_consecutive_empty_runs, 3);
    }

    #[test]
    fn limits_can_be_overridden() {
        let mut config = EngineConfig::default();
        config.set_limits(
            Platform::Tiktok,
            PlatformLimits { max_api_calls: 5, continuation_delay_ms: 10 },
        );
        assert_eq!(config.limits(Platform::Tiktok).max_api_calls, 5);
    }
}
