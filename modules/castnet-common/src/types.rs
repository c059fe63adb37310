use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Platform & mode discriminators ---

/// Social platform a job searches. Declared explicitly at job creation so
/// dispatch never has to guess from loosely-typed strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tiktok" => Some(Platform::Tiktok),
            "instagram" => Some(Platform::Instagram),
            "youtube" => Some(Platform::Youtube),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of search the job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    KeywordSearch,
    SimilarCreators,
    StructuredQuery,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::KeywordSearch => "keyword_search",
            SearchMode::SimilarCreators => "similar_creators",
            SearchMode::StructuredQuery => "structured_query",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keyword_search" => Some(SearchMode::KeywordSearch),
            "similar_creators" => Some(SearchMode::SimilarCreators),
            "structured_query" => Some(SearchMode::StructuredQuery),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Job lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
    Cancelled,
    Timeout,
}

impl JobStatus {
    /// Terminal statuses are monotonic: once reached, a later invocation that
    /// observes one must no-op rather than regress to Processing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "error" => Some(JobStatus::Error),
            "cancelled" => Some(JobStatus::Cancelled),
            "timeout" => Some(JobStatus::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Continuation state ---

/// Adapter-private continuation state, one variant per runner. Serialized
/// into the job's `search_params` JSONB column under the `runner` tag so a
/// resumed invocation knows exactly which shape to expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "runner", rename_all = "snake_case")]
pub enum ContinuationState {
    KeywordSearch {
        /// Every query variant already sent upstream. Expansion must never
        /// regenerate these.
        #[serde(default)]
        processed_keywords: Vec<String>,
        #[serde(default)]
        page: u64,
    },
    SimilarCreators {
        #[serde(default)]
        handle_queue: Vec<String>,
        #[serde(default)]
        completed_handles: Vec<String>,
    },
}

impl ContinuationState {
    /// Initial state for a freshly created job. StructuredQuery jobs get the
    /// keyword shape; no adapter currently claims them, so dispatch rejects
    /// such jobs before the state is ever read.
    pub fn for_mode(mode: SearchMode, target_handle: Option<&str>) -> Self {
        match mode {
            SearchMode::SimilarCreators => ContinuationState::SimilarCreators {
                handle_queue: target_handle.map(|h| vec![h.to_string()]).unwrap_or_default(),
                completed_handles: Vec::new(),
            },
            SearchMode::KeywordSearch | SearchMode::StructuredQuery => {
                ContinuationState::KeywordSearch {
                    processed_keywords: Vec::new(),
                    page: 0,
                }
            }
        }
    }

    pub fn runner_tag(&self) -> &'static str {
        match self {
            ContinuationState::KeywordSearch { .. } => "keyword_search",
            ContinuationState::SimilarCreators { .. } => "similar_creators",
        }
    }
}

/// Cross-run state persisted alongside the job. The `state` field is the
/// per-runner tagged union; the rest are shared counters that survive
/// process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub consecutive_empty_runs: u32,
    #[serde(default)]
    pub api_calls_used: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_benchmark: Option<RunMetrics>,
    pub state: ContinuationState,
}

impl SearchParams {
    pub fn new(mode: SearchMode, target_handle: Option<&str>) -> Self {
        Self {
            consecutive_empty_runs: 0,
            api_calls_used: 0,
            total_cost_usd: 0.0,
            last_benchmark: None,
            state: ContinuationState::for_mode(mode, target_handle),
        }
    }
}

// --- Job ---

/// The persisted unit of search work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub platform: Platform,
    pub mode: SearchMode,

    pub keywords: Vec<String>,
    pub target_handle: Option<String>,
    pub search_params: SearchParams,

    pub target_results: i64,
    pub processed_results: i64,
    pub processed_runs: i64,
    pub cursor: i64,
    /// 0-100, derived from processed/target; the store applies a monotonic
    /// floor on write so partial-merge races never make it regress.
    pub progress: i16,
    pub status: JobStatus,
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A pending job with zeroed progress. Creation itself happens in an
    /// external submission path; this is the shape it hands the store.
    pub fn new(id: &str, owner_id: &str, platform: Platform, mode: SearchMode) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            platform,
            mode,
            keywords: Vec::new(),
            target_handle: None,
            search_params: SearchParams::new(mode, None),
            target_results: 0,
            processed_results: 0,
            processed_runs: 0,
            cursor: 0,
            progress: 0,
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_target_handle(mut self, handle: &str) -> Self {
        self.target_handle = Some(handle.to_string());
        self.search_params.state = ContinuationState::for_mode(self.mode, Some(handle));
        self
    }

    pub fn with_target_results(mut self, target: i64) -> Self {
        self.target_results = target;
        self
    }

    pub fn target_reached(&self) -> bool {
        self.target_results > 0 && self.processed_results >= self.target_results
    }
}

// --- Creator ---

/// A normalized creator record. Platform-specific fields stay in `raw`;
/// the normalized core is what merge/dedup and consumers operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    pub platform: Platform,
    /// Resolvable identity: username/handle or content id. May be empty when
    /// the upstream payload had nothing usable; the merge engine synthesizes
    /// a content-hash fallback key in that case.
    #[serde(default)]
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Provenance: source provider, originating keyword, scoring.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Untouched upstream payload.
    #[serde(default)]
    pub raw: serde_json::Value,
}

// --- Per-run telemetry ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStat {
    pub index: u32,
    pub size: u32,
    pub duration_ms: u64,
}

/// One cost ledger line. `total_cost` is quantity x unit_cost unless the
/// vendor reported a total that disagrees with the unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub provider: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-invocation telemetry, persisted as the job's benchmark snapshot so
/// spend can be audited across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub api_calls: u32,
    #[serde(default)]
    pub batches: Vec<BatchStat>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cost_entries: Vec<CostEntry>,
    /// Run-scoped spend. The job-level running total lives in SearchParams.
    pub total_cost_usd: f64,
}

impl RunMetrics {
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            api_calls: 0,
            batches: Vec::new(),
            started_at,
            finished_at: None,
            cost_entries: Vec::new(),
            total_cost_usd: 0.0,
        }
    }
}
