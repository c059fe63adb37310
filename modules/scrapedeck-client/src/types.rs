use serde::{Deserialize, Serialize};

/// Envelope every ScrapeDeck API response is wrapped in.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub data: T,
}

/// Input for the creator keyword-search collectors.
#[derive(Debug, Clone, Serialize)]
pub struct CreatorSearchInput {
    pub queries: Vec<String>,
    pub page: u64,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// Input for the similar-creators collectors.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarCreatorsInput {
    pub handles: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// Metered usage attached to a finished run. `unit_cost_usd` is the price
/// ScrapeDeck bills per compute unit; `total_usd` is their reported total,
/// which occasionally disagrees with units x unit price after discounts.
#[derive(Debug, Clone, Deserialize)]
pub struct RunUsage {
    #[serde(rename = "computeUnits")]
    pub compute_units: f64,
    #[serde(rename = "unitCostUsd")]
    pub unit_cost_usd: f64,
    #[serde(rename = "totalUsd")]
    pub total_usd: Option<f64>,
}

/// Metadata for a collector run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "hasMore")]
    pub has_more: Option<bool>,
    pub usage: Option<RunUsage>,
}

/// Items plus run-level metadata from one end-to-end collection.
#[derive(Debug, Clone)]
pub struct CollectedItems {
    pub items: Vec<serde_json::Value>,
    pub has_more: bool,
    pub usage: Option<RunUsage>,
}
