pub mod error;
pub mod types;

pub use error::{Result, ScrapeDeckError};
pub use types::{CollectedItems, CreatorSearchInput, RunData, RunUsage, SimilarCreatorsInput};

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::ApiResponse;

const BASE_URL: &str = "https://api.scrapedeck.com/v1";

/// Collector ID for scrapedeck/tiktok-creator-search.
const TIKTOK_CREATOR_SEARCH: &str = "vK3mQdLpXw8TrbN2c";
/// Collector ID for scrapedeck/instagram-creator-search.
const INSTAGRAM_CREATOR_SEARCH: &str = "aY7fHsWq1KjUe9Dz4";
/// Collector ID for scrapedeck/youtube-channel-search.
const YOUTUBE_CHANNEL_SEARCH: &str = "pC5nRvGt6MxZo2Bk8";
/// Collector ID for scrapedeck/similar-creators.
const SIMILAR_CREATORS: &str = "qJ9wEbYu4LsIa7Fx1";

fn search_collector(platform: &str) -> Result<&'static str> {
    match platform {
        "tiktok" => Ok(TIKTOK_CREATOR_SEARCH),
        "instagram" => Ok(INSTAGRAM_CREATOR_SEARCH),
        "youtube" => Ok(YOUTUBE_CHANNEL_SEARCH),
        other => Err(ScrapeDeckError::UnsupportedPlatform(other.to_string())),
    }
}

pub struct ScrapeDeckClient {
    client: reqwest::Client,
    token: String,
}

impl ScrapeDeckClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Start a collector run. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize>(&self, collector_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/collectors/{}/runs", BASE_URL, collector_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScrapeDeckError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!("{}/runs/{}?waitForFinish=60", BASE_URL, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ScrapeDeckError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let api_resp: ApiResponse<RunData> = resp.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ScrapeDeckError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", BASE_URL, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScrapeDeckError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Search creators by keyword end-to-end: start run, poll, fetch results.
    pub async fn search_creators(
        &self,
        platform: &str,
        query: &str,
        page: u64,
        limit: u32,
    ) -> Result<CollectedItems> {
        let collector = search_collector(platform)?;
        let input = CreatorSearchInput {
            queries: vec![query.to_string()],
            page,
            results_limit: limit,
        };

        tracing::info!(platform, query, page, limit, "Starting creator search");
        let run = self.start_run(collector, &input).await?;
        tracing::info!(run_id = %run.id, "Run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        let items: Vec<serde_json::Value> =
            self.get_dataset_items(&completed.default_dataset_id).await?;
        tracing::info!(count = items.len(), "Fetched creator search results");

        Ok(CollectedItems {
            items,
            has_more: completed.has_more.unwrap_or(false),
            usage: completed.usage,
        })
    }

    /// Fetch creators similar to a handle end-to-end: start run, poll, fetch results.
    pub async fn similar_creators(
        &self,
        platform: &str,
        handle: &str,
        limit: u32,
    ) -> Result<CollectedItems> {
        // The similar-creators collector is platform-aware via the handle's
        // platform field; validate the tag anyway so typos fail loudly.
        search_collector(platform)?;
        let input = SimilarCreatorsInput {
            handles: vec![format!("{platform}:{handle}")],
            results_limit: limit,
        };

        tracing::info!(platform, handle, limit, "Starting similar-creators collection");
        let run = self.start_run(SIMILAR_CREATORS, &input).await?;
        tracing::info!(run_id = %run.id, "Run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        let items: Vec<serde_json::Value> =
            self.get_dataset_items(&completed.default_dataset_id).await?;
        tracing::info!(count = items.len(), "Fetched similar creators");

        Ok(CollectedItems {
            items,
            has_more: completed.has_more.unwrap_or(false),
            usage: completed.usage,
        })
    }
}
