//! External source contract consumed by provider adapters.

use async_trait::async_trait;
use serde_json::Value;

use castnet_common::Platform;
use scrapedeck_client::ScrapeDeckClient;

/// Raw cost metadata attached to one external call. `reported_total_usd` is
/// the vendor's own total, which may disagree with quantity x unit cost.
#[derive(Debug, Clone, Copy)]
pub struct SourceCost {
    pub quantity: f64,
    pub unit_cost_usd: f64,
    pub reported_total_usd: Option<f64>,
}

/// One fetched batch of raw upstream records.
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub items: Vec<Value>,
    pub has_more: bool,
    pub cost: Option<SourceCost>,
}

impl FetchedBatch {
    pub fn empty() -> Self {
        Self { items: Vec::new(), has_more: false, cost: None }
    }
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn search_creators(
        &self,
        platform: Platform,
        query: &str,
        page: u64,
        limit: u32,
    ) -> anyhow::Result<FetchedBatch>;

    async fn similar_creators(
        &self,
        platform: Platform,
        handle: &str,
        limit: u32,
    ) -> anyhow::Result<FetchedBatch>;

    /// Provider tag recorded in cost entries and creator provenance.
    fn provider(&self) -> &'static str;
}

/// No-op source for when no API token is configured.
pub struct NoopSourceClient;

#[async_trait]
impl SourceClient for NoopSourceClient {
    async fn search_creators(
        &self,
        _platform: Platform,
        _query: &str,
        _page: u64,
        _limit: u32,
    ) -> anyhow::Result<FetchedBatch> {
        Ok(FetchedBatch::empty())
    }

    async fn similar_creators(
        &self,
        _platform: Platform,
        _handle: &str,
        _limit: u32,
    ) -> anyhow::Result<FetchedBatch> {
        Ok(FetchedBatch::empty())
    }

    fn provider(&self) -> &'static str {
        "noop"
    }
}

fn batch_from_collected(collected: scrapedeck_client::CollectedItems) -> FetchedBatch {
    let cost = collected.usage.map(|u| SourceCost {
        quantity: u.compute_units,
        unit_cost_usd: u.unit_cost_usd,
        reported_total_usd: u.total_usd,
    });
    FetchedBatch { items: collected.items, has_more: collected.has_more, cost }
}

#[async_trait]
impl SourceClient for ScrapeDeckClient {
    async fn search_creators(
        &self,
        platform: Platform,
        query: &str,
        page: u64,
        limit: u32,
    ) -> anyhow::Result<FetchedBatch> {
        let collected = ScrapeDeckClient::search_creators(self, platform.as_str(), query, page, limit)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(batch_from_collected(collected))
    }

    async fn similar_creators(
        &self,
        platform: Platform,
        handle: &str,
        limit: u32,
    ) -> anyhow::Result<FetchedBatch> {
        let collected = ScrapeDeckClient::similar_creators(self, platform.as_str(), handle, limit)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(batch_from_collected(collected))
    }

    fn provider(&self) -> &'static str {
        "scrapedeck"
    }
}
