//! Test doubles shared by unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use castnet_common::Platform;

use crate::expansion::KeywordExpander;
use crate::source::{FetchedBatch, SourceClient, SourceCost};

/// A raw upstream profile payload in the shape the normalizer expects.
pub fn raw_profile(handle: &str, followers: i64) -> Value {
    json!({
        "uniqueId": handle,
        "username": handle,
        "nickname": format!("{handle} display"),
        "followerCount": followers,
        "signature": format!("bio for {handle}"),
    })
}

/// A fetched batch costing one compute unit at $0.05.
pub fn batch(items: Vec<Value>, has_more: bool) -> FetchedBatch {
    FetchedBatch {
        items,
        has_more,
        cost: Some(SourceCost { quantity: 1.0, unit_cost_usd: 0.05, reported_total_usd: None }),
    }
}

enum Reply {
    Batch(FetchedBatch),
    Fail(String),
}

/// Scripted source client. Replies are keyed by query/handle and consumed in
/// order; a unit with no scripted reply left gets an empty, costless batch.
/// Pair a scripted failure with a single-attempt retry policy, otherwise the
/// retry consumes the next reply in line.
#[derive(Default)]
pub struct MockSourceClient {
    search: Mutex<HashMap<String, VecDeque<Reply>>>,
    similar: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: AtomicU32,
}

impl MockSourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(&self, query: &str, reply: FetchedBatch) {
        self.search
            .lock()
            .expect("mock lock")
            .entry(query.to_string())
            .or_default()
            .push_back(Reply::Batch(reply));
    }

    pub fn fail_search(&self, query: &str, message: &str) {
        self.search
            .lock()
            .expect("mock lock")
            .entry(query.to_string())
            .or_default()
            .push_back(Reply::Fail(message.to_string()));
    }

    pub fn on_similar(&self, handle: &str, reply: FetchedBatch) {
        self.similar
            .lock()
            .expect("mock lock")
            .entry(handle.to_string())
            .or_default()
            .push_back(Reply::Batch(reply));
    }

    pub fn fail_similar(&self, handle: &str, message: &str) {
        self.similar
            .lock()
            .expect("mock lock")
            .entry(handle.to_string())
            .or_default()
            .push_back(Reply::Fail(message.to_string()));
    }

    /// Total external calls observed, retries included.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn take(&self, map: &Mutex<HashMap<String, VecDeque<Reply>>>, key: &str) -> anyhow::Result<FetchedBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = map
            .lock()
            .expect("mock lock")
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        match reply {
            Some(Reply::Batch(batch)) => Ok(batch),
            Some(Reply::Fail(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(FetchedBatch::empty()),
        }
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    async fn search_creators(
        &self,
        _platform: Platform,
        query: &str,
        _page: u64,
        _limit: u32,
    ) -> anyhow::Result<FetchedBatch> {
        self.take(&self.search, query)
    }

    async fn similar_creators(
        &self,
        _platform: Platform,
        handle: &str,
        _limit: u32,
    ) -> anyhow::Result<FetchedBatch> {
        self.take(&self.similar, handle)
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}

/// Expander returning a fixed variant list, minus anything excluded.
pub struct FixedExpander {
    variants: Vec<String>,
}

impl FixedExpander {
    pub fn new<S: Into<String>>(variants: Vec<S>) -> Self {
        Self { variants: variants.into_iter().map(Into::into).collect() }
    }

    pub fn empty() -> Self {
        Self { variants: Vec::new() }
    }
}

#[async_trait]
impl KeywordExpander for FixedExpander {
    async fn expand(&self, _seed: &str, exclude: &[String], count: usize) -> anyhow::Result<Vec<String>> {
        let excluded: Vec<String> = exclude.iter().map(|k| k.trim().to_lowercase()).collect();
        Ok(self
            .variants
            .iter()
            .filter(|v| !excluded.contains(&v.trim().to_lowercase()))
            .take(count)
            .cloned()
            .collect())
    }
}
