//! Provider adapters, one per runner shape.

pub mod keyword_search;
pub mod similar;

pub use keyword_search::KeywordSearchAdapter;
pub use similar::SimilarCreatorsAdapter;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;

use crate::source::FetchedBatch;

/// One work unit's fetch result, tagged with its submission index, the wall
/// time the fetch took, and the number of upstream calls it issued
/// (retries included — budget accounting charges every attempt).
pub(crate) struct UnitResult {
    pub index: u32,
    pub unit: String,
    pub duration_ms: u64,
    pub attempts: u32,
    pub outcome: anyhow::Result<FetchedBatch>,
}

/// Fan the units out through `fetch` with at most `fan_out` in flight,
/// yielding results in completion order so each batch can be merged as soon
/// as it lands. `fetch` reports its result together with the attempt count.
pub(crate) fn unit_stream<F, Fut>(
    units: Vec<String>,
    fan_out: usize,
    fetch: F,
) -> FuturesUnordered<impl Future<Output = UnitResult>>
where
    F: Fn(String) -> Fut + Clone,
    Fut: Future<Output = (anyhow::Result<FetchedBatch>, u32)>,
{
    let semaphore = Arc::new(Semaphore::new(fan_out.max(1)));
    let stream = FuturesUnordered::new();
    for (index, unit) in units.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let fetch = fetch.clone();
        stream.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let started = Instant::now();
            let (outcome, attempts) = fetch(unit.clone()).await;
            UnitResult {
                index: index as u32,
                unit,
                duration_ms: started.elapsed().as_millis() as u64,
                attempts,
                outcome,
            }
        });
    }
    stream
}
