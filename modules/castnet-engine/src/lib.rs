pub mod adapter;
pub mod adapters;
mod continuation;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod ledger;
pub mod normalize;
pub mod retry;
pub mod source;
pub mod testing;

pub use adapter::{ProviderAdapter, RunContext, RunOutcome, RunStatus};
pub use dispatch::Dispatcher;
pub use engine::SearchEngine;
pub use error::{EngineError, Result};
pub use expansion::{KeywordExpander, ModifierExpander};
pub use ledger::CostLedger;
pub use retry::RetryPolicy;
pub use source::{FetchedBatch, NoopSourceClient, SourceClient, SourceCost};
