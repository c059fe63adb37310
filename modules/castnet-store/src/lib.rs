pub mod error;
pub mod memory;
pub mod merge;
mod pg;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use merge::{identity_key, merge_batches};
pub use pg::PgJobStore;
pub use store::{CounterWrite, IdentityFn, JobStore, MergeOutcome, ProgressUpdate};
