pub mod config;
pub mod progress;
pub mod types;

pub use config::{EngineConfig, PlatformLimits};
pub use progress::progress_pct;
pub use types::*;
