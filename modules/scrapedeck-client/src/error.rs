use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeDeckError>;

#[derive(Debug, Error)]
pub enum ScrapeDeckError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run failed with status: {0}")]
    RunFailed(String),

    #[error("No collector for platform: {0}")]
    UnsupportedPlatform(String),
}

impl From<reqwest::Error> for ScrapeDeckError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeDeckError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapeDeckError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeDeckError::Parse(err.to_string())
    }
}
