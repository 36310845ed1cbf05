//! Search error types.

use thiserror::Error;

pub type SearchResult<T> = Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Window {0} has no cameras")]
    NoCameras(u64),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Invalid specification: {0}")]
    Format(#[from] orbit_automaton::FormatError),

    #[error("Automaton error: {0}")]
    Automaton(#[from] orbit_automaton::AutomatonError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] orbit_oracle::OracleError),

    #[error("Media error: {0}")]
    Media(#[from] orbit_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }
}
