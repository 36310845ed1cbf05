//! Oracle error types.

use thiserror::Error;

pub type OracleResult<T> = Result<T, OracleError>;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No frames to score")]
    NoFrames,

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Circuit breaker open for oracle {0}")]
    CircuitOpen(&'static str),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::ServiceUnavailable(_) | OracleError::Timeout(_) | OracleError::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OracleError::ServiceUnavailable("503".into()).is_retryable());
        assert!(OracleError::Timeout(100).is_retryable());
        assert!(!OracleError::InvalidResponse("no choices".into()).is_retryable());
        assert!(!OracleError::CircuitOpen("vlm").is_retryable());
    }
}
