//! Error taxonomy for the decision loop
//!
//! Collaborator failures (`ProviderError`) are kept separate from engine-level
//! failures (`EngineError`). Timeouts and refusals from the sentiment provider
//! never cross the sentiment boundary; they collapse into fallback signals.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by external collaborators (market data, sentiment,
/// execution, storage).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transient network failure, retried with backoff at the call site
    #[error("network error: {0}")]
    Network(String),
    /// Provider asked us to slow down; treated as a longer backoff
    #[error("rate limited by provider")]
    RateLimited,
    /// Call exceeded its explicit budget
    #[error("call exceeded {budget:?} budget")]
    Timeout { budget: Duration },
    /// Sentiment provider declined the content (safety/moderation block)
    #[error("provider refused request: {0}")]
    Refusal(String),
    /// Response did not match the expected shape
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the caller should retry after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited)
    }
}

/// Engine-level errors. Per-symbol errors are isolated to that symbol's
/// cycle; only exhausted execution retries and storage unavailability are
/// escalated as process-level alerts.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Series repair failed repeatedly; reported, reduces confidence, not fatal
    #[error("data gap for {symbol} {interval}: repair fetch failed {failures} times")]
    DataGap {
        symbol: String,
        interval: String,
        failures: u32,
    },
    /// Malformed symbol or parameters; the symbol is dropped from the watch-list
    #[error("validation failed for {symbol}: {reason}")]
    Validation { symbol: String, reason: String },
    /// Order submission or cancellation failed after bounded retries
    #[error("execution failed for {symbol} after {attempts} attempts: {cause}")]
    Execution {
        symbol: String,
        attempts: u32,
        cause: String,
    },
    /// Durable state could not be written or read
    #[error("state store unavailable: {0}")]
    Storage(String),
    /// Collaborator failure that could not be absorbed at its boundary
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::RateLimited.is_transient());
        assert!(!ProviderError::Refusal("blocked".into()).is_transient());
        assert!(!ProviderError::Timeout {
            budget: Duration::from_secs(8)
        }
        .is_transient());
    }

    #[test]
    fn test_provider_error_converts() {
        let err: EngineError = ProviderError::RateLimited.into();
        assert!(matches!(err, EngineError::Provider(_)));
    }

    #[test]
    fn test_data_gap_display() {
        let err = EngineError::DataGap {
            symbol: "BTCUSDT".into(),
            interval: "5m".into(),
            failures: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("2 times"));
    }
}
