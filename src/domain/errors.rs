use std::time::Duration;
use thiserror::Error;

/// Classified failure of a single provider call. The retry policy keys off
/// the variant: Transient and RateLimited are retried against the same
/// provider, Auth and Permanent skip straight to the next one.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("transient provider failure: {reason}")]
    Transient { reason: String },

    #[error("provider authentication rejected: {reason}")]
    Auth { reason: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("provider blocked in this region")]
    RegionBlocked,

    #[error("permanent provider failure: {reason}")]
    Permanent { reason: String },
}

impl ProviderError {
    /// Whether another attempt against the same provider can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient { .. } | ProviderError::RateLimited { .. }
        )
    }

    /// Short kind tag for journal error entries.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Transient { .. } => "ProviderTransient",
            ProviderError::Auth { .. } => "AuthError",
            ProviderError::RateLimited { .. } => "RateLimited",
            ProviderError::RegionBlocked => "RegionBlocked",
            ProviderError::Permanent { .. } => "PermanentError",
        }
    }
}

/// Entity invariant violations detected while validating fetched data.
/// These count as provider errors and trigger failover.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid pair: {reason}")]
    Pair { reason: String },

    #[error("invalid candle: {reason}")]
    Candle { reason: String },

    #[error("invalid depth: {reason}")]
    Depth { reason: String },

    #[error("invalid ticker: {reason}")]
    Ticker { reason: String },
}

/// Failure of a whole cycle. Every variant is scoped to the cycle that
/// raised it; none are fatal to the process.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("market data unavailable for {capability}: {detail}")]
    DataUnavailable { capability: String, detail: String },

    #[error("cycle deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("cycle cancelled by shutdown")]
    Cancelled,

    #[error("journal write failed: {0}")]
    JournalWrite(#[from] JournalError),

    #[error("internal cycle failure: {detail}")]
    Internal { detail: String },
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::DataUnavailable { .. } => "DataUnavailable",
            CycleError::DeadlineExceeded(_) => "DeadlineExceeded",
            CycleError::Cancelled => "Cancelled",
            CycleError::JournalWrite(_) => "JournalWriteFailed",
            CycleError::Internal { .. } => "Internal",
        }
    }
}

/// Journal sink failures. Non-fatal: the decision stays valid in memory
/// and an observability counter increments.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("journal writer closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryability() {
        assert!(
            ProviderError::Transient {
                reason: "timeout".into()
            }
            .is_retryable()
        );
        assert!(
            ProviderError::RateLimited {
                retry_after: Duration::from_secs(2)
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::Auth {
                reason: "bad key".into()
            }
            .is_retryable()
        );
        assert!(!ProviderError::RegionBlocked.is_retryable());
    }

    #[test]
    fn test_cycle_error_kinds_match_journal_taxonomy() {
        let err = CycleError::DataUnavailable {
            capability: "CANDLES".into(),
            detail: "all providers exhausted".into(),
        };
        assert_eq!(err.kind(), "DataUnavailable");
        assert!(err.to_string().contains("CANDLES"));
    }
}
