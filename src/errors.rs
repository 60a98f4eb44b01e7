use thiserror::Error;

/// Where a failure originated. Attached to every classified error so the
/// boundary layer can report it without re-deriving the information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Network,
    Upstream,
    Parsing,
    Validation,
    RateLimit,
    Configuration,
    Cache,
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ErrorSource::Network => "network",
            ErrorSource::Upstream => "upstream",
            ErrorSource::Parsing => "parsing",
            ErrorSource::Validation => "validation",
            ErrorSource::RateLimit => "rate_limit",
            ErrorSource::Configuration => "configuration",
            ErrorSource::Cache => "cache",
        };
        write!(f, "{}", tag)
    }
}

/// Classified acquisition errors
///
/// Every externally observable failure is one of these variants. The
/// retryable flag and suggested status are fixed at classification time,
/// so callers never need to inspect the underlying cause again.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Transport-level failure (DNS, connect, reset, timeout)
    #[error("{operation}: network failure: {message}")]
    Network { operation: String, message: String },

    /// Upstream answered with a non-success HTTP status
    #[error("{operation}: upstream returned HTTP {status}")]
    UpstreamStatus { operation: String, status: u16 },

    /// Response body failed structural parsing
    #[error("{operation}: failed to parse upstream response: {message}")]
    Parse { operation: String, message: String },

    /// Computed value outside configured validity bounds, or bad caller input
    #[error("{operation}: validation failed: {message}")]
    Validation { operation: String, message: String },

    /// Caller cancelled while suspended (rate-limiter wait or backoff sleep)
    #[error("{operation}: cancelled while waiting")]
    Cancelled { operation: String },

    /// Quote response contained no usable trading pair
    #[error("no valid trading pairs in quote response")]
    NoValidPairs,

    /// Associated token account derivation failed
    #[error("failed to derive associated token account: {message}")]
    Derivation { message: String },

    /// Self-contradictory configuration, fatal at construction time
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cache layer failure
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Retry engine exhausted every allowed attempt
    #[error("{operation}: all {attempts} attempts failed")]
    AllAttemptsFailed {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<FeedError>,
    },
}

impl FeedError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Network { .. } => true,
            FeedError::UpstreamStatus { status, .. } => {
                // Retry on server errors (5xx) and throttling (429)
                *status >= 500 || *status == 429
            }

            // Schema drift and bad data are not self-healing
            FeedError::Parse { .. } => false,
            FeedError::Validation { .. } => false,
            FeedError::NoValidPairs => false,

            // The caller chose to cancel
            FeedError::Cancelled { .. } => false,

            FeedError::Derivation { .. } => false,
            FeedError::Configuration(_) => false,
            FeedError::CacheUnavailable(_) => false,

            // Already exhausted; carries the last classification verbatim
            FeedError::AllAttemptsFailed { source, .. } => source.is_retryable(),
        }
    }

    /// Source tag for logging and boundary-layer reporting
    pub fn source_tag(&self) -> ErrorSource {
        match self {
            FeedError::Network { .. } => ErrorSource::Network,
            FeedError::UpstreamStatus { .. } => ErrorSource::Upstream,
            FeedError::Parse { .. } => ErrorSource::Parsing,
            FeedError::Validation { .. } => ErrorSource::Validation,
            FeedError::NoValidPairs => ErrorSource::Validation,
            FeedError::Cancelled { .. } => ErrorSource::RateLimit,
            FeedError::Derivation { .. } => ErrorSource::Validation,
            FeedError::Configuration(_) => ErrorSource::Configuration,
            FeedError::CacheUnavailable(_) => ErrorSource::Cache,
            FeedError::AllAttemptsFailed { source, .. } => source.source_tag(),
        }
    }

    /// HTTP status the boundary layer should render for this error
    pub fn suggested_status(&self) -> u16 {
        match self {
            FeedError::Network { .. } => 502,
            FeedError::UpstreamStatus { status, .. } => match status {
                429 => 503,
                404 => 404,
                s if *s >= 500 => 502,
                _ => 400,
            },
            FeedError::Parse { .. } => 502,
            FeedError::Validation { .. } => 422,
            FeedError::NoValidPairs => 502,
            FeedError::Cancelled { .. } => 503,
            FeedError::Derivation { .. } => 500,
            FeedError::Configuration(_) => 500,
            FeedError::CacheUnavailable(_) => 503,
            FeedError::AllAttemptsFailed { source, .. } => source.suggested_status(),
        }
    }

    /// Classify a reqwest failure with operation context
    pub fn from_reqwest(operation: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return FeedError::Network {
                operation: operation.to_string(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return FeedError::Parse {
                operation: operation.to_string(),
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return FeedError::UpstreamStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            };
        }
        // Request build errors, redirect loops and the rest of reqwest's
        // surface are transport problems from this crate's perspective
        FeedError::Network {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Classify a Solana RPC client failure with operation context
    pub fn from_client_error(
        operation: &str,
        err: solana_client::client_error::ClientError,
    ) -> Self {
        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            FeedError::UpstreamStatus {
                operation: operation.to_string(),
                status: 429,
            }
        } else if err_str.contains("not found") {
            FeedError::UpstreamStatus {
                operation: operation.to_string(),
                status: 404,
            }
        } else if err_str.contains("timeout")
            || err_str.contains("timed out")
            || err_str.contains("connection")
            || err_str.contains("dns")
        {
            FeedError::Network {
                operation: operation.to_string(),
                message: err.to_string(),
            }
        } else if err_str.contains("parse") || err_str.contains("deserialize") {
            FeedError::Parse {
                operation: operation.to_string(),
                message: err.to_string(),
            }
        } else {
            // Unclassified RPC failures are treated as upstream server errors
            FeedError::UpstreamStatus {
                operation: operation.to_string(),
                status: 502,
            }
        }
    }
}

/// Convenience alias used throughout the crate
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16) -> FeedError {
        FeedError::UpstreamStatus {
            operation: "test".to_string(),
            status,
        }
    }

    #[test]
    fn test_network_is_retryable() {
        let err = FeedError::Network {
            operation: "fetch_quote".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.source_tag(), ErrorSource::Network);
        assert_eq!(err.suggested_status(), 502);
    }

    #[test]
    fn test_status_classification() {
        assert!(upstream(500).is_retryable());
        assert!(upstream(503).is_retryable());
        assert!(upstream(429).is_retryable());
        assert!(!upstream(404).is_retryable());
        assert!(!upstream(400).is_retryable());

        assert_eq!(upstream(500).suggested_status(), 502);
        assert_eq!(upstream(429).suggested_status(), 503);
        assert_eq!(upstream(404).suggested_status(), 404);
        assert_eq!(upstream(403).suggested_status(), 400);
    }

    #[test]
    fn test_parse_and_validation_not_retryable() {
        let parse = FeedError::Parse {
            operation: "fetch_quote".to_string(),
            message: "missing field".to_string(),
        };
        assert!(!parse.is_retryable());
        assert_eq!(parse.source_tag(), ErrorSource::Parsing);

        let validation = FeedError::Validation {
            operation: "fetch_quote".to_string(),
            message: "price out of bounds".to_string(),
        };
        assert!(!validation.is_retryable());
        assert_eq!(validation.suggested_status(), 422);
    }

    #[test]
    fn test_cancelled_maps_to_rate_limit_source() {
        let err = FeedError::Cancelled {
            operation: "acquire".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.source_tag(), ErrorSource::RateLimit);
    }

    #[test]
    fn test_exhaustion_delegates_to_inner() {
        let inner = upstream(500);
        let err = FeedError::AllAttemptsFailed {
            operation: "fetch_quote".to_string(),
            attempts: 3,
            source: Box::new(inner),
        };
        assert!(err.is_retryable());
        assert_eq!(err.source_tag(), ErrorSource::Upstream);
        assert_eq!(err.suggested_status(), 502);
        assert!(err.to_string().contains("all 3 attempts failed"));
    }

    #[test]
    fn test_no_valid_pairs_is_terminal() {
        assert!(!FeedError::NoValidPairs.is_retryable());
        assert_eq!(FeedError::NoValidPairs.source_tag(), ErrorSource::Validation);
    }
}
