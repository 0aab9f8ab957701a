//! Broker-facing error type
//!
//! Application code uses `anyhow`; the IOL boundary keeps a typed error so callers
//! can tell "symbol not listed" apart from transient failures.

use thiserror::Error;

/// Errors returned by the IOL client
#[derive(Error, Debug)]
pub enum IolError {
    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Auth errors
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unauthorized (HTTP 401)")]
    Unauthorized,

    // Market data errors
    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Order execution errors
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

impl IolError {
    /// Whether a retry may succeed (transport failures, 5xx and 429)
    pub fn is_retryable(&self) -> bool {
        match self {
            IolError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            IolError::RateLimited(_) => true,
            IolError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of a non-2xx API response, `None` for everything else
    pub fn status(&self) -> Option<u16> {
        match self {
            IolError::Unauthorized => Some(401),
            IolError::NotFound(_) => Some(404),
            IolError::RateLimited(_) => Some(429),
            IolError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for the IOL boundary
pub type IolResult<T> = std::result::Result<T, IolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IolError::RateLimited("429".into()).is_retryable());
        assert!(IolError::Api {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!IolError::Api {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!IolError::NotFound("XYZ".into()).is_retryable());
        assert!(!IolError::OrderRejected("saldo insuficiente".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(IolError::Unauthorized.status(), Some(401));
        assert_eq!(IolError::NotFound("GGAL".into()).status(), Some(404));
        assert_eq!(IolError::RateLimited(String::new()).status(), Some(429));
        assert_eq!(
            IolError::Api {
                status: 422,
                body: String::new()
            }
            .status(),
            Some(422)
        );
        // a failed login is not an API response
        assert_eq!(IolError::Auth("400 Bad Request".into()).status(), None);
        assert_eq!(IolError::OrderRejected("x".into()).status(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = IolError::Api {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "API error 500: boom");
        assert_eq!(
            IolError::NotFound("GGAL".into()).to_string(),
            "Symbol not found: GGAL"
        );
    }
}
