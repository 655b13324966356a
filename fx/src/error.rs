//! FX engine error types.

use thiserror::Error;

/// Errors that can occur while fetching or applying rates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxError {
    /// Network unreachable, timeout, or the body could not be read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status.
    #[error("Rate provider returned status {status_code}")]
    Provider { status_code: u16 },

    /// Response body is missing rate data or carries unusable rates.
    #[error("Malformed rate response: {0}")]
    Parse(String),

    /// A fetch was requested without a base currency.
    #[error("Base currency cannot be empty")]
    EmptyBaseCurrency,

    /// The fetch task ended without settling its token.
    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

impl FxError {
    /// Check if retrying the same fetch could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FxError::Transport(_) | FxError::TaskFailed(_) => true,
            FxError::Provider { status_code } => *status_code == 429 || *status_code >= 500,
            FxError::Parse(_) | FxError::EmptyBaseCurrency => false,
        }
    }

    /// Get error code for display and logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::Transport(_) => "TRANSPORT_ERROR",
            FxError::Provider { .. } => "PROVIDER_ERROR",
            FxError::Parse(_) => "PARSE_ERROR",
            FxError::EmptyBaseCurrency => "EMPTY_BASE_CURRENCY",
            FxError::TaskFailed(_) => "TASK_FAILED",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(FxError::Transport("timeout".into()).is_retryable());
        assert!(FxError::Provider { status_code: 503 }.is_retryable());
        assert!(FxError::Provider { status_code: 429 }.is_retryable());
        assert!(!FxError::Provider { status_code: 404 }.is_retryable());
        assert!(!FxError::Parse("missing data".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = FxError::Provider { status_code: 400 };
        assert_eq!(err.to_string(), "Rate provider returned status 400");
        assert_eq!(err.error_code(), "PROVIDER_ERROR");
    }
}
