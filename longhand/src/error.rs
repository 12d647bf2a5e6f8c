//! Error taxonomy with retry classification.
//!
//! Every failure that can surface from a backend call or a job run is
//! mapped to a stable [`ErrorCode`]. The executor queries
//! `is_retriable()` instead of string-matching, and logs the code into
//! the event log so a replay reconstructs exactly why a job failed or
//! kept retrying.
//!
//! ## Codes
//!
//! | Code                  | Retriable |
//! |-----------------------|-----------|
//! | transport_timeout     | yes       |
//! | transport_unavailable | yes       |
//! | api_error             | yes       |
//! | server_error          | yes       |
//! | unknown               | yes       |
//! | auth_error            | no        |
//! | invalid_config        | no        |
//! | quota_exceeded        | no        |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error code attached to every backend/job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Watchdog expiry or request timeout.
    TransportTimeout,
    /// Connection refused / network unreachable.
    TransportUnavailable,
    /// Credentials rejected by the backend.
    AuthError,
    /// Missing or malformed configuration.
    InvalidConfig,
    /// Rate limit or account quota hit.
    QuotaExceeded,
    /// Backend returned a 4xx error response.
    ApiError,
    /// Backend returned a 5xx error response.
    ServerError,
    /// Anything not otherwise classified.
    Unknown,
}

impl ErrorCode {
    /// Whether the executor may retry after this error.
    ///
    /// `auth_error`, `invalid_config` and `quota_exceeded` fail fast;
    /// retrying them only burns attempts.
    pub fn is_retriable(self) -> bool {
        !matches!(
            self,
            ErrorCode::AuthError | ErrorCode::InvalidConfig | ErrorCode::QuotaExceeded
        )
    }

    /// Short operator-facing message for this code.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCode::TransportTimeout => {
                "Request timed out, backend may be slow to respond"
            }
            ErrorCode::TransportUnavailable => {
                "Transport unavailable, check network connection or backend status"
            }
            ErrorCode::AuthError => "Authentication failed, check API key or credentials",
            ErrorCode::InvalidConfig => "Invalid configuration, check your settings",
            ErrorCode::QuotaExceeded => {
                "Quota exceeded, rate limit reached or account limit exceeded"
            }
            ErrorCode::ApiError => "API error, backend returned an error response",
            ErrorCode::ServerError => "Server error, backend temporarily unavailable",
            ErrorCode::Unknown => "An unknown error occurred",
        }
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorCode::AuthError,
            429 => ErrorCode::QuotaExceeded,
            s if s >= 500 => ErrorCode::ServerError,
            s if s >= 400 => ErrorCode::ApiError,
            _ => ErrorCode::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::TransportTimeout => "transport_timeout",
            ErrorCode::TransportUnavailable => "transport_unavailable",
            ErrorCode::AuthError => "auth_error",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::QuotaExceeded => "quota_exceeded",
            ErrorCode::ApiError => "api_error",
            ErrorCode::ServerError => "server_error",
            ErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Error from a backend transport.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportTimeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportUnavailable, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::TransportTimeout
        } else if err.is_connect() {
            ErrorCode::TransportUnavailable
        } else if let Some(status) = err.status() {
            ErrorCode::from_status(status.as_u16())
        } else {
            ErrorCode::Unknown
        };
        Self::new(code, err.to_string())
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Error from job execution.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] crate::jobs::StoreError),

    #[error("Artifact I/O error: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("Watchdog expired after {0}s")]
    WatchdogTimeout(u64),
}

impl ExecError {
    /// Stable code for this error, used for retry decisions and events.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecError::Backend(e) => e.code,
            ExecError::Store(_) => ErrorCode::Unknown,
            ExecError::Artifact(_) => ErrorCode::Unknown,
            ExecError::WatchdogTimeout(_) => ErrorCode::TransportTimeout,
        }
    }
}

/// Result type for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;
