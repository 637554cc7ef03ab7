//! Error taxonomy for the session layer.
//!
//! Remote clients classify transport failures into [`ApiError`]; the session
//! manager folds those into [`SessionError`], which is the only error type a
//! front-end ever sees.

use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Bad credentials. The user may retry.
    #[error("Invalid email or password")]
    Authentication,

    /// Too many consecutive failures for this email.
    #[error("Too many failed login attempts. Try again in {remaining_minutes} minute(s).")]
    Throttled { remaining_minutes: i64 },

    /// Wrong or malformed second-factor code.
    #[error("Invalid verification code")]
    TwoFactor,

    /// Idle timeout or failed revalidation. The session is already torn down
    /// and the caller should navigate to `redirect_to`.
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired { redirect_to: String },

    /// Transport failure talking to the remote service.
    #[error("Unable to reach the server: {0}")]
    Network(String),
}

impl SessionError {
    /// Whether the user can retry in place (inline form error) rather than
    /// being redirected.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SessionError::SessionExpired { .. })
    }
}

/// Failures reported by a [`crate::api::RemoteApi`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                ApiError::Unauthorized(err.to_string())
            }
            Some(status) => ApiError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ApiError::Network(err.to_string()),
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(_) => SessionError::Authentication,
            // 400/422 from the login endpoint mean rejected credentials too
            ApiError::Status { status, .. } if (400..500).contains(&status) => {
                SessionError::Authentication
            }
            ApiError::Network(msg) => SessionError::Network(msg),
            ApiError::Status { message, .. } => SessionError::Network(message),
            ApiError::Decode(msg) => SessionError::Network(msg),
        }
    }
}
