//! Credential bookkeeping and remote login payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TenantConfig, User};

/// Where the token lives. Decided once at login from "remember me".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Survives a browser restart
    Durable,
    /// Cleared when the browser closes
    Ephemeral,
}

impl PersistenceMode {
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            PersistenceMode::Durable
        } else {
            PersistenceMode::Ephemeral
        }
    }

    pub fn other(&self) -> Self {
        match self {
            PersistenceMode::Durable => PersistenceMode::Ephemeral,
            PersistenceMode::Ephemeral => PersistenceMode::Durable,
        }
    }
}

/// The active credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    /// Server-side session identifier used for out-of-band verification
    pub session_id: Option<String>,
    pub mode: PersistenceMode,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle states of the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    PendingTwoFactor { session_id: String },
    Authenticated,
    /// Idle long enough to warn; activity returns to `Authenticated`
    Expiring,
    LoggedOut,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Expiring)
    }
}

/// Body of `POST login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response of `POST login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub requires_two_factor: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tenant_config: Option<TenantConfig>,
}

/// Body of `POST verify-2fa`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    pub code: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyTwoFactorResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySessionResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}
