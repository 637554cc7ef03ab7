use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of entries kept in the login activity log.
pub const LOGIN_ACTIVITY_CAP: usize = 50;

/// One login attempt, as recorded in durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginActivity {
    pub email: String,
    pub tenant_id: String,
    pub success: bool,
    pub at: DateTime<Utc>,
}
