//! Operator identity and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator roles. Every decision that depends on the role is a single
/// exhaustive match on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Role {
    /// Unrestricted cross-seller and cross-artisan visibility
    SuperAdmin,
    /// Scoped to one shop, may pick among its artisans
    Seller,
    /// Scoped to one maker, nothing selectable
    Artisan,
    /// Read-only operator; treated as the most restrictive role
    Viewer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Seller, Role::Artisan, Role::Viewer];

    /// Whether the seller half of the hierarchy scope is selectable.
    pub fn can_select_seller(&self) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Seller | Role::Artisan | Role::Viewer => false,
        }
    }

    /// Whether the artisan half of the hierarchy scope is selectable.
    pub fn can_select_artisan(&self) -> bool {
        match self {
            Role::SuperAdmin | Role::Seller => true,
            Role::Artisan | Role::Viewer => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Seller => "seller",
            Role::Artisan => "artisan",
            Role::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "super_admin" => Ok(Role::SuperAdmin),
            "seller" => Ok(Role::Seller),
            "artisan" => Ok(Role::Artisan),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Unknown role strings from the server collapse to the least privileged role.
impl From<String> for Role {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Role::Viewer)
    }
}

/// The authenticated operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: String,
    /// Set for seller and artisan operators; fixed for the session
    #[serde(default)]
    pub seller_id: Option<String>,
    /// Set for artisan operators; fixed for the session
    #[serde(default)]
    pub artisan_id: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}
