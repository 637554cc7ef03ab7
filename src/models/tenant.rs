use serde::{Deserialize, Serialize};

/// Branding bound to a tenant, applied at login and cleared at logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub id: String,
    pub name: String,
    pub subdomain: String,
    #[serde(default)]
    pub theme: ThemeTokens,
}

/// Color tokens handed to the theming collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeTokens {
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}
