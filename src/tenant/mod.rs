//! Tenant resolution and tenant-qualified path building.
//!
//! URLs follow `/:tenant/admin/<rest>`. A tenant-less `/login` is accepted as
//! the legacy form. Every redirect in the crate is built here so it never
//! drifts from the active tenant.

pub mod theme;

pub use theme::{LoggingTheme, ThemeApplier};

use lazy_static::lazy_static;
use regex::Regex;

use crate::storage::{BrowserStorage, TENANT_ID_KEY};

/// Sentinel used when neither the URL nor storage names a tenant.
pub const DEFAULT_TENANT: &str = "default";

const ADMIN_SEGMENT: &str = "admin";

lazy_static! {
    static ref TENANT_SLUG: Regex = Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").unwrap();
}

/// Where the active tenant came from, in order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantSource {
    Route,
    Stored,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub id: String,
    pub source: TenantSource,
}

impl ResolvedTenant {
    /// The tenant to qualify paths with; the sentinel qualifies nothing.
    pub fn scoped(&self) -> Option<&str> {
        match self.source {
            TenantSource::Route | TenantSource::Stored => Some(&self.id),
            TenantSource::Default => None,
        }
    }
}

/// A path split into its tenant and the part below `/admin/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantPath<'a> {
    pub tenant: Option<&'a str>,
    pub rest: &'a str,
}

pub fn is_valid_tenant(id: &str) -> bool {
    TENANT_SLUG.is_match(id) && id != ADMIN_SEGMENT
}

/// Split `/acme/admin/orders?x=1` into (`acme`, `orders`). Paths without the
/// tenant prefix come back with `tenant: None` and the whole path as `rest`.
pub fn split_path(path: &str) -> TenantPath<'_> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_matches('/');

    let mut parts = trimmed.splitn(3, '/');
    if let (Some(tenant), Some(ADMIN_SEGMENT)) = (parts.next(), parts.next()) {
        if is_valid_tenant(tenant) {
            return TenantPath {
                tenant: Some(tenant),
                rest: parts.next().unwrap_or_default().trim_end_matches('/'),
            };
        }
    }

    TenantPath {
        tenant: None,
        rest: trimmed,
    }
}

/// Route parameter, then stored tenant id, then the `default` sentinel.
pub fn resolve(path: &str, storage: &BrowserStorage) -> ResolvedTenant {
    if let Some(tenant) = split_path(path).tenant {
        return ResolvedTenant {
            id: tenant.to_string(),
            source: TenantSource::Route,
        };
    }

    if let Some((stored, _)) = storage.find(TENANT_ID_KEY) {
        if is_valid_tenant(&stored) {
            return ResolvedTenant {
                id: stored,
                source: TenantSource::Stored,
            };
        }
        tracing::debug!(tenant_id = %stored, "Ignoring malformed stored tenant id");
    }

    ResolvedTenant {
        id: DEFAULT_TENANT.to_string(),
        source: TenantSource::Default,
    }
}

/// `("acme", "login")` becomes `/acme/admin/login`; without a tenant the bare
/// path is returned (`/login`).
pub fn tenant_path(tenant: Option<&str>, bare: &str) -> String {
    let bare = bare.trim_start_matches('/');
    match tenant.filter(|t| !t.is_empty() && *t != DEFAULT_TENANT) {
        Some(tenant) => format!("/{}/{}/{}", tenant, ADMIN_SEGMENT, bare),
        None => format!("/{}", bare),
    }
}

pub fn login_path(tenant: Option<&str>) -> String {
    tenant_path(tenant, "login")
}

/// Login path carrying the flag the login screen uses to show its
/// "session expired" banner.
pub fn expired_login_path(tenant: Option<&str>) -> String {
    format!("{}?expired=true", login_path(tenant))
}

/// Login path remembering where the user was headed.
pub fn login_path_with_return(tenant: Option<&str>, return_to: &str) -> String {
    format!(
        "{}?redirect={}",
        login_path(tenant),
        urlencoding::encode(return_to)
    )
}

pub fn forgot_password_path(tenant: Option<&str>) -> String {
    tenant_path(tenant, "forgot-password")
}

/// Pages reachable without a session.
pub fn is_public(rest: &str) -> bool {
    matches!(rest, "login" | "forgot-password")
}
