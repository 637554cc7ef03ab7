//! Per-route guard deciding whether a protected view renders.

use crate::models::{Role, User};
use crate::router::RoleRouter;
use crate::tenant;

/// What the caller should do with the requested view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Session restoration is in flight; show a loading indicator
    Loading,
    /// No authenticated user. `to` carries `return_to` for after login.
    RedirectToLogin { to: String, return_to: String },
    /// Role outside the permitted set; go to the role's own dashboard
    RedirectToDashboard { to: String },
    Render,
}

/// Session facts the gate reads. Built fresh for every navigation.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub loading: bool,
    pub user: Option<&'a User>,
    /// Tenant redirects are qualified with
    pub tenant: Option<&'a str>,
    pub requested_path: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    permitted: Option<Vec<Role>>,
}

impl AuthorizationGate {
    /// Any authenticated user may pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the listed roles may pass.
    pub fn require(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            permitted: Some(roles.into_iter().collect()),
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.permitted
            .as_ref()
            .map_or(true, |roles| roles.contains(&role))
    }

    pub fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if ctx.loading {
            return GateDecision::Loading;
        }

        let Some(user) = ctx.user else {
            return GateDecision::RedirectToLogin {
                to: tenant::login_path_with_return(ctx.tenant, ctx.requested_path),
                return_to: ctx.requested_path.to_string(),
            };
        };

        if !self.permits(user.role) {
            let to = RoleRouter::dashboard_path(user.role, ctx.tenant);
            tracing::debug!(
                role = %user.role,
                requested = %ctx.requested_path,
                redirect_to = %to,
                "Role not permitted here"
            );
            return GateDecision::RedirectToDashboard { to };
        }

        GateDecision::Render
    }
}
