//! Application root: one session manager and one hierarchy scope, built once
//! and handed to everything that needs them.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

use crate::api::RemoteApi;
use crate::config::Config;
use crate::error::SessionError;
use crate::guard::{AuthorizationGate, GateContext, GateDecision};
use crate::hierarchy::HierarchyScope;
use crate::models::{Artisan, Seller, User};
use crate::router::{RoleRouter, Route};
use crate::session::{spawn_idle_monitor, IdleMonitorHandle, LoginOutcome, SessionManager};
use crate::storage::BrowserStorage;
use crate::tenant::{self, ResolvedTenant};

/// Result of resolving one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub tenant: ResolvedTenant,
    pub decision: GateDecision,
    /// The route that renders, when the decision is `Render` on a protected path
    pub route: Option<&'static Route>,
}

pub struct Console {
    api: Arc<dyn RemoteApi>,
    manager: Arc<SessionManager>,
    scope: Mutex<HierarchyScope>,
    idle_monitor: Mutex<Option<IdleMonitorHandle>>,
    idle_check_interval: Duration,
}

impl Console {
    pub fn new(config: &Config, api: Arc<dyn RemoteApi>, storage: BrowserStorage) -> Self {
        let manager = SessionManager::new(api.clone(), storage, config);
        Self::with_manager(config, api, manager)
    }

    /// Build around a pre-configured manager (custom clock, theme or
    /// attempt store).
    pub fn with_manager(config: &Config, api: Arc<dyn RemoteApi>, manager: SessionManager) -> Self {
        let scope = HierarchyScope::new(manager.storage().clone());
        Self {
            api,
            manager: Arc::new(manager),
            scope: Mutex::new(scope),
            idle_monitor: Mutex::new(None),
            idle_check_interval: Duration::from_secs(config.session.idle_check_interval_secs.max(1)),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// The scope for the signed-in operator. Do not hold across an await.
    pub fn scope(&self) -> MutexGuard<'_, HierarchyScope> {
        let mut scope = self.scope.lock();
        if self.manager.user().is_none() && scope.role().is_some() {
            // Torn down by a background check since the last look
            scope.reset();
            self.idle_monitor.lock().take();
        }
        scope
    }

    /// Restore a stored session, if any, and seed the scope from it.
    pub async fn start(&self) -> Option<User> {
        let user = self.manager.restore().await?;
        self.enter(&user).await;
        Some(user)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        tenant_id: &str,
    ) -> Result<LoginOutcome, SessionError> {
        // The manager ends any earlier session; drop its scope with it
        self.leave();
        let outcome = self
            .manager
            .login(email, password, remember_me, tenant_id)
            .await?;
        if let LoginOutcome::Authenticated(user) = &outcome {
            self.enter(user).await;
        }
        Ok(outcome)
    }

    pub async fn verify_two_factor(
        &self,
        code: &str,
        pending_session_id: &str,
    ) -> Result<User, SessionError> {
        let user = self
            .manager
            .verify_two_factor(code, pending_session_id)
            .await?;
        self.enter(&user).await;
        Ok(user)
    }

    /// Returns the login path to navigate to.
    pub async fn logout(&self) -> String {
        self.leave();
        self.manager.logout().await
    }

    pub async fn check_session(&self) -> Result<bool, SessionError> {
        let result = self.manager.check_session().await;
        if result.is_err() {
            self.leave();
        }
        result
    }

    async fn enter(&self, user: &User) {
        let (sellers, artisans) = self.load_directory().await;
        self.scope.lock().initialize(user, sellers, artisans);

        let handle = spawn_idle_monitor(self.manager.clone(), self.idle_check_interval);
        if let Some(previous) = self.idle_monitor.lock().replace(handle) {
            previous.cancel();
        }
    }

    fn leave(&self) {
        if let Some(handle) = self.idle_monitor.lock().take() {
            handle.cancel();
        }
        self.scope.lock().reset();
    }

    /// Sellers and artisans for the signed-in tenant. A failed fetch leaves
    /// the lists empty rather than failing the login.
    async fn load_directory(&self) -> (Vec<Seller>, Vec<Artisan>) {
        let (Some(session), Some(tenant_id)) = (self.manager.session(), self.manager.tenant_id())
        else {
            return (Vec::new(), Vec::new());
        };

        let sellers = match self.api.list_sellers(&session.token, &tenant_id).await {
            Ok(sellers) => sellers,
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Failed to load sellers");
                Vec::new()
            }
        };
        let artisans = match self.api.list_artisans(&session.token, &tenant_id).await {
            Ok(artisans) => artisans,
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Failed to load artisans");
                Vec::new()
            }
        };
        (sellers, artisans)
    }

    /// Resolve the tenant, run the gate for the path's route and pick the
    /// route from the operator's table.
    pub fn navigate(&self, path: &str) -> Navigation {
        let resolved = tenant::resolve(path, self.manager.storage());
        let rest = tenant::split_path(path).rest;

        if tenant::is_public(rest) {
            return Navigation {
                tenant: resolved,
                decision: GateDecision::Render,
                route: None,
            };
        }

        let user = self.manager.user();
        let gate = AuthorizationGate::require(RoleRouter::permitted_roles(rest));
        let decision = gate.evaluate(&GateContext {
            loading: self.manager.is_loading(),
            user: user.as_ref(),
            tenant: resolved.scoped(),
            requested_path: path,
        });

        let route = match (&decision, &user) {
            (GateDecision::Render, Some(user)) => RoleRouter::table(user.role).find(rest),
            _ => None,
        };

        tracing::debug!(path = %path, tenant_id = %resolved.id, decision = ?decision, "Navigation");
        Navigation {
            tenant: resolved,
            decision,
            route,
        }
    }
}
