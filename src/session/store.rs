//! The process-wide record of the current credential and profile.
//!
//! Role-agnostic: it knows about tokens, persistence modes, the tenant the
//! session was opened under and the loaded user, nothing about scopes.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::models::{PersistenceMode, Session, TenantConfig, User};
use crate::storage::{
    BrowserStorage, AUTH_TOKEN_KEY, SELECTED_ARTISAN_KEY, SELECTED_SELLER_KEY, TENANT_ID_KEY,
};

#[derive(Debug, Default)]
struct Loaded {
    session: Option<Session>,
    user: Option<User>,
    tenant_id: Option<String>,
    tenant_config: Option<TenantConfig>,
}

#[derive(Debug)]
pub struct SessionStore {
    storage: BrowserStorage,
    loaded: RwLock<Loaded>,
}

impl SessionStore {
    pub fn new(storage: BrowserStorage) -> Self {
        Self {
            storage,
            loaded: RwLock::new(Loaded::default()),
        }
    }

    pub fn storage(&self) -> &BrowserStorage {
        &self.storage
    }

    /// Token left behind by an earlier process, and the scope it was found in.
    pub fn stored_token(&self) -> Option<(String, PersistenceMode)> {
        self.storage.find(AUTH_TOKEN_KEY)
    }

    /// Tenant recorded next to a stored token.
    pub fn stored_tenant(&self, mode: PersistenceMode) -> Option<String> {
        self.storage.scope(mode).get(TENANT_ID_KEY)
    }

    /// Write token and tenant into the scope picked at login and make sure
    /// the other scope holds neither.
    pub fn persist(&self, token: &str, mode: PersistenceMode, tenant_id: &str) {
        let other = self.storage.scope(mode.other());
        other.remove(AUTH_TOKEN_KEY);
        other.remove(TENANT_ID_KEY);

        let scope = self.storage.scope(mode);
        scope.set(AUTH_TOKEN_KEY, token);
        scope.set(TENANT_ID_KEY, tenant_id);
    }

    /// Install the in-memory session after a login or restore.
    pub fn load(
        &self,
        session: Session,
        user: User,
        tenant_id: String,
        tenant_config: Option<TenantConfig>,
    ) {
        let mut loaded = self.loaded.write();
        loaded.session = Some(session);
        loaded.user = Some(user);
        loaded.tenant_id = Some(tenant_id);
        loaded.tenant_config = tenant_config;
    }

    /// Drop every session artifact from memory and from both storage scopes,
    /// hierarchy selections included.
    pub fn clear(&self) {
        for key in [
            AUTH_TOKEN_KEY,
            TENANT_ID_KEY,
            SELECTED_SELLER_KEY,
            SELECTED_ARTISAN_KEY,
        ] {
            self.storage.remove_everywhere(key);
        }
        *self.loaded.write() = Loaded::default();
    }

    pub fn touch(&self, now: DateTime<Utc>) {
        if let Some(session) = self.loaded.write().session.as_mut() {
            session.last_activity = now;
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.loaded.read().session.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.loaded.read().user.clone()
    }

    pub fn tenant_id(&self) -> Option<String> {
        self.loaded.read().tenant_id.clone()
    }

    pub fn tenant_config(&self) -> Option<TenantConfig> {
        self.loaded.read().tenant_config.clone()
    }
}
