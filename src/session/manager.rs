//! Session lifecycle: login, second factor, restore, idle expiry, logout.

use chrono::Duration;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::idle::{ActivitySignal, IdleStatus};
use super::store::SessionStore;
use super::throttle::{InMemoryAttemptStore, LoginAttemptStore, LoginThrottle};
use crate::api::{RemoteApi, PASSWORD_RESET_MESSAGE};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{ApiError, SessionError};
use crate::models::{
    LoginActivity, LoginResponse, PersistenceMode, Session, SessionState, TenantConfig, User,
};
use crate::storage::BrowserStorage;
use crate::tenant::{self, LoggingTheme, ThemeApplier, DEFAULT_TENANT};

lazy_static! {
    static ref TWO_FACTOR_CODE: Regex = Regex::new(r"^\d{6}$").unwrap();
}

/// Broadcast to front-ends so they can react to transitions they did not
/// initiate (timers, revalidation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String, tenant_id: String },
    TwoFactorRequired { session_id: String },
    IdleWarning { remaining: Duration },
    Expired { redirect_to: String },
    LoggedOut { redirect_to: String },
}

/// Result of a password login.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(User),
    TwoFactorRequired { session_id: String },
}

#[derive(Debug, Clone)]
struct PendingChallenge {
    session_id: String,
    email: String,
    response: LoginResponse,
    remember_me: bool,
    tenant_id: String,
    failed_attempts: u32,
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    restoring: bool,
    pending: Option<PendingChallenge>,
    warned: bool,
}

/// The server understood the request and said no, as opposed to failing.
fn is_rejection(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::Unauthorized(_) | ApiError::Status { status: 400..=499, .. }
    )
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Logout,
    Expired,
}

pub struct SessionManager {
    api: Arc<dyn RemoteApi>,
    store: SessionStore,
    throttle: LoginThrottle,
    clock: Arc<dyn Clock>,
    theme: Arc<dyn ThemeApplier>,
    idle_timeout: Duration,
    idle_warning: Duration,
    absolute_lifetime: Duration,
    logout_timeout: std::time::Duration,
    two_factor_max_attempts: Option<u32>,
    lifecycle: Mutex<Lifecycle>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn RemoteApi>, storage: BrowserStorage, config: &Config) -> Self {
        let (events, _) = broadcast::channel(32);
        let session = &config.session;
        Self {
            api,
            store: SessionStore::new(storage),
            throttle: LoginThrottle::new(Arc::new(InMemoryAttemptStore::new()), &config.lockout),
            clock: Arc::new(SystemClock),
            theme: Arc::new(LoggingTheme),
            idle_timeout: Duration::seconds(session.idle_timeout_secs as i64),
            idle_warning: Duration::seconds(session.idle_warning_secs as i64),
            absolute_lifetime: Duration::seconds(session.absolute_lifetime_secs as i64),
            logout_timeout: std::time::Duration::from_secs(config.api.logout_timeout_secs),
            two_factor_max_attempts: session.two_factor_max_attempts,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Anonymous,
                restoring: false,
                pending: None,
                warned: false,
            }),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_theme(mut self, theme: Arc<dyn ThemeApplier>) -> Self {
        self.theme = theme;
        self
    }

    /// Swap the failure counter store, keeping the lockout policy.
    pub fn with_attempt_store(mut self, store: Arc<dyn LoginAttemptStore>) -> Self {
        self.throttle = self.throttle.with_store(store);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state.clone()
    }

    /// True while a stored session is being restored.
    pub fn is_loading(&self) -> bool {
        self.lifecycle.lock().restoring
    }

    pub fn user(&self) -> Option<User> {
        self.store.user()
    }

    pub fn session(&self) -> Option<Session> {
        self.store.session()
    }

    pub fn tenant_id(&self) -> Option<String> {
        self.store.tenant_id()
    }

    pub fn tenant_config(&self) -> Option<TenantConfig> {
        self.store.tenant_config()
    }

    pub fn storage(&self) -> &BrowserStorage {
        self.store.storage()
    }

    pub fn login_activity(&self) -> Vec<LoginActivity> {
        self.store.storage().login_activity()
    }

    fn set_state(&self, state: SessionState) {
        let mut lifecycle = self.lifecycle.lock();
        tracing::debug!(from = ?lifecycle.state, to = ?state, "Session state transition");
        lifecycle.state = state;
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn record_activity_log(&self, email: &str, tenant_id: &str, success: bool) {
        self.store.storage().record_login_activity(LoginActivity {
            email: email.to_string(),
            tenant_id: tenant_id.to_string(),
            success,
            at: self.clock.now(),
        });
    }

    /// Password login. The lockout check runs before any network call.
    ///
    /// Any session or pending challenge from an earlier login is ended first,
    /// so a failed attempt always leaves the manager anonymous with nothing
    /// stored.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        tenant_id: &str,
    ) -> Result<LoginOutcome, SessionError> {
        if self.store.session().is_some() {
            tracing::info!(email = %email, "Signing in over an existing session, ending it first");
            self.end_session(Teardown::Logout).await;
        } else {
            let stale = self.lifecycle.lock().pending.take();
            if let Some(stale) = stale {
                tracing::debug!(session_id = %stale.session_id, "Discarding pending second factor challenge");
                self.set_state(SessionState::Anonymous);
            }
        }

        self.throttle.check(email, self.clock.now())?;
        self.set_state(SessionState::Authenticating);

        let response = match self.api.login(email, password).await {
            Ok(response) => response,
            Err(e) => return Err(self.login_failed(email, tenant_id, e)),
        };

        self.throttle.record_success(email);

        if response.requires_two_factor {
            let Some(session_id) = response.session_id.clone() else {
                self.set_state(SessionState::Anonymous);
                return Err(SessionError::Network(
                    "login response requested a second factor without a session id".into(),
                ));
            };

            {
                let mut lifecycle = self.lifecycle.lock();
                lifecycle.pending = Some(PendingChallenge {
                    session_id: session_id.clone(),
                    email: email.to_string(),
                    response,
                    remember_me,
                    tenant_id: tenant_id.to_string(),
                    failed_attempts: 0,
                });
                lifecycle.state = SessionState::PendingTwoFactor {
                    session_id: session_id.clone(),
                };
            }

            tracing::info!(email = %email, "Second factor required");
            self.emit(SessionEvent::TwoFactorRequired {
                session_id: session_id.clone(),
            });
            return Ok(LoginOutcome::TwoFactorRequired { session_id });
        }

        let user = self.establish(email, response, remember_me, tenant_id)?;
        Ok(LoginOutcome::Authenticated(user))
    }

    fn login_failed(&self, email: &str, tenant_id: &str, err: ApiError) -> SessionError {
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.pending = None;
            lifecycle.state = SessionState::Anonymous;
        }
        let err = SessionError::from(err);

        if err != SessionError::Authentication {
            tracing::warn!(email = %email, error = %err, "Login request failed");
            return err;
        }

        self.record_activity_log(email, tenant_id, false);
        match self.throttle.record_failure(email, self.clock.now()) {
            Some(_) => SessionError::Throttled {
                remaining_minutes: self.throttle.lockout_minutes(),
            },
            None => {
                tracing::info!(
                    email = %email,
                    failures = self.throttle.failures(email),
                    "Login rejected"
                );
                err
            }
        }
    }

    /// Submit one second-factor code for the pending challenge.
    pub async fn verify_two_factor(
        &self,
        code: &str,
        pending_session_id: &str,
    ) -> Result<User, SessionError> {
        let pending = {
            let lifecycle = self.lifecycle.lock();
            match &lifecycle.pending {
                Some(p) if p.session_id == pending_session_id => p.clone(),
                _ => return Err(SessionError::TwoFactor),
            }
        };

        let code = code.trim();
        if !TWO_FACTOR_CODE.is_match(code) {
            return Err(SessionError::TwoFactor);
        }

        let verified = match self.api.verify_two_factor(code, pending_session_id).await {
            Ok(verified) => verified,
            Err(e) if is_rejection(&e) => {
                tracing::debug!(error = %e, "Second factor rejected by server");
                false
            }
            Err(e) => return Err(SessionError::Network(e.to_string())),
        };

        // The challenge may have been cancelled while the call was in flight
        let still_pending = matches!(
            &self.lifecycle.lock().pending,
            Some(p) if p.session_id == pending_session_id
        );
        if !still_pending {
            return Err(SessionError::TwoFactor);
        }

        if !verified {
            self.two_factor_failed(pending_session_id);
            return Err(SessionError::TwoFactor);
        }

        self.establish(
            &pending.email,
            pending.response,
            pending.remember_me,
            &pending.tenant_id,
        )
    }

    fn two_factor_failed(&self, session_id: &str) {
        let mut lifecycle = self.lifecycle.lock();
        let Some(pending) = lifecycle.pending.as_mut() else {
            return;
        };
        pending.failed_attempts += 1;
        let failed = pending.failed_attempts;

        match self.two_factor_max_attempts {
            Some(max) if failed >= max => {
                tracing::warn!(session_id = %session_id, attempts = failed, "Second factor challenge abandoned");
                lifecycle.pending = None;
                lifecycle.state = SessionState::Anonymous;
            }
            _ => {
                tracing::info!(session_id = %session_id, attempts = failed, "Invalid second factor code");
            }
        }
    }

    /// Abandon a pending second-factor challenge.
    pub fn cancel_two_factor(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.pending.take().is_some() {
            lifecycle.state = SessionState::Anonymous;
        }
    }

    /// Persist and load a fully authenticated session.
    fn establish(
        &self,
        email: &str,
        response: LoginResponse,
        remember_me: bool,
        tenant_id: &str,
    ) -> Result<User, SessionError> {
        let (Some(token), Some(user)) = (response.token, response.user) else {
            self.set_state(SessionState::Anonymous);
            return Err(SessionError::Network(
                "login response is missing the user or token".into(),
            ));
        };

        let tenant_id = if tenant_id.is_empty() || tenant_id == DEFAULT_TENANT {
            user.tenant_id.clone()
        } else {
            tenant_id.to_string()
        };

        let now = self.clock.now();
        let mode = PersistenceMode::from_remember_me(remember_me);
        let session = Session {
            token,
            session_id: response.session_id,
            mode,
            last_activity: now,
            expires_at: now + self.absolute_lifetime,
        };

        self.store.persist(&session.token, mode, &tenant_id);
        if let Some(config) = &response.tenant_config {
            self.theme.apply(config);
        }
        self.store
            .load(session, user.clone(), tenant_id.clone(), response.tenant_config);

        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.pending = None;
            lifecycle.warned = false;
            lifecycle.state = SessionState::Authenticated;
        }

        self.record_activity_log(email, &tenant_id, true);
        tracing::info!(
            user_id = %user.id,
            role = %user.role,
            tenant_id = %tenant_id,
            persistence = ?mode,
            "Signed in"
        );
        self.emit(SessionEvent::LoggedIn {
            user_id: user.id.clone(),
            tenant_id,
        });
        Ok(user)
    }

    /// Restore a session from a stored token. Any failure silently clears
    /// the stored artifacts and leaves the manager anonymous.
    pub async fn restore(&self) -> Option<User> {
        let (token, mode) = self.store.stored_token()?;
        let tenant_id = self
            .store
            .stored_tenant(mode)
            .unwrap_or_else(|| DEFAULT_TENANT.to_string());

        self.lifecycle.lock().restoring = true;
        let result = self.api.me(&token, &tenant_id).await;
        self.lifecycle.lock().restoring = false;

        match result {
            Ok(user) => {
                let now = self.clock.now();
                let session = Session {
                    token,
                    session_id: None,
                    mode,
                    last_activity: now,
                    expires_at: now + self.absolute_lifetime,
                };
                self.store.load(session, user.clone(), tenant_id, None);
                {
                    let mut lifecycle = self.lifecycle.lock();
                    lifecycle.warned = false;
                    lifecycle.state = SessionState::Authenticated;
                }
                tracing::info!(user_id = %user.id, role = %user.role, "Restored session");
                Some(user)
            }
            Err(e) => {
                tracing::info!(error = %e, "Stored session rejected, clearing it");
                self.store.clear();
                self.set_state(SessionState::Anonymous);
                None
            }
        }
    }

    /// Best-effort server logout followed by unconditional local teardown.
    /// Returns the login path to navigate to.
    pub async fn logout(&self) -> String {
        self.end_session(Teardown::Logout).await
    }

    async fn end_session(&self, reason: Teardown) -> String {
        let token = self.store.session().map(|s| s.token);
        let tenant_id = self.store.tenant_id();

        if let Some(token) = token {
            match tokio::time::timeout(self.logout_timeout, self.api.logout(&token)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Server logout failed, continuing locally"),
                Err(_) => tracing::warn!("Server logout timed out, continuing locally"),
            }
        }

        self.store.clear();
        self.theme.clear();
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.pending = None;
            lifecycle.warned = false;
            lifecycle.state = SessionState::LoggedOut;
        }

        let tenant = tenant_id.as_deref();
        let (redirect_to, event) = match reason {
            Teardown::Logout => {
                let to = tenant::login_path(tenant);
                (to.clone(), SessionEvent::LoggedOut { redirect_to: to })
            }
            Teardown::Expired => {
                let to = tenant::expired_login_path(tenant);
                (to.clone(), SessionEvent::Expired { redirect_to: to })
            }
        };

        tracing::info!(redirect_to = %redirect_to, reason = ?reason, "Session ended");
        self.set_state(SessionState::Anonymous);
        self.emit(event);
        redirect_to
    }

    /// Out-of-band validation (e.g. tab refocus). A negative answer or an
    /// error tears the session down.
    pub async fn check_session(&self) -> Result<bool, SessionError> {
        let Some(session) = self.store.session() else {
            return Ok(false);
        };
        let id = session.session_id.unwrap_or(session.token);

        match self.api.verify_session(&id).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::info!("Server no longer recognises the session");
                let redirect_to = self.end_session(Teardown::Expired).await;
                Err(SessionError::SessionExpired { redirect_to })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session verification failed");
                let redirect_to = self.end_session(Teardown::Expired).await;
                Err(SessionError::SessionExpired { redirect_to })
            }
        }
    }

    pub fn record_activity(&self, signal: ActivitySignal) {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.state.is_authenticated() {
            return;
        }
        self.store.touch(self.clock.now());
        if lifecycle.state == SessionState::Expiring {
            tracing::debug!(signal = ?signal, "Activity resumed");
            lifecycle.state = SessionState::Authenticated;
        }
        lifecycle.warned = false;
    }

    /// One pass of the idle rule: warn past the warning threshold, tear down
    /// at the timeout or past the absolute horizon.
    pub async fn check_idle(&self) -> IdleStatus {
        if !self.state().is_authenticated() {
            return IdleStatus::Inactive;
        }
        let Some(session) = self.store.session() else {
            return IdleStatus::Inactive;
        };

        let now = self.clock.now();
        let idle = now - session.last_activity;

        if idle >= self.idle_timeout || now >= session.expires_at {
            let redirect_to = self.end_session(Teardown::Expired).await;
            return IdleStatus::Expired { redirect_to };
        }

        if idle >= self.idle_warning {
            let remaining = self.idle_timeout - idle;
            let first_warning = {
                let mut lifecycle = self.lifecycle.lock();
                let first = !lifecycle.warned;
                lifecycle.warned = true;
                lifecycle.state = SessionState::Expiring;
                first
            };
            if first_warning {
                tracing::info!(remaining_secs = remaining.num_seconds(), "Session idle warning");
                self.emit(SessionEvent::IdleWarning { remaining });
            }
            return IdleStatus::Warning { remaining };
        }

        IdleStatus::Active
    }

    /// Always answers with the same generic message so the reply never
    /// reveals whether the email exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<&'static str, SessionError> {
        match self.api.request_password_reset(email).await {
            Ok(()) => Ok(PASSWORD_RESET_MESSAGE),
            Err(e) if is_rejection(&e) => {
                tracing::debug!(error = %e, "Password reset request rejected");
                Ok(PASSWORD_RESET_MESSAGE)
            }
            Err(e) => Err(SessionError::Network(e.to_string())),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockApi, MOCK_PASSWORD, MOCK_TWO_FACTOR_CODE};
    use crate::clock::ManualClock;
    use crate::storage::{AUTH_TOKEN_KEY, SELECTED_ARTISAN_KEY, SELECTED_SELLER_KEY, TENANT_ID_KEY};

    struct Harness {
        api: Arc<MockApi>,
        clock: Arc<ManualClock>,
        storage: BrowserStorage,
        manager: SessionManager,
    }

    fn harness_with(config: Config, storage: BrowserStorage) -> Harness {
        let api = Arc::new(MockApi::seeded());
        let clock = Arc::new(ManualClock::default());
        let manager = SessionManager::new(api.clone(), storage.clone(), &config)
            .with_clock(clock.clone());
        Harness {
            api,
            clock,
            storage,
            manager,
        }
    }

    fn harness() -> Harness {
        harness_with(Config::default(), BrowserStorage::in_memory())
    }

    #[tokio::test]
    async fn test_remember_me_uses_durable_storage_only() {
        let h = harness();
        let outcome = h
            .manager
            .login("admin@acme.test", MOCK_PASSWORD, true, "acme")
            .await
            .unwrap();

        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        assert_eq!(h.manager.state(), SessionState::Authenticated);
        assert!(h.storage.durable().get(AUTH_TOKEN_KEY).is_some());
        assert_eq!(h.storage.durable().get(TENANT_ID_KEY).as_deref(), Some("acme"));
        assert!(h.storage.ephemeral().get(AUTH_TOKEN_KEY).is_none());
        assert_eq!(h.manager.tenant_config().unwrap().id, "acme");
    }

    #[tokio::test]
    async fn test_without_remember_me_uses_ephemeral_storage() {
        let h = harness();
        h.manager
            .login("seller@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();

        assert!(h.storage.ephemeral().get(AUTH_TOKEN_KEY).is_some());
        assert!(h.storage.durable().get(AUTH_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let h = harness();
        let err = h
            .manager
            .login("admin@acme.test", "wrong", true, "acme")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Authentication);
        assert_eq!(h.manager.state(), SessionState::Anonymous);

        let log = h.manager.login_activity();
        assert_eq!(log.len(), 1);
        assert!(!log[0].success);
    }

    #[tokio::test]
    async fn test_lockout_blocks_before_network() {
        let h = harness();
        for attempt in 1..=5 {
            let err = h
                .manager
                .login("admin@acme.test", "wrong", false, "acme")
                .await
                .unwrap_err();
            if attempt < 5 {
                assert_eq!(err, SessionError::Authentication);
            } else {
                assert_eq!(err, SessionError::Throttled { remaining_minutes: 15 });
            }
        }
        assert_eq!(h.api.login_calls(), 5);

        // Even the right password is refused without reaching the server
        let err = h
            .manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Throttled { .. }));
        assert_eq!(h.api.login_calls(), 5);

        // Lockout ends exactly fifteen minutes later
        h.clock.advance(Duration::minutes(15) - Duration::seconds(1));
        assert!(h
            .manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .is_err());
        h.clock.advance(Duration::seconds(1));
        assert!(h
            .manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_shared_attempt_store_carries_lockout() {
        let attempts: Arc<dyn LoginAttemptStore> = Arc::new(InMemoryAttemptStore::new());
        let first = harness();
        let first_manager = first.manager.with_attempt_store(attempts.clone());
        for _ in 0..5 {
            let _ = first_manager
                .login("admin@acme.test", "wrong", false, "acme")
                .await;
        }

        let second = harness();
        let second_manager = second.manager.with_attempt_store(attempts);
        assert!(matches!(
            second_manager
                .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
                .await,
            Err(SessionError::Throttled { .. })
        ));
        assert_eq!(second.api.login_calls(), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let h = harness();
        for _ in 0..4 {
            let _ = h.manager.login("admin@acme.test", "wrong", false, "acme").await;
        }
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        h.manager.logout().await;

        for _ in 0..4 {
            let err = h
                .manager
                .login("admin@acme.test", "wrong", false, "acme")
                .await
                .unwrap_err();
            assert_eq!(err, SessionError::Authentication);
        }
    }

    #[tokio::test]
    async fn test_network_failure_is_not_counted() {
        let h = harness();
        h.api.set_offline(true);
        for _ in 0..6 {
            let err = h
                .manager
                .login("admin@acme.test", "wrong", false, "acme")
                .await
                .unwrap_err();
            assert!(matches!(err, SessionError::Network(_)));
        }
        h.api.set_offline(false);
        assert!(h
            .manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_two_factor_flow() {
        let h = harness();
        let outcome = h
            .manager
            .login("secure@acme.test", MOCK_PASSWORD, true, "acme")
            .await
            .unwrap();
        let LoginOutcome::TwoFactorRequired { session_id } = outcome else {
            panic!("expected a second factor challenge");
        };
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());
        assert!(h.manager.user().is_none());

        let err = h
            .manager
            .verify_two_factor("000000", &session_id)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::TwoFactor);
        assert_eq!(
            h.manager.state(),
            SessionState::PendingTwoFactor {
                session_id: session_id.clone()
            }
        );
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());

        let user = h
            .manager
            .verify_two_factor(MOCK_TWO_FACTOR_CODE, &session_id)
            .await
            .unwrap();
        assert_eq!(user.email, "secure@acme.test");
        assert_eq!(h.manager.state(), SessionState::Authenticated);
        assert!(h.storage.durable().get(AUTH_TOKEN_KEY).is_some());
    }

    #[tokio::test]
    async fn test_malformed_code_and_wrong_challenge() {
        let h = harness();
        let LoginOutcome::TwoFactorRequired { session_id } = h
            .manager
            .login("secure@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap()
        else {
            panic!("expected a second factor challenge");
        };

        assert_eq!(
            h.manager.verify_two_factor("12345", &session_id).await,
            Err(SessionError::TwoFactor)
        );
        assert_eq!(
            h.manager.verify_two_factor("123456", "other").await,
            Err(SessionError::TwoFactor)
        );
        assert!(matches!(
            h.manager.state(),
            SessionState::PendingTwoFactor { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_relogin_ends_previous_session() {
        let h = harness();
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, true, "acme")
            .await
            .unwrap();
        h.storage.durable().set(SELECTED_SELLER_KEY, "s-2");

        let err = h
            .manager
            .login("admin@acme.test", "wrong", true, "acme")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Authentication);
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(h.manager.user().is_none());
        assert!(h.manager.session().is_none());
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());
        assert!(h.storage.find(SELECTED_SELLER_KEY).is_none());
        assert_eq!(h.api.logout_calls(), 1);

        // Nothing left for the idle check to keep alive
        h.clock.advance(Duration::hours(2));
        assert_eq!(h.manager.check_idle().await, IdleStatus::Inactive);
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn test_new_login_discards_pending_challenge() {
        let h = harness();
        let LoginOutcome::TwoFactorRequired { session_id } = h
            .manager
            .login("secure@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap()
        else {
            panic!("expected a second factor challenge");
        };

        let err = h
            .manager
            .login("secure@acme.test", "wrong", false, "acme")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Authentication);
        assert_eq!(h.manager.state(), SessionState::Anonymous);

        assert_eq!(
            h.manager
                .verify_two_factor(MOCK_TWO_FACTOR_CODE, &session_id)
                .await,
            Err(SessionError::TwoFactor)
        );
        assert!(h.manager.user().is_none());
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());

        // A successful login for someone else cannot be hijacked by the old challenge
        let LoginOutcome::TwoFactorRequired { session_id } = h
            .manager
            .login("secure@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap()
        else {
            panic!("expected a second factor challenge");
        };
        h.manager
            .login("seller@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        assert_eq!(
            h.manager
                .verify_two_factor(MOCK_TWO_FACTOR_CODE, &session_id)
                .await,
            Err(SessionError::TwoFactor)
        );
        assert_eq!(h.manager.user().unwrap().email, "seller@acme.test");
    }

    #[tokio::test]
    async fn test_two_factor_attempt_cap_abandons_challenge() {
        let mut config = Config::default();
        config.session.two_factor_max_attempts = Some(2);
        let h = harness_with(config, BrowserStorage::in_memory());

        let LoginOutcome::TwoFactorRequired { session_id } = h
            .manager
            .login("secure@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap()
        else {
            panic!("expected a second factor challenge");
        };

        let _ = h.manager.verify_two_factor("111111", &session_id).await;
        assert!(matches!(
            h.manager.state(),
            SessionState::PendingTwoFactor { .. }
        ));
        let _ = h.manager.verify_two_factor("222222", &session_id).await;
        assert_eq!(h.manager.state(), SessionState::Anonymous);

        // The right code no longer helps
        assert_eq!(
            h.manager
                .verify_two_factor(MOCK_TWO_FACTOR_CODE, &session_id)
                .await,
            Err(SessionError::TwoFactor)
        );
    }

    #[tokio::test]
    async fn test_restore_reproduces_user() {
        let storage = BrowserStorage::in_memory();
        let first = harness_with(Config::default(), storage.clone());
        let LoginOutcome::Authenticated(user) = first
            .manager
            .login("artisan@acme.test", MOCK_PASSWORD, true, "acme")
            .await
            .unwrap()
        else {
            panic!("expected a direct login");
        };

        let second = harness_with(Config::default(), storage.clone());
        let restored = second.manager.restore().await.unwrap();
        assert_eq!(restored, user);
        assert_eq!(second.manager.state(), SessionState::Authenticated);

        let third = harness_with(Config::default(), storage);
        assert_eq!(third.manager.restore().await.unwrap(), restored);
    }

    #[tokio::test]
    async fn test_restore_with_rejected_token_is_clean() {
        let storage = BrowserStorage::in_memory();
        let first = harness_with(Config::default(), storage.clone());
        first
            .manager
            .login("admin@acme.test", MOCK_PASSWORD, true, "acme")
            .await
            .unwrap();
        storage.durable().set(SELECTED_SELLER_KEY, "s-2");

        let second = harness_with(Config::default(), storage.clone());
        second.api.revoke_user("u-admin");
        assert!(second.manager.restore().await.is_none());
        assert_eq!(second.manager.state(), SessionState::Anonymous);
        assert!(!second.manager.is_loading());
        assert!(storage.find(AUTH_TOKEN_KEY).is_none());
        assert!(storage.find(SELECTED_SELLER_KEY).is_none());
    }

    #[tokio::test]
    async fn test_restore_without_token_is_noop() {
        let h = harness();
        assert!(h.manager.restore().await.is_none());
        assert_eq!(h.manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_logout_clears_everything_even_when_server_fails() {
        let h = harness();
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, true, "acme")
            .await
            .unwrap();
        h.storage.durable().set(SELECTED_SELLER_KEY, "s-1");
        h.storage.durable().set(SELECTED_ARTISAN_KEY, "a-1");
        h.storage.ephemeral().set(SELECTED_ARTISAN_KEY, "a-2");
        h.api.set_fail_logout(true);

        let redirect = h.manager.logout().await;

        assert_eq!(redirect, "/acme/admin/login");
        assert_eq!(h.api.logout_calls(), 1);
        for key in [AUTH_TOKEN_KEY, TENANT_ID_KEY, SELECTED_SELLER_KEY, SELECTED_ARTISAN_KEY] {
            assert!(h.storage.find(key).is_none(), "{} should be cleared", key);
        }
        assert!(h.manager.user().is_none());
        assert!(h.manager.tenant_config().is_none());
        assert_eq!(h.manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_logout_when_offline() {
        let h = harness();
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        h.api.set_offline(true);
        assert_eq!(h.manager.logout().await, "/acme/admin/login");
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn test_logout_without_tenant_uses_bare_login() {
        let h = harness();
        assert_eq!(h.manager.logout().await, "/login");
        assert_eq!(h.api.logout_calls(), 0);
    }

    #[tokio::test]
    async fn test_idle_timeout_boundaries() {
        let h = harness();
        let mut events = h.manager.subscribe();
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedIn { .. })));

        h.clock.advance(Duration::minutes(24));
        assert_eq!(h.manager.check_idle().await, IdleStatus::Active);

        h.clock.advance(Duration::minutes(1));
        assert_eq!(
            h.manager.check_idle().await,
            IdleStatus::Warning {
                remaining: Duration::minutes(5)
            }
        );
        assert_eq!(h.manager.state(), SessionState::Expiring);
        assert!(matches!(events.try_recv(), Ok(SessionEvent::IdleWarning { .. })));

        // Warned once per idle stretch
        h.clock.advance(Duration::minutes(4));
        assert!(matches!(h.manager.check_idle().await, IdleStatus::Warning { .. }));
        assert!(events.try_recv().is_err());

        h.clock.advance(Duration::seconds(59));
        assert!(matches!(h.manager.check_idle().await, IdleStatus::Warning { .. }));

        h.clock.advance(Duration::seconds(1));
        assert_eq!(
            h.manager.check_idle().await,
            IdleStatus::Expired {
                redirect_to: "/acme/admin/login?expired=true".into()
            }
        );
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Expired {
                redirect_to: "/acme/admin/login?expired=true".into()
            }
        );
    }

    #[tokio::test]
    async fn test_activity_resets_idle_clock() {
        let h = harness();
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();

        h.clock.advance(Duration::minutes(26));
        assert!(matches!(h.manager.check_idle().await, IdleStatus::Warning { .. }));

        h.manager.record_activity(ActivitySignal::KeyDown);
        assert_eq!(h.manager.state(), SessionState::Authenticated);

        h.clock.advance(Duration::minutes(24));
        assert_eq!(h.manager.check_idle().await, IdleStatus::Active);
        assert_eq!(h.manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_idle_check_without_session() {
        let h = harness();
        h.clock.advance(Duration::hours(2));
        assert_eq!(h.manager.check_idle().await, IdleStatus::Inactive);
    }

    #[tokio::test]
    async fn test_absolute_horizon_expires_active_session() {
        let mut config = Config::default();
        config.session.absolute_lifetime_secs = 3600;
        let h = harness_with(config, BrowserStorage::in_memory());
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();

        for _ in 0..6 {
            h.clock.advance(Duration::minutes(10));
            h.manager.record_activity(ActivitySignal::PointerDown);
        }
        assert!(matches!(
            h.manager.check_idle().await,
            IdleStatus::Expired { .. }
        ));
    }

    #[tokio::test]
    async fn test_check_session() {
        let h = harness();
        assert_eq!(h.manager.check_session().await, Ok(false));

        h.manager
            .login("seller@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        assert_eq!(h.manager.check_session().await, Ok(true));

        h.api.revoke_user("u-seller");
        assert_eq!(
            h.manager.check_session().await,
            Err(SessionError::SessionExpired {
                redirect_to: "/acme/admin/login?expired=true".into()
            })
        );
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(h.storage.find(AUTH_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn test_check_session_network_error_tears_down() {
        let h = harness();
        h.manager
            .login("seller@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        h.api.set_offline(true);
        assert!(matches!(
            h.manager.check_session().await,
            Err(SessionError::SessionExpired { .. })
        ));
        assert!(h.manager.user().is_none());
    }

    #[tokio::test]
    async fn test_password_reset_is_generic() {
        let h = harness();
        assert_eq!(
            h.manager.request_password_reset("nobody@acme.test").await,
            Ok(PASSWORD_RESET_MESSAGE)
        );
        h.api.set_offline(true);
        assert!(matches!(
            h.manager.request_password_reset("nobody@acme.test").await,
            Err(SessionError::Network(_))
        ));
    }

    #[derive(Default)]
    struct RecordingTheme {
        applied: Mutex<Vec<String>>,
        cleared: Mutex<usize>,
    }

    impl ThemeApplier for RecordingTheme {
        fn apply(&self, config: &TenantConfig) {
            self.applied.lock().push(config.id.clone());
        }

        fn clear(&self) {
            *self.cleared.lock() += 1;
        }
    }

    #[tokio::test]
    async fn test_theme_applied_at_login_and_cleared_at_logout() {
        let theme = Arc::new(RecordingTheme::default());
        let h = harness();
        let manager = h.manager.with_theme(theme.clone());

        manager
            .login("admin@acme.test", MOCK_PASSWORD, false, "acme")
            .await
            .unwrap();
        assert_eq!(*theme.applied.lock(), vec!["acme".to_string()]);
        assert_eq!(manager.tenant_config().unwrap().theme.primary_color.as_deref(), Some("#7c3aed"));

        manager.logout().await;
        assert_eq!(*theme.cleared.lock(), 1);
        assert!(manager.tenant_config().is_none());
    }

    #[tokio::test]
    async fn test_default_tenant_records_user_tenant() {
        let h = harness();
        h.manager
            .login("admin@acme.test", MOCK_PASSWORD, false, DEFAULT_TENANT)
            .await
            .unwrap();
        assert_eq!(h.manager.tenant_id().as_deref(), Some("acme"));
        assert_eq!(
            h.storage.ephemeral().get(TENANT_ID_KEY).as_deref(),
            Some("acme")
        );
    }
}
