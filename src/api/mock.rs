//! In-process stand-in for the marketplace API.
//!
//! Tokens and session ids encode the user id, so a token persisted by one
//! process can be restored by the next without shared state.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashmap::DashSet;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use subtle::ConstantTimeEq;

use super::{ApiResult, RemoteApi};
use crate::error::ApiError;
use crate::models::{Artisan, LoginResponse, Role, Seller, TenantConfig, ThemeTokens, User};

/// Password accepted for every seeded account.
pub const MOCK_PASSWORD: &str = "password123";
/// The only second-factor code the mock accepts.
pub const MOCK_TWO_FACTOR_CODE: &str = "123456";

const MOCK_TENANT: &str = "acme";

#[derive(Debug, Clone)]
struct Account {
    user: User,
    requires_two_factor: bool,
}

#[derive(Debug)]
pub struct MockApi {
    accounts: Vec<Account>,
    sellers: Vec<Seller>,
    artisans: Vec<Artisan>,
    tenant: TenantConfig,
    revoked: DashSet<String>,
    offline: AtomicBool,
    fail_logout: AtomicBool,
    login_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

fn user(id: &str, name: &str, email: &str, role: Role, seller: Option<&str>, artisan: Option<&str>) -> User {
    User {
        id: id.into(),
        name: name.into(),
        email: email.into(),
        role,
        tenant_id: MOCK_TENANT.into(),
        seller_id: seller.map(Into::into),
        artisan_id: artisan.map(Into::into),
        avatar: None,
        last_login: Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0).single(),
    }
}

fn nonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

/// `<prefix>.<user-id>.<nonce>` -> user id
fn user_id_from(value: &str, prefix: &str) -> Option<String> {
    let mut parts = value.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(id), Some(n)) if p == prefix && !id.is_empty() && !n.is_empty() => {
            Some(id.to_string())
        }
        _ => None,
    }
}

impl MockApi {
    /// One tenant, two sellers, three artisans and an account per role.
    pub fn seeded() -> Self {
        let accounts = vec![
            Account {
                user: user("u-admin", "Ada Admin", "admin@acme.test", Role::SuperAdmin, None, None),
                requires_two_factor: false,
            },
            Account {
                user: user("u-secure", "Sam Secure", "secure@acme.test", Role::SuperAdmin, None, None),
                requires_two_factor: true,
            },
            Account {
                user: user("u-seller", "Sol Seller", "seller@acme.test", Role::Seller, Some("s-1"), None),
                requires_two_factor: false,
            },
            Account {
                user: user(
                    "u-artisan",
                    "Ari Artisan",
                    "artisan@acme.test",
                    Role::Artisan,
                    Some("s-1"),
                    Some("a-1"),
                ),
                requires_two_factor: false,
            },
            Account {
                user: user("u-viewer", "Val Viewer", "viewer@acme.test", Role::Viewer, None, None),
                requires_two_factor: false,
            },
        ];

        let seller = |id: &str, name: &str| Seller {
            id: id.into(),
            name: name.into(),
            tenant_id: MOCK_TENANT.into(),
        };
        let artisan = |id: &str, name: &str, seller_id: &str| Artisan {
            id: id.into(),
            name: name.into(),
            seller_id: seller_id.into(),
        };

        Self {
            accounts,
            sellers: vec![seller("s-1", "Hearth & Loom"), seller("s-2", "Copper Lane")],
            artisans: vec![
                artisan("a-1", "Ines Weaver", "s-1"),
                artisan("a-2", "Tomas Dyer", "s-1"),
                artisan("a-3", "Mira Smith", "s-2"),
            ],
            tenant: TenantConfig {
                id: MOCK_TENANT.into(),
                name: "Acme Crafts".into(),
                subdomain: MOCK_TENANT.into(),
                theme: ThemeTokens {
                    primary_color: Some("#7c3aed".into()),
                    secondary_color: Some("#0f172a".into()),
                    accent_color: Some("#f59e0b".into()),
                    logo_url: None,
                },
            },
            revoked: DashSet::new(),
            offline: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate a transport outage for every call.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only the logout endpoint fail.
    pub fn set_fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Reject a token (and any session of its user) from now on.
    pub fn revoke_user(&self, user_id: &str) {
        self.revoked.insert(user_id.to_string());
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn online(&self) -> ApiResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn account(&self, user_id: &str) -> Option<&Account> {
        if self.revoked.contains(user_id) {
            return None;
        }
        self.accounts.iter().find(|a| a.user.id == user_id)
    }

    fn authorize(&self, token: &str, tenant_id: &str) -> ApiResult<&Account> {
        let account = user_id_from(token, "mock")
            .and_then(|id| self.account(&id))
            .ok_or_else(|| ApiError::Unauthorized("invalid or expired token".into()))?;
        if account.user.tenant_id != tenant_id {
            return Err(ApiError::Unauthorized("token does not belong to tenant".into()));
        }
        Ok(account)
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        self.online()?;
        self.login_calls.fetch_add(1, Ordering::SeqCst);

        let account = self
            .accounts
            .iter()
            .find(|a| a.user.email.eq_ignore_ascii_case(email))
            .filter(|_| password == MOCK_PASSWORD)
            .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;

        let user = account.user.clone();
        let session_prefix = if account.requires_two_factor { "mfa" } else { "sess" };

        Ok(LoginResponse {
            token: Some(format!("mock.{}.{}", user.id, nonce())),
            session_id: Some(format!("{}.{}.{}", session_prefix, user.id, nonce())),
            requires_two_factor: account.requires_two_factor,
            tenant_config: Some(self.tenant.clone()),
            user: Some(user),
        })
    }

    async fn verify_two_factor(&self, code: &str, session_id: &str) -> ApiResult<bool> {
        self.online()?;
        if user_id_from(session_id, "mfa").is_none() {
            return Ok(false);
        }
        let expected = MOCK_TWO_FACTOR_CODE.as_bytes();
        let provided = code.as_bytes();
        Ok(expected.len() == provided.len() && expected.ct_eq(provided).into())
    }

    async fn me(&self, token: &str, tenant_id: &str) -> ApiResult<User> {
        self.online()?;
        Ok(self.authorize(token, tenant_id)?.user.clone())
    }

    async fn logout(&self, _token: &str) -> ApiResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.online()?;
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: "logout failed".into(),
            });
        }
        Ok(())
    }

    async fn request_password_reset(&self, _email: &str) -> ApiResult<()> {
        self.online()
    }

    async fn verify_session(&self, session_id: &str) -> ApiResult<bool> {
        self.online()?;
        // restored sessions only know their token
        let valid = ["sess", "mfa", "mock"]
            .iter()
            .filter_map(|prefix| user_id_from(session_id, prefix))
            .any(|id| self.account(&id).is_some());
        Ok(valid)
    }

    async fn list_sellers(&self, token: &str, tenant_id: &str) -> ApiResult<Vec<Seller>> {
        self.online()?;
        self.authorize(token, tenant_id)?;
        Ok(self.sellers.clone())
    }

    async fn list_artisans(&self, token: &str, tenant_id: &str) -> ApiResult<Vec<Artisan>> {
        self.online()?;
        self.authorize(token, tenant_id)?;
        Ok(self.artisans.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_and_restore_with_token() {
        let api = MockApi::seeded();
        let response = api.login("seller@acme.test", MOCK_PASSWORD).await.unwrap();
        assert!(!response.requires_two_factor);

        let token = response.token.unwrap();
        let user = api.me(&token, "acme").await.unwrap();
        assert_eq!(user.role, Role::Seller);
        assert_eq!(user.seller_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let api = MockApi::seeded();
        let err = api.login("admin@acme.test", "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_two_factor_code() {
        let api = MockApi::seeded();
        let response = api.login("secure@acme.test", MOCK_PASSWORD).await.unwrap();
        assert!(response.requires_two_factor);

        let session_id = response.session_id.unwrap();
        assert!(api.verify_two_factor("123456", &session_id).await.unwrap());
        assert!(!api.verify_two_factor("654321", &session_id).await.unwrap());
        assert!(!api.verify_two_factor("123456", "bogus").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoked_user_fails_verification() {
        let api = MockApi::seeded();
        let response = api.login("admin@acme.test", MOCK_PASSWORD).await.unwrap();
        let session_id = response.session_id.unwrap();
        assert!(api.verify_session(&session_id).await.unwrap());

        api.revoke_user("u-admin");
        assert!(!api.verify_session(&session_id).await.unwrap());
        assert!(api.me(&response.token.unwrap(), "acme").await.is_err());
    }

    #[tokio::test]
    async fn test_offline_is_network_error() {
        let api = MockApi::seeded();
        api.set_offline(true);
        let err = api.login("admin@acme.test", MOCK_PASSWORD).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[test]
    fn test_user_id_parsing() {
        assert_eq!(user_id_from("mock.u-1.abcd", "mock").as_deref(), Some("u-1"));
        assert_eq!(user_id_from("mock.u-1", "mock"), None);
        assert_eq!(user_id_from("sess.u-1.abcd", "mock"), None);
    }
}
