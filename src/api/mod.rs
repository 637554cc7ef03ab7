//! Remote marketplace API as seen by the session layer.
//!
//! Only the endpoints the session, tenancy and scope logic need are modelled.
//! Implementations classify every failure into [`ApiError`].

mod http;
mod mock;

pub use http::HttpApi;
pub use mock::{MockApi, MOCK_PASSWORD, MOCK_TWO_FACTOR_CODE};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::{Artisan, LoginResponse, Seller, User};

pub type ApiResult<T> = Result<T, ApiError>;

/// Generic reply to a password reset request, whatever the server says.
pub const PASSWORD_RESET_MESSAGE: &str =
    "If an account exists for that email, a reset link has been sent.";

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `POST login`
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse>;
    /// `POST verify-2fa`
    async fn verify_two_factor(&self, code: &str, session_id: &str) -> ApiResult<bool>;
    /// `GET me`
    async fn me(&self, token: &str, tenant_id: &str) -> ApiResult<User>;
    /// `POST logout`
    async fn logout(&self, token: &str) -> ApiResult<()>;
    /// `POST password-reset`
    async fn request_password_reset(&self, email: &str) -> ApiResult<()>;
    /// `POST verify-session`
    async fn verify_session(&self, session_id: &str) -> ApiResult<bool>;
    /// Sellers of a tenant, for the hierarchy scope
    async fn list_sellers(&self, token: &str, tenant_id: &str) -> ApiResult<Vec<Seller>>;
    /// Artisans of a tenant, for the hierarchy scope
    async fn list_artisans(&self, token: &str, tenant_id: &str) -> ApiResult<Vec<Artisan>>;
}

/// Build the API client: the in-process mock when asked for, HTTP otherwise.
pub fn connect(config: &ApiConfig, mock: bool) -> anyhow::Result<Arc<dyn RemoteApi>> {
    if mock {
        tracing::info!("Using built-in mock marketplace API");
        return Ok(Arc::new(MockApi::seeded()));
    }
    let api = HttpApi::new(config)?;
    tracing::info!(base_url = %config.base_url, "Using remote marketplace API");
    Ok(Arc::new(api))
}
