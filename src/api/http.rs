use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{ApiResult, RemoteApi};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::{
    Artisan, LoginRequest, LoginResponse, PasswordResetRequest, Seller, User,
    VerifySessionRequest, VerifySessionResponse, VerifyTwoFactorRequest,
    VerifyTwoFactorResponse,
};

const TENANT_HEADER: &str = "X-Tenant-ID";

/// Error envelope returned by the API
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(alias = "error")]
    message: String,
}

/// `reqwest`-backed client for the marketplace API.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder, token: &str, tenant_id: &str) -> RequestBuilder {
        request.bearer_auth(token).header(TENANT_HEADER, tenant_id)
    }

    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(ApiError::Unauthorized(message))
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> ApiResult<T> {
        Self::send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        Self::json(self.client.post(self.url("auth/login")).json(&body)).await
    }

    async fn verify_two_factor(&self, code: &str, session_id: &str) -> ApiResult<bool> {
        let body = VerifyTwoFactorRequest {
            code: code.to_string(),
            session_id: session_id.to_string(),
        };
        let response: VerifyTwoFactorResponse =
            Self::json(self.client.post(self.url("auth/verify-2fa")).json(&body)).await?;
        Ok(response.success)
    }

    async fn me(&self, token: &str, tenant_id: &str) -> ApiResult<User> {
        Self::json(self.authorized(self.client.get(self.url("auth/me")), token, tenant_id)).await
    }

    async fn logout(&self, token: &str) -> ApiResult<()> {
        Self::send(self.client.post(self.url("auth/logout")).bearer_auth(token)).await?;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        Self::send(self.client.post(self.url("auth/password-reset")).json(&body)).await?;
        Ok(())
    }

    async fn verify_session(&self, session_id: &str) -> ApiResult<bool> {
        let body = VerifySessionRequest {
            session_id: session_id.to_string(),
        };
        let response: VerifySessionResponse =
            Self::json(self.client.post(self.url("auth/verify-session")).json(&body)).await?;
        Ok(response.valid)
    }

    async fn list_sellers(&self, token: &str, tenant_id: &str) -> ApiResult<Vec<Seller>> {
        Self::json(self.authorized(self.client.get(self.url("sellers")), token, tenant_id)).await
    }

    async fn list_artisans(&self, token: &str, tenant_id: &str) -> ApiResult<Vec<Artisan>> {
        Self::json(self.authorized(self.client.get(self.url("artisans")), token, tenant_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = HttpApi::new(&ApiConfig {
            base_url: "https://api.example.com/v1/".into(),
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(api.url("auth/login"), "https://api.example.com/v1/auth/login");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let api = HttpApi::new(&ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..ApiConfig::default()
        })
        .unwrap();

        let err = api.login("a@b.test", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    }
}
