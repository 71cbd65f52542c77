//! Authenticated JSON client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use bottega_auth::{AuthError, AuthSession, CredentialSet, Credentials, TokenHolder};

use crate::DEFAULT_API_URL;
use crate::error::ApiError;

/// Per-request timeout. The original console had none, which let a slow
/// request outlive the screen that issued it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the console backend.
///
/// Cheap to clone. All requests are JSON in/out against `base_url`; bearer
/// auth and re-login are handled in [`ApiClient::send_authorized`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    holder: Arc<TokenHolder>,
    credentials: CredentialSet,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        holder: Arc<TokenHolder>,
        credentials: CredentialSet,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::network(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            holder,
            credentials,
        })
    }

    /// Build a client from the environment: `BOTTEGA_API_URL` (default
    /// `http://localhost:5000`) and `BOTTEGA_CREDENTIALS`.
    pub fn from_env(holder: Arc<TokenHolder>) -> Result<Self, ApiError> {
        let base_url =
            std::env::var("BOTTEGA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(base_url, holder, CredentialSet::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn holder(&self) -> &Arc<TokenHolder> {
        &self.holder
    }

    /// Probe the backend health endpoint.
    pub async fn check_connectivity(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Run one login flow: try each configured credential in order, stop at
    /// the first the backend accepts.
    ///
    /// A transport failure aborts immediately (retrying other credentials
    /// cannot help when the backend is unreachable).
    pub async fn login(&self) -> Result<AuthSession, AuthError> {
        if self.credentials.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        for credentials in self.credentials.entries() {
            match self.login_with(credentials).await {
                Ok(Some(session)) => {
                    tracing::info!(username = %credentials.username, "login accepted");
                    return Ok(session);
                }
                Ok(None) => {
                    tracing::debug!(username = %credentials.username, "credential rejected");
                }
                Err(err) => return Err(err),
            }
        }

        Err(AuthError::Unauthenticated)
    }

    /// Attempt a single credential. `Ok(None)` means the backend rejected it.
    async fn login_with(&self, credentials: &Credentials) -> Result<Option<AuthSession>, AuthError> {
        let url = format!("{}/api/auth/login", self.base_url);

        let resp = self
            .http
            .post(&url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AuthError::network(format!(
                "login endpoint returned {}",
                resp.status()
            )));
        }

        let session = resp
            .json::<AuthSession>()
            .await
            .map_err(|e| AuthError::network(format!("malformed login response: {e}")))?;
        Ok(Some(session))
    }

    /// Send an authenticated request.
    ///
    /// Behavior on a 401: the stored session is cleared, exactly one login
    /// flow runs (shared with any concurrent caller in the same situation),
    /// and the original request is retried once. A second 401 surfaces as
    /// [`AuthError::Unauthenticated`].
    pub async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let observed_epoch = self.holder.epoch();
        let token = match self.holder.token().await {
            Some(token) => token,
            None => {
                self.holder
                    .refresh(observed_epoch, || self.login())
                    .await?
            }
        };

        let resp = self.send_raw(method.clone(), path, body, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        tracing::debug!(path, "token rejected; attempting re-login");
        let token = self
            .holder
            .refresh(observed_epoch, || self.login())
            .await?;

        let resp = self.send_raw(method, path, body, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthenticated.into());
        }
        Ok(resp)
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))
    }

    /// GET a JSON document from an authenticated endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.send_authorized(Method::GET, path, None).await?;
        Self::decode(resp).await
    }

    /// POST a JSON document to an authenticated endpoint.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::parse(e.to_string()))?;
        let resp = self
            .send_authorized(Method::POST, path, Some(&body))
            .await?;
        Self::decode(resp).await
    }

    /// PUT a JSON document to an authenticated endpoint.
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::parse(e.to_string()))?;
        let resp = self.send_authorized(Method::PUT, path, Some(&body)).await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api(status.as_u16(), text));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::parse(e.to_string()))
    }
}
