//! HTTP client for the Vizor analysis service.
//!
//! Three endpoints: `POST /auth/login`, `POST /auth/logout`, and
//! `POST /analyze`. Error bodies are free-form, so the extraction chain
//! tries a JSON `message`/`error` field, then the plain-text body, then a
//! status-derived fallback.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use vizor_protocol::AnalysisRequest;
use vizor_protocol::AnalysisResult;

use crate::cancel::OrCancel;
use crate::config::Config;
use crate::storage::StorageError;

/// Errors from the auth endpoints and local session persistence.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong login or password; user-correctable.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-auth failure from the server, including a 2xx login response
    /// that carries no token.
    #[error("auth server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the analysis request lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("not authenticated: log in before requesting an analysis")]
    NotAuthenticated,

    /// The service throttled the account (2xx body with a rate-limit
    /// flag). Distinct from `RequestFailed` so callers can render a
    /// "try later / upgrade" affordance.
    #[error("rate limit reached")]
    RateLimited,

    /// Transport failure, non-2xx response, or unparseable body. The
    /// message is best-effort extracted from the server response.
    #[error("{0}")]
    RequestFailed(String),

    #[error("analysis request cancelled")]
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Shared HTTP client with a fixed base URL and request timeout.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("vizor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange credentials for a bearer token.
    pub async fn login(&self, login: &str, password: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "login": login, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::InvalidCredentials(extract_error_message(
                status,
                &body,
                "Authentication failed",
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Server {
                status: status.as_u16(),
                message: extract_error_message(status, &body, "Authentication failed"),
            });
        }

        let body: LoginResponse = response.json().await.map_err(|err| AuthError::Server {
            status: status.as_u16(),
            message: format!("malformed login response: {err}"),
        })?;
        body.token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::Server {
                status: status.as_u16(),
                message: "login response did not include a token".to_string(),
            })
    }

    /// Invalidate a token server-side. Fire-and-forget: the response is
    /// ignored, only transport failures surface.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/logout", self.base_url);
        self.http
            .post(&url)
            .json(&json!({ "token": token }))
            .send()
            .await?;
        Ok(())
    }

    /// Run one analysis. The whole round-trip (send, read, parse) races
    /// the cancellation token.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let url = format!("{}/analyze", self.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let round_trip = async move {
            let response = builder.send().await.map_err(transport_failure)?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                return Err(AnalysisError::RequestFailed(extract_error_message(
                    status,
                    &body,
                    "Analysis failed",
                )));
            }

            let value: Value = serde_json::from_str(&body).map_err(|err| {
                AnalysisError::RequestFailed(format!("malformed analysis response: {err}"))
            })?;
            if value.get("rateLimitReached").and_then(Value::as_bool) == Some(true) {
                return Err(AnalysisError::RateLimited);
            }
            serde_json::from_value(value).map_err(|err| {
                AnalysisError::RequestFailed(format!("malformed analysis response: {err}"))
            })
        };

        round_trip
            .or_cancel(cancel)
            .await
            .map_err(|_| AnalysisError::Cancelled)?
    }
}

fn transport_failure(err: reqwest::Error) -> AnalysisError {
    if err.is_timeout() {
        AnalysisError::RequestFailed("request timed out".to_string())
    } else {
        AnalysisError::RequestFailed(err.to_string())
    }
}

/// Best-effort human-readable message from an error response body.
///
/// JSON `message` field, then JSON `error` field, then the plain-text
/// body, then `"<fallback> (<status>)"`.
fn extract_error_message(status: StatusCode, body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error"] {
            if let Some(message) = value.get(field).and_then(Value::as_str) {
                if !message.is_empty() {
                    return message.to_string();
                }
            }
        }
    } else {
        let text = body.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }
    format!("{fallback} ({})", status.as_u16())
}
