use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::error::{ExchangeError, RefreshError};
use super::token::{now_millis, TokenSet};
use crate::config::{ProviderEndpoints, ServiceIdentity, DEFAULT_HTTP_TIMEOUT};
use crate::util::timeout::with_timeout;

/// Lifetime assumed when a token response carries no expiry at all.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// The two OAuth grants against the provider's token endpoint.
///
/// Each call is a single round trip with no internal retry; grants are not
/// safely retryable, so retry policy belongs to the caller.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Authorization-code grant. A consumed code fails with
    /// [`ExchangeError::InvalidCode`].
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, ExchangeError>;

    /// Refresh-token grant. The returned set may omit the refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, RefreshError>;
}

/// [`OAuthClient`] speaking form-encoded POSTs to a token endpoint.
///
/// # Example
/// ```no_run
/// use botauth::auth::HttpOAuthClient;
/// use botauth::config::{ProviderEndpoints, ServiceIdentity};
///
/// let identity = ServiceIdentity::builder()
///     .name("google")
///     .client_id("id")
///     .client_secret("secret")
///     .redirect_url("http://localhost/callback")
///     .build();
/// let client = HttpOAuthClient::new(&identity, &ProviderEndpoints::default());
/// ```
#[derive(Debug, Clone)]
pub struct HttpOAuthClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    timeout: Duration,
}

impl HttpOAuthClient {
    pub fn new(identity: &ServiceIdentity, endpoints: &ProviderEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: endpoints.token_url.clone(),
            client_id: identity.client_id.clone(),
            client_secret: identity.client_secret.clone(),
            redirect_url: identity.redirect_url.clone(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    async fn post_grant(&self, form: &[(&str, &str)]) -> Result<TokenSet, GrantFailure> {
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(GrantFailure::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(GrantFailure::Transport)?;
        if !status.is_success() {
            let parsed: Option<TokenErrorResponse> = serde_json::from_str(&body).ok();
            return Err(GrantFailure::Rejected {
                status: status.as_u16(),
                error: parsed.as_ref().map(|p| p.error.clone()),
                description: parsed
                    .and_then(|p| p.error_description)
                    .unwrap_or_else(|| truncate(&body, 200)),
            });
        }

        let payload: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| GrantFailure::Malformed(err.to_string()))?;
        if payload.access_token.is_empty() {
            return Err(GrantFailure::Malformed(
                "token response has an empty access_token".to_string(),
            ));
        }
        Ok(payload.into_token_set(now_millis()))
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, ExchangeError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
        ];
        let result = with_timeout(
            self.timeout,
            async { self.post_grant(&form).await.map_err(GrantFailure::into_exchange_error) },
            |d| ExchangeError::Network(format!("token endpoint timed out after {}ms", d.as_millis())),
        )
        .await;
        if let Err(err) = &result {
            debug!(error = %err, "authorization code exchange failed");
        }
        result
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, RefreshError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let result = with_timeout(
            self.timeout,
            async { self.post_grant(&form).await.map_err(GrantFailure::into_refresh_error) },
            |d| RefreshError::Network(format!("token endpoint timed out after {}ms", d.as_millis())),
        )
        .await;
        if let Err(err) = &result {
            debug!(error = %err, "refresh token grant failed");
        }
        result
    }
}

#[derive(Debug)]
enum GrantFailure {
    Transport(reqwest::Error),
    Rejected {
        status: u16,
        error: Option<String>,
        description: String,
    },
    Malformed(String),
}

impl GrantFailure {
    /// Any 4xx means the code was refused (used, expired or mistyped);
    /// 5xx and transport problems count as network failures.
    fn into_exchange_error(self) -> ExchangeError {
        match self {
            Self::Transport(err) => err.into(),
            Self::Rejected {
                status,
                error,
                description,
            } if (400..500).contains(&status) => ExchangeError::InvalidCode(match error {
                Some(error) => format!("{error}: {description}"),
                None => format!("status {status}: {description}"),
            }),
            Self::Rejected {
                status,
                description,
                ..
            } => ExchangeError::Network(format!("provider returned {status}: {description}")),
            Self::Malformed(message) => {
                ExchangeError::Network(format!("invalid token response: {message}"))
            }
        }
    }

    fn into_refresh_error(self) -> RefreshError {
        match self {
            Self::Transport(err) => err.into(),
            Self::Rejected {
                error: Some(error),
                description,
                ..
            } if error == "invalid_grant" => RefreshError::InvalidGrant(description),
            Self::Rejected {
                status,
                error,
                description,
            } => RefreshError::Provider {
                status: Some(status),
                message: match error {
                    Some(error) => format!("{error}: {description}"),
                    None => description,
                },
            },
            Self::Malformed(message) => RefreshError::Provider {
                status: None,
                message: format!("invalid token response: {message}"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    /// Absolute expiry in epoch milliseconds, as some client libraries emit.
    expiry_date: Option<i64>,
}

impl TokenResponse {
    fn into_token_set(self, now_ms: i64) -> TokenSet {
        let expiry_ms = match (self.expiry_date, self.expires_in) {
            (Some(absolute), _) => absolute,
            (None, Some(secs)) => now_ms.saturating_add(secs.saturating_mul(1000)),
            (None, None) => {
                debug!(
                    default_secs = DEFAULT_EXPIRES_IN_SECS,
                    "token response has no expiry; assuming default lifetime"
                );
                now_ms.saturating_add(DEFAULT_EXPIRES_IN_SECS * 1000)
            }
        };
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            expiry_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
