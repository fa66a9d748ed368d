use reqwest::Url;

use crate::config::{ConfigError, ServiceIdentity};

/// Builds the provider authorization URL a human visits to obtain a code.
///
/// Pure: identical identity and endpoint always yield the same URL.
///
/// # Example
/// ```
/// use botauth::auth::AuthUrlBuilder;
/// use botauth::config::ServiceIdentity;
///
/// let identity = ServiceIdentity::builder()
///     .name("google")
///     .client_id("id")
///     .client_secret("secret")
///     .redirect_url("http://localhost/callback")
///     .scopes(vec!["email".to_string()])
///     .build();
/// let url = AuthUrlBuilder::new("https://accounts.google.com/o/oauth2/v2/auth")
///     .build(&identity)?;
/// assert!(url.contains("access_type=offline"));
/// # Ok::<(), botauth::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUrlBuilder {
    auth_url: String,
}

impl AuthUrlBuilder {
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
        }
    }

    /// Authorization URL requesting offline access for the configured scopes.
    ///
    /// `prompt=consent` makes the provider issue a refresh token even when
    /// the user has authorized this client before.
    pub fn build(&self, identity: &ServiceIdentity) -> Result<String, ConfigError> {
        if identity.scopes.iter().all(|scope| scope.trim().is_empty()) {
            return Err(ConfigError::EmptyScopes);
        }
        let scope = identity
            .scopes
            .iter()
            .map(|scope| scope.trim())
            .filter(|scope| !scope.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("access_type", "offline"),
                ("scope", scope.as_str()),
                ("response_type", "code"),
                ("client_id", identity.client_id.as_str()),
                ("redirect_uri", identity.redirect_url.as_str()),
                ("prompt", "consent"),
            ],
        )
        .map_err(|err| ConfigError::InvalidValue {
            key: "auth_url".to_string(),
            value: format!("{} ({err})", self.auth_url),
        })?;
        Ok(url.into())
    }
}
