//! Configuration (layered: defaults < TOML file < environment).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_SERVICE_NAME: &str = "google";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variables read by [`BotAuthConfig::from_env`].
pub const ENV_CLIENT_ID: &str = "BOTAUTH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "BOTAUTH_CLIENT_SECRET";
pub const ENV_REDIRECT_URL: &str = "BOTAUTH_REDIRECT_URL";
pub const ENV_SCOPES: &str = "BOTAUTH_SCOPES";
pub const ENV_SERVICE_NAME: &str = "BOTAUTH_SERVICE_NAME";
pub const ENV_AUTH_URL: &str = "BOTAUTH_AUTH_URL";
pub const ENV_TOKEN_URL: &str = "BOTAUTH_TOKEN_URL";
pub const ENV_STORE_PATH: &str = "BOTAUTH_STORE_PATH";
pub const ENV_FLUSH_INTERVAL_SECS: &str = "BOTAUTH_FLUSH_INTERVAL_SECS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "BOTAUTH_HTTP_TIMEOUT_SECS";

/// Configuration problems. Never recovered automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),
    #[error("No scopes configured; set BOTAUTH_SCOPES")]
    EmptyScopes,
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Could not read config file: {0}")]
    Io(String),
    #[error("Could not parse config file: {0}")]
    Parse(String),
}

/// Client registration for one external API integration.
///
/// `name` namespaces the storage keys, so several identities can share a
/// single credential store.
///
/// # Example
/// ```
/// use botauth::config::ServiceIdentity;
///
/// let identity = ServiceIdentity::builder()
///     .name("calendar")
///     .client_id("client-id")
///     .client_secret("client-secret")
///     .redirect_url("urn:ietf:wg:oauth:2.0:oob")
///     .scopes(vec!["https://www.googleapis.com/auth/calendar".to_string()])
///     .build();
/// assert!(identity.validate().is_ok());
/// ```
#[derive(Clone, PartialEq, Eq, Builder)]
pub struct ServiceIdentity {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub client_id: String,
    #[builder(into)]
    pub client_secret: String,
    #[builder(into)]
    pub redirect_url: String,
    #[builder(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ServiceIdentity {
    /// Check the fields every grant needs. Scopes are checked when the
    /// authorization URL is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("service_name", &self.name),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_url", &self.redirect_url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Split a delimited scope list, keeping first-seen order and dropping
/// duplicates. Accepts `;` (the historical bot format), `,` and whitespace.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for scope in raw
        .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
    {
        if !scopes.iter().any(|existing| existing == scope) {
            scopes.push(scope.to_string());
        }
    }
    scopes
}

/// Provider-side OAuth endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

/// Everything needed to stand up a token manager for one identity.
#[derive(Debug, Clone, Builder)]
pub struct BotAuthConfig {
    pub identity: ServiceIdentity,
    #[builder(default)]
    pub endpoints: ProviderEndpoints,
    /// Credential file; `None` uses [`crate::store::FileCredentialStore::default_path`].
    pub store_path: Option<PathBuf>,
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    #[builder(default = DEFAULT_HTTP_TIMEOUT)]
    pub http_timeout: Duration,
}

impl Default for BotAuthConfig {
    fn default() -> Self {
        Self {
            identity: ServiceIdentity {
                name: DEFAULT_SERVICE_NAME.to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                redirect_url: String::new(),
                scopes: Vec::new(),
            },
            endpoints: ProviderEndpoints::default(),
            store_path: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl BotAuthConfig {
    /// Load from environment variables (and `.env` if present).
    ///
    /// Missing identity fields are left empty; they are reported when the
    /// token manager is constructed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup using the `BOTAUTH_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Load from a TOML file. Keys mirror the environment variables without
    /// the `BOTAUTH_` prefix, in lowercase.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let file: ConfigFile = toml::from_str(&raw)
            .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?;
        file.into_config()
    }

    /// Layer non-empty values from `lookup` on top of the current settings.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_SERVICE_NAME) {
            self.identity.name = value;
        }
        if let Some(value) = get(ENV_CLIENT_ID) {
            self.identity.client_id = value;
        }
        if let Some(value) = get(ENV_CLIENT_SECRET) {
            self.identity.client_secret = value;
        }
        if let Some(value) = get(ENV_REDIRECT_URL) {
            self.identity.redirect_url = value;
        }
        if let Some(value) = get(ENV_SCOPES) {
            self.identity.scopes = parse_scopes(&value);
        }
        if let Some(value) = get(ENV_AUTH_URL) {
            self.endpoints.auth_url = value;
        }
        if let Some(value) = get(ENV_TOKEN_URL) {
            self.endpoints.token_url = value;
        }
        if let Some(value) = get(ENV_STORE_PATH) {
            self.store_path = Some(PathBuf::from(value));
        }
        if let Some(value) = get(ENV_FLUSH_INTERVAL_SECS) {
            self.flush_interval = parse_secs(ENV_FLUSH_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = get(ENV_HTTP_TIMEOUT_SECS) {
            self.http_timeout = parse_secs(ENV_HTTP_TIMEOUT_SECS, &value)?;
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    service_name: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_url: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
    store_path: Option<PathBuf>,
    flush_interval_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> Result<BotAuthConfig, ConfigError> {
        let defaults = BotAuthConfig::default();
        let mut scopes: Vec<String> = Vec::new();
        for scope in self.scopes {
            if !scope.is_empty() && !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Ok(BotAuthConfig {
            identity: ServiceIdentity {
                name: self.service_name.unwrap_or(defaults.identity.name),
                client_id: self.client_id.unwrap_or_default(),
                client_secret: self.client_secret.unwrap_or_default(),
                redirect_url: self.redirect_url.unwrap_or_default(),
                scopes,
            },
            endpoints: ProviderEndpoints {
                auth_url: self.auth_url.unwrap_or(defaults.endpoints.auth_url),
                token_url: self.token_url.unwrap_or(defaults.endpoints.token_url),
            },
            store_path: self.store_path,
            flush_interval: file_secs("flush_interval_secs", self.flush_interval_secs)?
                .unwrap_or(defaults.flush_interval),
            http_timeout: file_secs("http_timeout_secs", self.http_timeout_secs)?
                .unwrap_or(defaults.http_timeout),
        })
    }
}

/// Zero is rejected here as it is for the environment variables.
fn file_secs(key: &str, secs: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match secs {
        None => Ok(None),
        Some(secs) => parse_secs(key, &secs.to_string()).map(Some),
    }
}
