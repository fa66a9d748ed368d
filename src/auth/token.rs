use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Access token, optional refresh token and expiry for one identity.
///
/// `expiry_ms` is epoch milliseconds and is only meaningful relative to the
/// wall clock at the moment of comparison.
///
/// # Example
/// ```
/// use botauth::auth::TokenSet;
///
/// let tokens = TokenSet {
///     access_token: "access".to_string(),
///     refresh_token: Some("refresh".to_string()),
///     expiry_ms: botauth::auth::token::now_millis() + 3_600_000,
/// };
/// assert!(tokens.is_usable());
/// assert!(!tokens.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry_ms: i64,
}

impl TokenSet {
    /// Both tokens present and non-empty.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .refresh_token
                .as_deref()
                .is_some_and(|token| !token.is_empty())
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.expiry_ms)
    }

    /// Fold a refresh-grant response into the current token set.
    ///
    /// Access token and expiry always come from `refreshed`. The refresh
    /// token is replaced only when the response carries a non-empty one.
    pub fn merge_refresh(self, refreshed: TokenSet) -> TokenSet {
        let refresh_token = match refreshed.refresh_token {
            Some(token) if !token.is_empty() => Some(token),
            _ => self.refresh_token,
        };
        TokenSet {
            access_token: refreshed.access_token,
            refresh_token,
            expiry_ms: refreshed.expiry_ms,
        }
    }
}

/// Raw view of the three stored credential fields, each possibly absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoredTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry_ms: Option<i64>,
}

impl StoredTokens {
    /// Usable token set, or `None` when either token is missing.
    ///
    /// A missing or unreadable expiry is treated as already expired so the
    /// next validation refreshes instead of trusting an unknown lifetime.
    pub fn to_token_set(&self) -> Option<TokenSet> {
        let tokens = TokenSet {
            access_token: self.access_token.clone()?,
            refresh_token: Some(self.refresh_token.clone()?),
            expiry_ms: self.expiry_ms.unwrap_or(0),
        };
        tokens.is_usable().then_some(tokens)
    }

    pub fn state(&self) -> CredentialState {
        match self.to_token_set() {
            None => CredentialState::Unset,
            Some(tokens) if tokens.is_expired() => CredentialState::Expired,
            Some(_) => CredentialState::Valid,
        }
    }
}

/// Lifecycle state derived from what is currently stored.
///
/// A revoked credential shows up as `Unset` once its refresh token has been
/// cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CredentialState {
    Unset,
    Valid,
    Expired,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
