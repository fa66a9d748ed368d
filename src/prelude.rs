//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthUrlBuilder, CredentialState, ExchangeError, HttpOAuthClient, OAuthClient, RefreshError,
    StoredTokens, TokenManager, TokenSet, Validation,
};
pub use crate::config::{BotAuthConfig, ProviderEndpoints, ServiceIdentity};
pub use crate::error::{BotAuthError, Result};
pub use crate::store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
