//! OAuth2 credential lifecycle: code exchange, refresh and validation.

pub mod client;
pub mod error;
pub mod manager;
pub mod token;
pub mod url;

pub use client::{HttpOAuthClient, OAuthClient};
pub use error::{ExchangeError, RefreshError};
pub use manager::{TokenManager, Validation};
pub use token::{CredentialState, StoredTokens, TokenSet};
pub use url::AuthUrlBuilder;
