//! Error types for botauth.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::auth::error::{ExchangeError, RefreshError};
use crate::config::ConfigError;
use crate::store::StoreError;

/// Top-level error for callers that drive several operations and want one
/// type to propagate with `?`.
#[derive(Error, Debug)]
pub enum BotAuthError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Authorization required: visit {url}")]
    AuthorizationRequired { url: String },
}

impl BotAuthError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::AuthorizationRequired { .. } => ErrorCategory::Authorization,
            Self::Exchange(ExchangeError::InvalidCode(_)) => ErrorCategory::Authorization,
            Self::Exchange(ExchangeError::Network(_)) => ErrorCategory::Network,
            Self::Refresh(RefreshError::InvalidGrant(_)) => ErrorCategory::Authorization,
            Self::Refresh(RefreshError::Network(_)) => ErrorCategory::Network,
            Self::Refresh(RefreshError::Provider { .. }) => ErrorCategory::Provider,
            Self::Store(_) => ErrorCategory::Storage,
        }
    }

    /// Whether repeating the same operation later may succeed.
    ///
    /// A failed code exchange is never retryable: the code is single-use.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exchange(_) => false,
            Self::Refresh(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::Exchange(_) => RecoverySuggestion::Reauthorize,
            _ => self.category().recovery_suggestion(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BotAuthError>;
