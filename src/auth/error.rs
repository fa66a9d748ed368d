use thiserror::Error;

/// Failure of the authorization-code grant.
///
/// A code is single-use, so any failure here means the operator should
/// fetch a fresh code before trying again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("Authorization code rejected: {0}")]
    InvalidCode(String),
    #[error("Network error during code exchange: {0}")]
    Network(String),
}

impl ExchangeError {
    /// Instruction suitable for relaying to a chat user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCode(_) => {
                "Error while trying to retrieve access token: the code was rejected. \
                 Request a new code from the authorization url and try again."
                    .to_string()
            }
            Self::Network(_) => "Error while trying to retrieve access token: the provider \
                                 could not be reached. Request a new code and try again."
                .to_string(),
        }
    }
}

/// Failure of the refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The refresh token itself was rejected (revoked or expired).
    #[error("Refresh token rejected: {0}")]
    InvalidGrant(String),
    #[error("Network error during token refresh: {0}")]
    Network(String),
    #[error("Provider error during token refresh (status {status:?}): {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },
}

impl RefreshError {
    /// Terminal for the refresh token that was used; re-authorization required.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::InvalidGrant(_))
    }

    pub fn is_transient(&self) -> bool {
        !self.is_terminal()
    }

    /// Instruction suitable for relaying to a chat user.
    pub fn user_message(&self) -> String {
        if self.is_terminal() {
            "Authentication error: the stored refresh token was revoked. \
             Re-authorize this app to continue."
                .to_string()
        } else {
            "Authentication error: error refreshing token. It will be retried on the next request."
                .to_string()
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}
