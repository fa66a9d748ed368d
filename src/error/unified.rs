//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// The user must authorize (again).
    Authorization,
    Network,
    Provider,
    Configuration,
    Storage,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Visit the authorization URL and submit a fresh code.
    Reauthorize,
    RetryLater,
    CheckConfiguration,
    CheckStoragePath,
}

impl ErrorCategory {
    pub fn recovery_suggestion(self) -> RecoverySuggestion {
        match self {
            Self::Authorization => RecoverySuggestion::Reauthorize,
            Self::Network | Self::Provider => RecoverySuggestion::RetryLater,
            Self::Configuration => RecoverySuggestion::CheckConfiguration,
            Self::Storage => RecoverySuggestion::CheckStoragePath,
        }
    }
}
