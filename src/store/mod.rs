//! Key-value credential persistence.

pub mod file;
pub mod memory;

pub use file::{FileCredentialStore, FlushScheduler};
pub use memory::MemoryCredentialStore;

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::auth::token::{StoredTokens, TokenSet};

/// Storage abstraction shared by every identity in the process.
///
/// `set` and `remove` are visible to this process immediately but only
/// durable after the next flush; call `persist` after a meaningful mutation
/// to flush now. There is no atomicity across keys.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
    fn persist(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported credential file version {version} at {}", .path.display())]
    UnsupportedVersion { version: u32, path: PathBuf },
}

/// The three namespaced keys a token set is projected onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialKeys {
    pub token: String,
    pub refresh_token: String,
    pub expiry: String,
}

impl CredentialKeys {
    /// Keys for a service name, e.g. `google` gives `GOOGLE_AUTH_TOKEN`,
    /// `GOOGLE_AUTH_REFRESH_TOKEN` and `GOOGLE_AUTH_EXPIRE_TIME`.
    pub fn for_service(name: &str) -> Self {
        let prefix = normalize_namespace(name);
        Self {
            token: format!("{prefix}_AUTH_TOKEN"),
            refresh_token: format!("{prefix}_AUTH_REFRESH_TOKEN"),
            expiry: format!("{prefix}_AUTH_EXPIRE_TIME"),
        }
    }

    pub fn load(&self, store: &dyn CredentialStore) -> StoredTokens {
        let expiry_ms = store.get(&self.expiry).and_then(|raw| {
            let parsed = raw.trim().parse::<i64>().ok();
            if parsed.is_none() {
                warn!(key = %self.expiry, "stored expiry is not an integer; treating as expired");
            }
            parsed
        });
        StoredTokens {
            access_token: store.get(&self.token),
            refresh_token: store.get(&self.refresh_token),
            expiry_ms,
        }
    }

    /// Write all three fields, overwriting what was there. A token set
    /// without a refresh token removes the stored one.
    pub fn write(&self, store: &dyn CredentialStore, tokens: &TokenSet) {
        store.set(&self.token, tokens.access_token.clone());
        match tokens.refresh_token.as_deref() {
            Some(refresh) if !refresh.is_empty() => {
                store.set(&self.refresh_token, refresh.to_string())
            }
            _ => store.remove(&self.refresh_token),
        }
        store.set(&self.expiry, tokens.expiry_ms.to_string());
    }
}

fn normalize_namespace(value: &str) -> String {
    let trimmed = value.trim();
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    if out.trim_matches('_').is_empty() {
        "DEFAULT".to_string()
    } else {
        out
    }
}
