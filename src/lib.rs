//! botauth: OAuth2 credential lifecycle for bots.
//!
//! A bot identity is authorized once by a human who visits an authorization
//! URL and relays the resulting code. After that, [`auth::TokenManager`]
//! keeps the access token fresh through the refresh-token grant, storing
//! credentials in a [`store::CredentialStore`] shared with the rest of the
//! process.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use botauth::prelude::*;
//!
//! # async fn example() -> botauth::error::Result<()> {
//! let config = BotAuthConfig::from_env()?;
//! let store = Arc::new(FileCredentialStore::open_default()?);
//! let _flusher = store.spawn_flusher(config.flush_interval);
//! let manager = TokenManager::from_config(&config, store)?;
//!
//! match manager.validate().await? {
//!     Validation::Ready(tokens) => println!("Bearer {}", tokens.access_token),
//!     Validation::NeedsAuthorization { url } => println!("Visit {url}"),
//!     Validation::RefreshFailed(err) => eprintln!("{err}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod prelude;
pub mod store;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
