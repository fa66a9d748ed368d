//! CLI entry point for botauth.

pub mod auth;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{BotAuthConfig, ConfigError};

/// botauth CLI
#[derive(Parser, Debug)]
#[command(
    name = "botauth",
    version,
    about = "Manage OAuth2 credentials for a bot identity"
)]
pub struct Cli {
    /// TOML config file; BOTAUTH_* environment variables override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the URL to visit for an authorization code
    AuthUrl,
    /// Exchange an authorization code and store the tokens
    Code(CodeArgs),
    /// Show the stored tokens
    Tokens,
    /// Check the stored token, refreshing it if expired
    Validate,
}

/// Arguments for `botauth code`.
#[derive(Parser, Debug)]
pub struct CodeArgs {
    /// Code shown by the provider after authorizing
    pub code: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Config file (if any) with environment variables layered on top.
pub fn load_config(path: Option<&Path>) -> Result<BotAuthConfig, ConfigError> {
    match path {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let mut config = BotAuthConfig::load_from_path(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => BotAuthConfig::from_env(),
    }
}
