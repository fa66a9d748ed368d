//! Chat-style commands a bot relays to the token manager.
//!
//! `<prefix> [set] code <code>` exchanges an authorization code and
//! `<prefix> tokens` shows the stored fields. Replies are plain lines the
//! caller sends back one message at a time.

use regex::Regex;

use crate::auth::{TokenManager, Validation};
use crate::config::ConfigError;

pub const DEFAULT_PREFIX: &str = "google-auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetCode(String),
    ShowTokens,
}

/// Matches incoming messages against the command patterns for one prefix.
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: String,
    set_code: Regex,
    tokens: Regex,
}

impl CommandParser {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(prefix.trim());
        Ok(Self {
            prefix: prefix.trim().to_string(),
            set_code: Regex::new(&format!(r"(?i){escaped}(\s+set)?\s+code\s+(\S+)"))?,
            tokens: Regex::new(&format!(r"(?i){escaped}\s+tokens"))?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parse(&self, message: &str) -> Option<Command> {
        if let Some(captures) = self.set_code.captures(message) {
            return captures
                .get(2)
                .map(|code| Command::SetCode(code.as_str().to_string()));
        }
        if self.tokens.is_match(message) {
            return Some(Command::ShowTokens);
        }
        None
    }
}

/// Run `command` against `manager` and return the reply lines.
pub async fn dispatch(manager: &TokenManager, command: Command) -> Vec<String> {
    match command {
        Command::SetCode(code) => {
            let mut replies = vec!["Attempting to set code...".to_string()];
            match manager.set_code(&code).await {
                Ok(_) => replies.push(format!(
                    "{} auth code successfully set",
                    manager.identity().name
                )),
                Err(err) => replies.push(err.user_message()),
            }
            replies
        }
        Command::ShowTokens => {
            let tokens = manager.tokens();
            vec![
                format!("token: {}", display_field(tokens.access_token.as_deref())),
                format!(
                    "refresh_token: {}",
                    display_field(tokens.refresh_token.as_deref())
                ),
                format!(
                    "expire_date: {}",
                    display_field(tokens.expiry_ms.map(|ms| ms.to_string()).as_deref())
                ),
            ]
        }
    }
}

/// Human-readable text for a validation outcome.
pub fn validation_message(outcome: &Validation, prefix: &str) -> String {
    match outcome {
        Validation::Ready(tokens) => match tokens.expires_at() {
            Some(at) => format!("Token valid until {}", at.to_rfc3339()),
            None => "Token valid".to_string(),
        },
        Validation::NeedsAuthorization { url } => authorization_message(url, prefix),
        Validation::RefreshFailed(err) => err.user_message(),
    }
}

pub fn authorization_message(url: &str, prefix: &str) -> String {
    format!("Authorize this app by visiting this url: {url} Then use `{prefix} set code <code>`")
}

/// Text for configuration failures a chat user can act on.
pub fn config_message(err: &ConfigError) -> String {
    match err {
        ConfigError::EmptyScopes => {
            "No scopes are configured. Set BOTAUTH_SCOPES to a semicolon-separated list of scopes."
                .to_string()
        }
        other => other.to_string(),
    }
}

fn display_field(value: Option<&str>) -> &str {
    value.unwrap_or("(none)")
}
