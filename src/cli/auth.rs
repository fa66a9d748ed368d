//! CLI command handlers.

use crate::auth::{CredentialState, TokenManager, Validation};
use crate::commands::{config_message, dispatch, validation_message, Command};
use crate::error::{BotAuthError, Result};

fn print_authorization(url: &str) {
    println!("🔗 Authorize this app by visiting this url: {url}");
    println!("📋 Then run `botauth code <code>`");
}

/// Handle `botauth auth-url`.
pub fn handle_auth_url(manager: &TokenManager) -> Result<()> {
    match manager.authorization_url() {
        Ok(url) => {
            print_authorization(&url);
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {}", config_message(&err));
            Err(err.into())
        }
    }
}

/// Handle `botauth code <code>`.
pub async fn handle_code(manager: &TokenManager, code: &str) -> Result<()> {
    println!("Attempting to set code...");
    match manager.set_code(code).await {
        Ok(tokens) => {
            println!("✅ {} auth code successfully set", manager.identity().name);
            if let Some(at) = tokens.expires_at() {
                println!("   Expires {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {}", err.user_message());
            Err(err.into())
        }
    }
}

/// Handle `botauth tokens`.
pub async fn handle_tokens(manager: &TokenManager) -> Result<()> {
    let status = match manager.state() {
        CredentialState::Valid => "✅ Valid",
        CredentialState::Expired => "⚠️  Expired (refreshes on next validate)",
        CredentialState::Unset => "❌ Not authorized",
    };
    println!("🔐 {}: {status}\n", manager.identity().name);
    for line in dispatch(manager, Command::ShowTokens).await {
        println!("  {line}");
    }
    Ok(())
}

/// Handle `botauth validate`.
pub async fn handle_validate(manager: &TokenManager) -> Result<()> {
    let outcome = match manager.validate().await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("❌ {}", config_message(&err));
            return Err(err.into());
        }
    };
    match &outcome {
        Validation::Ready(_) => {
            println!("✅ {}", validation_message(&outcome, "botauth"));
            Ok(())
        }
        Validation::NeedsAuthorization { url } => {
            print_authorization(url);
            Err(BotAuthError::AuthorizationRequired { url: url.clone() })
        }
        Validation::RefreshFailed(err) => {
            eprintln!("❌ {}", err.user_message());
            Err(err.clone().into())
        }
    }
}
