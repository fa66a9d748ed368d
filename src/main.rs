//! botauth CLI binary entry point.

use std::sync::Arc;

use botauth::auth::TokenManager;
use botauth::cli::{auth, load_config, Cli, Commands};
use botauth::store::{CredentialStore, FileCredentialStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> botauth::error::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let store = Arc::new(match &config.store_path {
        Some(path) => FileCredentialStore::open(path)?,
        None => FileCredentialStore::open_default()?,
    });
    tracing::debug!(path = %store.path().display(), "opened credential store");
    let flusher = store.spawn_flusher(config.flush_interval);

    let manager = TokenManager::from_config(&config, Arc::clone(&store) as Arc<dyn CredentialStore>)?;
    let result = match cli.command {
        Commands::AuthUrl => auth::handle_auth_url(&manager),
        Commands::Code(args) => auth::handle_code(&manager, &args.code).await,
        Commands::Tokens => auth::handle_tokens(&manager).await,
        Commands::Validate => auth::handle_validate(&manager).await,
    };

    flusher.shutdown().await;
    result
}
