use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::client::{HttpOAuthClient, OAuthClient};
use super::error::{ExchangeError, RefreshError};
use super::token::{CredentialState, StoredTokens, TokenSet};
use super::url::AuthUrlBuilder;
use crate::config::{BotAuthConfig, ConfigError, ServiceIdentity};
use crate::store::{CredentialKeys, CredentialStore};

/// Outcome of [`TokenManager::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// A usable, unexpired token set.
    Ready(TokenSet),
    /// No usable credential; a human must visit `url` and submit the code.
    NeedsAuthorization { url: String },
    /// The refresh attempt failed. The stored state is left for the next
    /// call to retry, except that a rejected refresh token is cleared.
    RefreshFailed(RefreshError),
}

type RefreshOutcome = Result<TokenSet, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    generation: u64,
    refresh: SharedRefresh,
    task: AbortHandle,
}

enum RefreshSlot {
    /// Someone else refreshed between our read and taking the slot.
    Fresh(TokenSet),
    /// The credential disappeared (cleared after a rejected refresh).
    Unauthorized,
    Pending {
        generation: u64,
        refresh: SharedRefresh,
    },
}

/// Credential lifecycle for one [`ServiceIdentity`].
///
/// Share one instance (behind an `Arc`) between every caller that needs the
/// identity's token. The unexpired path of [`validate`](Self::validate) only
/// reads the store; an expired token is refreshed at most once at a time,
/// with concurrent callers waiting on the same refresh and receiving the
/// same outcome.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use botauth::auth::{TokenManager, Validation};
/// use botauth::config::BotAuthConfig;
/// use botauth::store::MemoryCredentialStore;
///
/// # async fn example() -> Result<(), botauth::error::BotAuthError> {
/// let config = BotAuthConfig::from_env()?;
/// let manager = TokenManager::from_config(&config, Arc::new(MemoryCredentialStore::new()))?;
/// match manager.validate().await? {
///     Validation::Ready(tokens) => println!("token expires at {}", tokens.expiry_ms),
///     Validation::NeedsAuthorization { url } => println!("visit {url}"),
///     Validation::RefreshFailed(err) => println!("{}", err.user_message()),
/// }
/// # Ok(())
/// # }
/// ```
pub struct TokenManager {
    identity: ServiceIdentity,
    keys: Arc<CredentialKeys>,
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn OAuthClient>,
    url_builder: AuthUrlBuilder,
    in_flight: Mutex<Option<InFlight>>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("identity", &self.identity)
            .field("keys", &self.keys)
            .field("url_builder", &self.url_builder)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        identity: ServiceIdentity,
        url_builder: AuthUrlBuilder,
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn OAuthClient>,
    ) -> Result<Self, ConfigError> {
        identity.validate()?;
        let keys = Arc::new(CredentialKeys::for_service(&identity.name));
        Ok(Self {
            identity,
            keys,
            store,
            client,
            url_builder,
            in_flight: Mutex::new(None),
            next_generation: AtomicU64::new(0),
        })
    }

    /// Manager talking HTTP to the configured endpoints.
    pub fn from_config(
        config: &BotAuthConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, ConfigError> {
        let client = HttpOAuthClient::new(&config.identity, &config.endpoints)
            .with_timeout(config.http_timeout);
        Self::new(
            config.identity.clone(),
            AuthUrlBuilder::new(config.endpoints.auth_url.clone()),
            store,
            Arc::new(client),
        )
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Store keys this manager reads and writes.
    pub fn keys(&self) -> &CredentialKeys {
        &self.keys
    }

    /// The raw stored fields, for display.
    pub fn tokens(&self) -> StoredTokens {
        self.keys.load(self.store.as_ref())
    }

    pub fn state(&self) -> CredentialState {
        self.tokens().state()
    }

    pub fn authorization_url(&self) -> Result<String, ConfigError> {
        self.url_builder.build(&self.identity)
    }

    /// Check the stored credential, refreshing it if it has expired.
    ///
    /// Errors only on configuration problems (no scopes to build an
    /// authorization URL from); every token outcome is a [`Validation`].
    pub async fn validate(&self) -> Result<Validation, ConfigError> {
        let Some(current) = self.tokens().to_token_set() else {
            return self.needs_authorization();
        };
        if !current.is_expired() {
            return Ok(Validation::Ready(current));
        }

        let (generation, refresh) = match self.join_or_start_refresh() {
            RefreshSlot::Fresh(tokens) => return Ok(Validation::Ready(tokens)),
            RefreshSlot::Unauthorized => return self.needs_authorization(),
            RefreshSlot::Pending {
                generation,
                refresh,
            } => (generation, refresh),
        };

        let outcome = refresh.await;
        self.finish_refresh(generation);
        Ok(match outcome {
            Ok(tokens) => Validation::Ready(tokens),
            Err(err) => Validation::RefreshFailed(err),
        })
    }

    /// Exchange a user-supplied authorization code and store the result,
    /// replacing whatever was stored before.
    pub async fn set_code(&self, code: &str) -> Result<TokenSet, ExchangeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ExchangeError::InvalidCode(
                "authorization code is empty".to_string(),
            ));
        }

        let tokens = match self.client.exchange_code(code).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(service = %self.identity.name, error = %err, "authorization code exchange failed");
                return Err(err);
            }
        };
        if tokens.refresh_token.is_none() {
            warn!(
                service = %self.identity.name,
                "code exchange returned no refresh token; re-authorization will be needed once it expires"
            );
        }
        self.keys.write(self.store.as_ref(), &tokens);
        persist(self.store.as_ref(), &self.identity.name);
        info!(service = %self.identity.name, expiry_ms = tokens.expiry_ms, "stored tokens from authorization code");
        Ok(tokens)
    }

    fn needs_authorization(&self) -> Result<Validation, ConfigError> {
        let url = self.authorization_url()?;
        debug!(service = %self.identity.name, "no usable credential; authorization required");
        Ok(Validation::NeedsAuthorization { url })
    }

    /// Join the in-flight refresh or start one. Runs under the slot lock and
    /// re-reads the store so a refresh that completed after our first read
    /// is not repeated with a stale refresh token.
    fn join_or_start_refresh(&self) -> RefreshSlot {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // A finished entry is left behind when every waiter was dropped.
        if slot
            .as_ref()
            .is_some_and(|in_flight| in_flight.task.is_finished())
        {
            *slot = None;
        }
        if let Some(in_flight) = slot.as_ref() {
            debug!(service = %self.identity.name, "joining in-flight token refresh");
            return RefreshSlot::Pending {
                generation: in_flight.generation,
                refresh: in_flight.refresh.clone(),
            };
        }

        let current = match self.tokens().to_token_set() {
            None => return RefreshSlot::Unauthorized,
            Some(tokens) if !tokens.is_expired() => return RefreshSlot::Fresh(tokens),
            Some(tokens) => tokens,
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        debug!(
            service = %self.identity.name,
            expiry_ms = current.expiry_ms,
            "access token expired; refreshing"
        );
        // Spawned so the refresh still completes and persists when every
        // waiting caller is dropped.
        let task = tokio::spawn(refresh_and_store(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            Arc::clone(&self.keys),
            self.identity.name.clone(),
            current,
        ));
        let abort = task.abort_handle();
        let refresh = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(RefreshError::Network(format!("refresh task failed: {err}"))),
            }
        }
        .boxed()
        .shared();
        *slot = Some(InFlight {
            generation,
            refresh: refresh.clone(),
            task: abort,
        });
        RefreshSlot::Pending {
            generation,
            refresh,
        }
    }

    fn finish_refresh(&self, generation: u64) {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            *slot = None;
        }
    }
}

/// The single refresh whose result may be persisted.
async fn refresh_and_store(
    client: Arc<dyn OAuthClient>,
    store: Arc<dyn CredentialStore>,
    keys: Arc<CredentialKeys>,
    service: String,
    current: TokenSet,
) -> RefreshOutcome {
    let Some(refresh_token) = current.refresh_token.clone() else {
        return Err(RefreshError::InvalidGrant(
            "no refresh token stored".to_string(),
        ));
    };

    match client.refresh_token(&refresh_token).await {
        Ok(refreshed) => {
            let merged = current.merge_refresh(refreshed);
            keys.write(store.as_ref(), &merged);
            persist(store.as_ref(), &service);
            info!(service = %service, expiry_ms = merged.expiry_ms, "access token refreshed");
            Ok(merged)
        }
        Err(err) if err.is_terminal() => {
            warn!(
                service = %service,
                error = %err,
                "refresh token rejected; clearing it so the next validation asks for authorization"
            );
            // A code submitted while the refresh was in flight has already
            // replaced the rejected token.
            if store.get(&keys.refresh_token).as_deref() == Some(refresh_token.as_str()) {
                store.remove(&keys.refresh_token);
                persist(store.as_ref(), &service);
            } else {
                debug!(service = %service, "refresh token replaced during refresh; keeping it");
            }
            Err(err)
        }
        Err(err) => {
            warn!(service = %service, error = %err, "token refresh failed; will retry on next validation");
            Err(err)
        }
    }
}

/// Values stay visible in-process and the flusher retries later, so a
/// failed flush is logged rather than surfaced.
fn persist(store: &dyn CredentialStore, service: &str) {
    if let Err(err) = store.persist() {
        warn!(service = %service, error = %err, "could not persist credentials");
    }
}
