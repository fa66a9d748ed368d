#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use botauth::auth::token::now_millis;
use botauth::auth::{
    AuthUrlBuilder, ExchangeError, OAuthClient, RefreshError, TokenManager, TokenSet,
};
use botauth::config::ServiceIdentity;
use botauth::store::{CredentialKeys, CredentialStore, MemoryCredentialStore};

pub const AUTH_URL: &str = "https://auth.example.com/o/oauth2/auth";

/// Scripted [`OAuthClient`] that counts calls and records what it was sent.
///
/// Responses are popped in order; an exhausted script fails with a network
/// error so an unexpected extra call is visible in assertions.
#[derive(Default)]
pub struct FakeOAuthClient {
    exchange_responses: Mutex<VecDeque<Result<TokenSet, ExchangeError>>>,
    refresh_responses: Mutex<VecDeque<Result<TokenSet, RefreshError>>>,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeOAuthClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_exchange(&self, response: Result<TokenSet, ExchangeError>) {
        self.exchange_responses
            .lock()
            .expect("script lock poisoned")
            .push_back(response);
    }

    pub fn push_refresh(&self, response: Result<TokenSet, RefreshError>) {
        self.refresh_responses
            .lock()
            .expect("script lock poisoned")
            .push_back(response);
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.exchange_calls() + self.refresh_calls()
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen
            .lock()
            .expect("record lock poisoned")
            .clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl OAuthClient for FakeOAuthClient {
    async fn exchange_code(&self, _code: &str) -> Result<TokenSet, ExchangeError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.exchange_responses
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Network("no scripted response".to_string())))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, RefreshError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .expect("record lock poisoned")
            .push(refresh_token.to_string());
        self.pause().await;
        self.refresh_responses
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(RefreshError::Network("no scripted response".to_string())))
    }
}

pub fn identity(name: &str) -> ServiceIdentity {
    ServiceIdentity::builder()
        .name(name)
        .client_id("client-id")
        .client_secret("client-secret")
        .redirect_url("urn:ietf:wg:oauth:2.0:oob")
        .scopes(vec![
            "https://www.googleapis.com/auth/calendar".to_string(),
            "https://www.googleapis.com/auth/drive.readonly".to_string(),
        ])
        .build()
}

pub struct Harness {
    pub store: Arc<MemoryCredentialStore>,
    pub client: Arc<FakeOAuthClient>,
    pub manager: Arc<TokenManager>,
    pub keys: CredentialKeys,
}

pub fn harness(client: FakeOAuthClient) -> Harness {
    harness_with_store(client, Arc::new(MemoryCredentialStore::new()), "google")
}

pub fn harness_with_store(
    client: FakeOAuthClient,
    store: Arc<MemoryCredentialStore>,
    name: &str,
) -> Harness {
    let client = Arc::new(client);
    let manager = TokenManager::new(
        identity(name),
        AuthUrlBuilder::new(AUTH_URL),
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        Arc::clone(&client) as Arc<dyn OAuthClient>,
    )
    .expect("valid identity");
    Harness {
        store,
        client,
        keys: manager.keys().clone(),
        manager: Arc::new(manager),
    }
}

/// Token set expiring `expires_in_ms` from now (negative for already expired).
pub fn token_set(access: &str, refresh: Option<&str>, expires_in_ms: i64) -> TokenSet {
    TokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.map(String::from),
        expiry_ms: now_millis() + expires_in_ms,
    }
}

pub fn seed(harness: &Harness, tokens: &TokenSet) {
    harness.keys.write(harness.store.as_ref(), tokens);
}
