//! Token manager lifecycle: validation, single-flight refresh, code
//! exchange and the stored state each outcome leaves behind.

mod auth_support;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;

use auth_support::{harness, harness_with_store, seed, token_set, FakeOAuthClient, AUTH_URL};
use botauth::auth::{CredentialState, ExchangeError, RefreshError, Validation};
use botauth::store::{CredentialStore, MemoryCredentialStore};

const HOUR_MS: i64 = 3_600_000;

// ---------------------------------------------------------------------------
// Fast path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unexpired_token_is_returned_without_network_call() {
    let h = harness(FakeOAuthClient::new());
    let tokens = token_set("A1", Some("R1"), HOUR_MS);
    seed(&h, &tokens);

    let outcome = h.manager.validate().await.unwrap();

    assert_eq!(outcome, Validation::Ready(tokens));
    assert_eq!(h.client.network_calls(), 0);
    assert_eq!(h.store.persist_count(), 0);
}

#[tokio::test]
async fn empty_store_needs_authorization_with_every_scope() {
    let h = harness(FakeOAuthClient::new());

    let outcome = h.manager.validate().await.unwrap();

    let Validation::NeedsAuthorization { url } = outcome else {
        panic!("expected NeedsAuthorization, got {outcome:?}");
    };
    assert!(url.starts_with(AUTH_URL));
    let parsed = reqwest::Url::parse(&url).unwrap();
    let scope = parsed
        .query_pairs()
        .find(|(k, _)| k == "scope")
        .map(|(_, v)| v.into_owned())
        .expect("scope parameter");
    for expected in &h.manager.identity().scopes {
        assert!(scope.split(' ').any(|s| s == expected), "{expected} missing from {scope}");
    }
    assert_eq!(h.client.network_calls(), 0);
}

#[tokio::test]
async fn access_token_without_refresh_token_needs_authorization() {
    let h = harness(FakeOAuthClient::new());
    h.store.set(&h.keys.token, "A1".to_string());

    let outcome = h.manager.validate().await.unwrap();

    assert!(matches!(outcome, Validation::NeedsAuthorization { .. }));
    assert_eq!(h.client.network_calls(), 0);
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_without_new_refresh_token_keeps_the_old_one() {
    let client = FakeOAuthClient::new();
    let refreshed = token_set("A2", None, HOUR_MS);
    client.push_refresh(Ok(refreshed.clone()));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let outcome = h.manager.validate().await.unwrap();

    let Validation::Ready(tokens) = outcome else {
        panic!("expected Ready, got {outcome:?}");
    };
    assert_eq!(tokens.access_token, "A2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
    assert_eq!(tokens.expiry_ms, refreshed.expiry_ms);
    assert_eq!(h.client.refresh_tokens_seen(), vec!["R1".to_string()]);

    let stored = h.manager.tokens();
    assert_eq!(stored.access_token.as_deref(), Some("A2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("R1"));
    assert_eq!(stored.expiry_ms, Some(refreshed.expiry_ms));
    assert_eq!(h.store.persist_count(), 1);
}

#[tokio::test]
async fn refresh_with_rotated_refresh_token_stores_it() {
    let client = FakeOAuthClient::new();
    client.push_refresh(Ok(token_set("A2", Some("R2"), HOUR_MS)));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    h.manager.validate().await.unwrap();

    assert_eq!(h.store.get(&h.keys.refresh_token).as_deref(), Some("R2"));
    assert_eq!(h.manager.state(), CredentialState::Valid);
}

#[tokio::test]
async fn missing_expiry_is_treated_as_expired() {
    let client = FakeOAuthClient::new();
    client.push_refresh(Ok(token_set("A2", None, HOUR_MS)));
    let h = harness(client);
    h.store.set(&h.keys.token, "A1".to_string());
    h.store.set(&h.keys.refresh_token, "R1".to_string());
    assert_eq!(h.manager.state(), CredentialState::Expired);

    let outcome = h.manager.validate().await.unwrap();

    assert!(matches!(outcome, Validation::Ready(ref t) if t.access_token == "A2"));
    assert_eq!(h.client.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_validations_share_one_refresh() {
    let client = FakeOAuthClient::new().with_delay(Duration::from_millis(200));
    client.push_refresh(Ok(token_set("A2", None, HOUR_MS)));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let outcomes = join_all((0..32).map(|_| h.manager.validate())).await;

    assert_eq!(h.client.refresh_calls(), 1);
    let first = outcomes[0].clone().unwrap();
    assert!(matches!(first, Validation::Ready(ref t) if t.access_token == "A2"));
    for outcome in outcomes {
        assert_eq!(outcome.unwrap(), first);
    }
    assert_eq!(h.store.persist_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_validations_across_threads_share_one_refresh() {
    let client = FakeOAuthClient::new().with_delay(Duration::from_millis(50));
    client.push_refresh(Ok(token_set("A2", Some("R2"), HOUR_MS)));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&h.manager);
            tokio::spawn(async move { manager.validate().await })
        })
        .collect();
    let mut access_tokens = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Validation::Ready(tokens) => access_tokens.push(tokens.access_token),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    assert_eq!(h.client.refresh_calls(), 1);
    assert!(access_tokens.iter().all(|token| token == "A2"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_failure_is_shared_and_next_call_retries() {
    let client = FakeOAuthClient::new().with_delay(Duration::from_millis(100));
    client.push_refresh(Err(RefreshError::Network("connection reset".to_string())));
    client.push_refresh(Ok(token_set("A2", None, HOUR_MS)));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let outcomes = join_all((0..8).map(|_| h.manager.validate())).await;

    assert_eq!(h.client.refresh_calls(), 1);
    for outcome in outcomes {
        assert_eq!(
            outcome.unwrap(),
            Validation::RefreshFailed(RefreshError::Network("connection reset".to_string()))
        );
    }

    let retried = h.manager.validate().await.unwrap();
    assert!(matches!(retried, Validation::Ready(ref t) if t.access_token == "A2"));
    assert_eq!(h.client.refresh_calls(), 2);
}

#[tokio::test]
async fn transient_failure_leaves_store_unchanged() {
    let client = FakeOAuthClient::new();
    client.push_refresh(Err(RefreshError::Provider {
        status: Some(503),
        message: "backend unavailable".to_string(),
    }));
    let h = harness(client);
    let original = token_set("A1", Some("R1"), -1_000);
    seed(&h, &original);
    let before = h.manager.tokens();

    let outcome = h.manager.validate().await.unwrap();

    assert!(matches!(
        outcome,
        Validation::RefreshFailed(RefreshError::Provider { status: Some(503), .. })
    ));
    assert_eq!(h.manager.tokens(), before);
    assert_eq!(h.store.persist_count(), 0);
}

#[tokio::test]
async fn invalid_grant_clears_refresh_token_then_asks_for_authorization() {
    let client = FakeOAuthClient::new();
    client.push_refresh(Err(RefreshError::InvalidGrant(
        "Token has been expired or revoked.".to_string(),
    )));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let first = h.manager.validate().await.unwrap();
    assert!(matches!(
        first,
        Validation::RefreshFailed(RefreshError::InvalidGrant(_))
    ));
    assert_eq!(h.store.get(&h.keys.refresh_token), None);
    assert_eq!(h.store.persist_count(), 1);
    assert_eq!(h.manager.state(), CredentialState::Unset);

    let second = h.manager.validate().await.unwrap();
    assert!(matches!(second, Validation::NeedsAuthorization { .. }));
    assert_eq!(h.client.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_invalid_grant_is_shared_and_clears_once() {
    let client = FakeOAuthClient::new().with_delay(Duration::from_millis(100));
    client.push_refresh(Err(RefreshError::InvalidGrant("revoked".to_string())));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let outcomes = join_all((0..8).map(|_| h.manager.validate())).await;

    assert_eq!(h.client.refresh_calls(), 1);
    for outcome in outcomes {
        assert_eq!(
            outcome.unwrap(),
            Validation::RefreshFailed(RefreshError::InvalidGrant("revoked".to_string()))
        );
    }
    assert_eq!(h.store.persist_count(), 1);
    assert_eq!(h.store.get(&h.keys.refresh_token), None);

    let next = h.manager.validate().await.unwrap();
    assert!(matches!(next, Validation::NeedsAuthorization { .. }));
    assert_eq!(h.client.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_grant_keeps_refresh_token_replaced_mid_refresh() {
    let client = FakeOAuthClient::new().with_delay(Duration::from_millis(100));
    client.push_refresh(Err(RefreshError::InvalidGrant("revoked".to_string())));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let manager = Arc::clone(&h.manager);
    let pending = tokio::spawn(async move { manager.validate().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.client.refresh_calls(), 1);
    seed(&h, &token_set("A9", Some("R9"), HOUR_MS));

    let outcome = pending.await.unwrap().unwrap();

    assert!(matches!(
        outcome,
        Validation::RefreshFailed(RefreshError::InvalidGrant(_))
    ));
    assert_eq!(h.store.get(&h.keys.refresh_token).as_deref(), Some("R9"));
    assert_eq!(h.store.persist_count(), 0);
    let next = h.manager.validate().await.unwrap();
    assert!(matches!(next, Validation::Ready(ref t) if t.access_token == "A9"));
    assert_eq!(h.client.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_completes_after_its_only_caller_is_dropped() {
    let client = FakeOAuthClient::new().with_delay(Duration::from_millis(100));
    client.push_refresh(Ok(token_set("A2", None, HOUR_MS)));
    client.push_refresh(Ok(token_set("A3", None, HOUR_MS)));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    let abandoned = tokio::time::timeout(Duration::from_millis(10), h.manager.validate()).await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.store.get(&h.keys.token).as_deref(), Some("A2"));
    assert_eq!(h.store.get(&h.keys.refresh_token).as_deref(), Some("R1"));
    assert_eq!(h.store.persist_count(), 1);
    let ready = h.manager.validate().await.unwrap();
    assert!(matches!(ready, Validation::Ready(ref t) if t.access_token == "A2"));
    assert_eq!(h.client.refresh_calls(), 1);

    seed(&h, &token_set("A2", Some("R1"), -1_000));
    let refreshed = h.manager.validate().await.unwrap();
    assert!(matches!(refreshed, Validation::Ready(ref t) if t.access_token == "A3"));
    assert_eq!(h.client.refresh_calls(), 2);
}

// ---------------------------------------------------------------------------
// Code exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_code_then_validate_needs_no_network() {
    let client = FakeOAuthClient::new();
    let exchanged = token_set("A1", Some("R1"), HOUR_MS);
    client.push_exchange(Ok(exchanged.clone()));
    let h = harness(client);

    let stored = h.manager.set_code("  4/0AbCd  ").await.unwrap();
    assert_eq!(stored, exchanged);
    assert_eq!(h.store.persist_count(), 1);

    let outcome = h.manager.validate().await.unwrap();
    assert_eq!(outcome, Validation::Ready(exchanged));
    assert_eq!(h.client.exchange_calls(), 1);
    assert_eq!(h.client.refresh_calls(), 0);
}

#[tokio::test]
async fn set_code_overwrites_previous_credentials() {
    let client = FakeOAuthClient::new();
    client.push_exchange(Ok(token_set("A9", Some("R9"), HOUR_MS)));
    let h = harness(client);
    seed(&h, &token_set("A1", Some("R1"), -1_000));

    h.manager.set_code("code").await.unwrap();

    let stored = h.manager.tokens();
    assert_eq!(stored.access_token.as_deref(), Some("A9"));
    assert_eq!(stored.refresh_token.as_deref(), Some("R9"));
}

#[tokio::test]
async fn failed_exchange_leaves_store_untouched() {
    let client = FakeOAuthClient::new();
    client.push_exchange(Err(ExchangeError::InvalidCode(
        "invalid_grant: Bad Request".to_string(),
    )));
    let h = harness(client);
    let original = token_set("A1", Some("R1"), HOUR_MS);
    seed(&h, &original);

    let err = h.manager.set_code("used-code").await.unwrap_err();

    assert!(matches!(err, ExchangeError::InvalidCode(_)));
    assert_eq!(h.manager.tokens().to_token_set(), Some(original));
    assert_eq!(h.store.persist_count(), 0);
}

#[tokio::test]
async fn empty_code_is_rejected_before_exchange() {
    let h = harness(FakeOAuthClient::new());

    let err = h.manager.set_code("").await.unwrap_err();

    assert!(matches!(err, ExchangeError::InvalidCode(_)));
    assert_eq!(h.client.exchange_calls(), 0);
}

// ---------------------------------------------------------------------------
// Shared store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identities_sharing_a_store_do_not_interfere() {
    let store = Arc::new(MemoryCredentialStore::new());
    let calendar_client = FakeOAuthClient::new();
    calendar_client.push_exchange(Ok(token_set("CAL", Some("CR"), HOUR_MS)));
    let calendar = harness_with_store(calendar_client, Arc::clone(&store), "calendar");
    let drive = harness_with_store(FakeOAuthClient::new(), Arc::clone(&store), "drive");

    calendar.manager.set_code("code").await.unwrap();

    assert_eq!(calendar.manager.state(), CredentialState::Valid);
    assert_eq!(drive.manager.state(), CredentialState::Unset);
    assert_eq!(store.get("CALENDAR_AUTH_TOKEN").as_deref(), Some("CAL"));
    assert_eq!(store.get("DRIVE_AUTH_TOKEN"), None);
}
