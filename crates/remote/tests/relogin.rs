//! End-to-end auth behavior against the in-process mock backend.

use std::sync::Arc;

use chrono::Utc;

use bottega_auth::{AuthError, CredentialSet, Credentials, TokenHolder};
use bottega_mockapi::MockState;
use bottega_orders::{Order, OrderLine};
use bottega_remote::{ApiClient, ApiError};
use bottega_store::KvStore;

fn temp_store() -> KvStore {
    let path = std::env::temp_dir().join(format!("bottega-relogin-{}.db", uuid::Uuid::now_v7()));
    KvStore::at_path(path)
}

async fn client_against(
    state: &Arc<MockState>,
    credentials: CredentialSet,
) -> (ApiClient, Arc<TokenHolder>) {
    let (addr, _handle) = bottega_mockapi::serve(state.clone()).await;
    let holder = Arc::new(TokenHolder::load(temp_store()).await);
    let client = ApiClient::new(format!("http://{addr}"), holder.clone(), credentials).unwrap();
    (client, holder)
}

fn sample_order() -> Order {
    Order::new(
        "Rossi",
        Utc::now(),
        vec![OrderLine {
            product: "pane di segale".to_string(),
            quantity: 1.0,
            unit: "kg".to_string(),
            unit_price: 480,
        }],
    )
    .unwrap()
}

#[tokio::test]
async fn first_request_logs_in_once_and_persists_session() {
    let state = Arc::new(MockState::new());
    let (client, holder) = client_against(&state, CredentialSet::builtin()).await;

    let orders = client.list_orders().await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(state.login_attempts(), 1);
    assert!(holder.token().await.is_some());

    // Session is reused; no further logins.
    client.list_orders().await.unwrap();
    assert_eq!(state.login_attempts(), 1);
}

#[tokio::test]
async fn revoked_token_triggers_exactly_one_relogin_and_retry() {
    let state = Arc::new(MockState::new());
    let (client, _holder) = client_against(&state, CredentialSet::builtin()).await;

    client.list_orders().await.unwrap();
    assert_eq!(state.login_attempts(), 1);

    // Server-side expiry: the stored token is now rejected with 401.
    state.revoke_all_tokens();

    let order = sample_order();
    let created = client.create_order(&order).await.unwrap();
    assert_eq!(created.id, order.id);
    assert_eq!(state.login_attempts(), 2);
    assert_eq!(state.orders_snapshot().len(), 1);
}

#[tokio::test]
async fn concurrent_first_requests_share_one_login() {
    let state = Arc::new(MockState::new());
    let (client, _holder) = client_against(&state, CredentialSet::builtin()).await;

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.list_orders().await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(state.login_attempts(), 1);
}

#[tokio::test]
async fn rejected_credentials_surface_unauthenticated() {
    let state = Arc::new(MockState::new());
    let wrong = CredentialSet::new(vec![Credentials::new("ghost", "nope")]);
    let (client, holder) = client_against(&state, wrong).await;

    let err = client.list_orders().await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(AuthError::Unauthenticated)));
    // No partial session was stored.
    assert!(holder.token().await.is_none());
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let holder = Arc::new(TokenHolder::load(temp_store()).await);
    // Port 9 (discard) is never listening in the test environment.
    let client = ApiClient::new(
        "http://127.0.0.1:9",
        holder,
        CredentialSet::builtin(),
    )
    .unwrap();

    assert!(!client.check_connectivity().await);
    let err = client.list_orders().await.unwrap_err();
    match err {
        ApiError::Network(_) | ApiError::Auth(AuthError::Network(_)) => {}
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn order_updates_round_trip_through_the_api() {
    let state = Arc::new(MockState::new());
    let (client, _holder) = client_against(&state, CredentialSet::builtin()).await;

    let mut order = sample_order();
    client.create_order(&order).await.unwrap();

    order.note = Some("consegna alle 8".to_string());
    let updated = client.update_order(&order).await.unwrap();
    assert_eq!(updated.note.as_deref(), Some("consegna alle 8"));

    let fetched = client.get_order(order.id).await.unwrap();
    assert_eq!(fetched.note.as_deref(), Some("consegna alle 8"));
}
