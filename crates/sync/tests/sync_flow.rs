//! Full sync passes against the in-process mock backend.

use std::sync::Arc;

use chrono::Utc;

use bottega_auth::{CredentialSet, TokenHolder};
use bottega_mockapi::MockState;
use bottega_orders::{Order, OrderLine, OrderStatus};
use bottega_remote::ApiClient;
use bottega_state::OrderBook;
use bottega_store::{KvStore, keys};
use bottega_sync::{PendingChangeQueue, SyncEngine, SyncStatus};

struct Fixture {
    mock: Arc<MockState>,
    store: KvStore,
    queue: PendingChangeQueue,
    book: Arc<OrderBook>,
    engine: SyncEngine,
}

async fn fixture() -> Fixture {
    let mock = Arc::new(MockState::new());
    let (addr, _handle) = bottega_mockapi::serve(mock.clone()).await;
    fixture_against(mock, format!("http://{addr}")).await
}

async fn fixture_against(mock: Arc<MockState>, base_url: String) -> Fixture {
    let tag = uuid::Uuid::now_v7();
    let store = KvStore::at_path(std::env::temp_dir().join(format!("bottega-sync-{tag}.db")));
    let queue =
        PendingChangeQueue::at_path(std::env::temp_dir().join(format!("bottega-syncq-{tag}.db")));

    let holder = Arc::new(TokenHolder::load(store.clone()).await);
    let api = Arc::new(ApiClient::new(base_url, holder, CredentialSet::builtin()).unwrap());

    let book = Arc::new(OrderBook::hydrate(store.clone(), Arc::new(queue.clone())).await);
    let engine = SyncEngine::new(api, store.clone(), queue.clone(), book.clone());

    Fixture {
        mock,
        store,
        queue,
        book,
        engine,
    }
}

fn sample_order(name: &str) -> Order {
    Order::new(
        name,
        Utc::now(),
        vec![OrderLine {
            product: "grissini".to_string(),
            quantity: 3.0,
            unit: "pz".to_string(),
            unit_price: 120,
        }],
    )
    .unwrap()
}

#[tokio::test]
async fn pass_pushes_local_changes_and_drains_the_queue() {
    let f = fixture().await;

    let a = f.book.add(sample_order("Rossi")).await.unwrap();
    let b = f.book.add(sample_order("Bianchi")).await.unwrap();
    f.book.set_status(a.id, OrderStatus::InProgress).await.unwrap();
    assert!(f.queue.pending_count().await.unwrap() > 0);

    let outcome = f.engine.sync_data().await;
    assert!(outcome.success, "unexpected failure: {}", outcome.message);

    let remote = f.mock.orders_snapshot();
    assert_eq!(remote.len(), 2);
    let remote_a = remote.iter().find(|o| o.id == a.id).unwrap();
    assert_eq!(remote_a.status, OrderStatus::InProgress);
    assert!(remote.iter().any(|o| o.id == b.id));

    assert_eq!(f.queue.pending_count().await.unwrap(), 0);

    let state = f.engine.state().await;
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.last_synced_at.is_some());
    assert_eq!(state.last_error, None);
    assert_eq!(state.pending, 0);
}

#[tokio::test]
async fn pass_pulls_remote_orders_into_book_and_store() {
    let f = fixture().await;
    let remote_order = sample_order("Verdi");
    f.mock.seed_orders(vec![remote_order.clone()]);

    let outcome = f.engine.sync_data().await;
    assert!(outcome.success);

    assert_eq!(f.book.list().await, vec![remote_order.clone()]);
    let persisted: Vec<Order> = f.store.get_or_default(keys::ORDINI).await;
    assert_eq!(persisted, vec![remote_order]);
}

#[tokio::test]
async fn unreachable_backend_leaves_changes_queued_and_flags_the_state() {
    let mock = Arc::new(MockState::new());
    let f = fixture_against(mock, "http://127.0.0.1:9".to_string()).await;

    f.book.add(sample_order("Rossi")).await.unwrap();

    let outcome = f.engine.sync_data().await;
    assert!(!outcome.success);

    assert_eq!(f.queue.pending_count().await.unwrap(), 1);
    let state = f.engine.state().await;
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.last_error.is_some());
    assert_eq!(state.last_synced_at, None);
    assert_eq!(state.pending, 1);
}

#[tokio::test]
async fn queued_changes_survive_an_outage_and_sync_later() {
    let mock = Arc::new(MockState::new());
    let offline = fixture_against(mock.clone(), "http://127.0.0.1:9".to_string()).await;

    let order = offline.book.add(sample_order("Rossi")).await.unwrap();
    assert!(!offline.engine.sync_data().await.success);

    // Connectivity returns: same store and queue, reachable backend.
    let (addr, _handle) = bottega_mockapi::serve(mock.clone()).await;
    let holder = Arc::new(TokenHolder::load(offline.store.clone()).await);
    let api = Arc::new(
        ApiClient::new(format!("http://{addr}"), holder, CredentialSet::builtin()).unwrap(),
    );
    let book = Arc::new(
        OrderBook::hydrate(offline.store.clone(), Arc::new(offline.queue.clone())).await,
    );
    let engine = SyncEngine::new(api, offline.store.clone(), offline.queue.clone(), book);

    let outcome = engine.sync_data().await;
    assert!(outcome.success, "unexpected failure: {}", outcome.message);
    assert!(mock.orders_snapshot().iter().any(|o| o.id == order.id));
    assert_eq!(offline.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn backup_then_restore_rolls_the_store_back() {
    let f = fixture().await;

    let kept = f.book.add(sample_order("Rossi")).await.unwrap();
    let info = f.engine.backup_data().await.unwrap();
    assert!(info.keys >= 1);

    f.book.add(sample_order("Bianchi")).await.unwrap();
    assert_eq!(f.book.len().await, 2);

    f.engine.restore_backup(info.snapshot_at).await.unwrap();

    let after = f.book.list().await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, kept.id);

    let listed = f.engine.get_backups().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].snapshot_at, info.snapshot_at);
}

#[tokio::test]
async fn overlapping_sync_call_is_not_reported_as_a_failure() {
    let f = fixture().await;
    // Slow the backend down so the second call lands mid-pass.
    f.mock
        .set_response_delay(std::time::Duration::from_millis(200));

    let engine = Arc::new(f.engine);
    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync_data().await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let overlap = engine.sync_data().await;
    assert!(overlap.success);
    assert_eq!(overlap.message, "sync already in progress");

    let outcome = first.await.unwrap();
    assert!(outcome.success, "unexpected failure: {}", outcome.message);
    assert_eq!(engine.state().await.last_error, None);
}

#[tokio::test]
async fn pull_fills_the_clienti_key() {
    let f = fixture().await;

    let outcome = f.engine.sync_data().await;
    assert!(outcome.success);

    // Remote has no clients; the key still holds an explicit empty list.
    let raw = f.store.get_json(keys::CLIENTI).await.unwrap();
    assert_eq!(raw, Some(serde_json::json!([])));
}
