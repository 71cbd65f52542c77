//! Background worker behavior against the in-process mock backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use bottega_auth::{CredentialSet, TokenHolder};
use bottega_mockapi::MockState;
use bottega_remote::ApiClient;
use bottega_state::OrderBook;
use bottega_store::KvStore;
use bottega_sync::{PendingChangeQueue, SyncEngine, SyncEvent, SyncWorker};

async fn worker_against(mock: Arc<MockState>, interval: Duration) -> SyncWorker {
    let (addr, _handle) = bottega_mockapi::serve(mock).await;

    let tag = uuid::Uuid::now_v7();
    let store = KvStore::at_path(std::env::temp_dir().join(format!("bottega-worker-{tag}.db")));
    let queue =
        PendingChangeQueue::at_path(std::env::temp_dir().join(format!("bottega-workerq-{tag}.db")));

    let holder = Arc::new(TokenHolder::load(store.clone()).await);
    let api = Arc::new(
        ApiClient::new(format!("http://{addr}"), holder, CredentialSet::builtin()).unwrap(),
    );
    let book = Arc::new(OrderBook::hydrate(store.clone(), Arc::new(queue.clone())).await);
    let engine = Arc::new(SyncEngine::new(api.clone(), store, queue, book));

    SyncWorker::with_interval(engine, api, interval)
}

#[tokio::test]
async fn worker_emits_completed_events_and_shuts_down() {
    let mock = Arc::new(MockState::new());
    let worker = worker_against(mock, Duration::from_millis(50)).await;

    let mut events = worker.subscribe();
    let handle = worker.start();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no sync event within 5s")
        .unwrap();
    assert!(matches!(event, SyncEvent::Completed { .. }));

    worker.shutdown();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn worker_backs_off_after_a_failed_pass() {
    let mock = Arc::new(MockState::new());
    // Every login is rejected, so each pass fails with Unauthenticated.
    mock.set_accounts(Vec::new());

    let worker = worker_against(mock, Duration::from_millis(50)).await;
    let mut events = worker.subscribe();
    let handle = worker.start();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no sync event within 5s")
        .unwrap();
    assert!(matches!(event, SyncEvent::Failed { .. }));

    // First failure backs off for 2s; with a 50ms interval the following
    // ticks are skipped, so no further event arrives in this window.
    let second = timeout(Duration::from_millis(500), events.recv()).await;
    assert!(second.is_err(), "tick ran during the backoff window");

    worker.shutdown();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn worker_skips_passes_without_connectivity() {
    // Nothing is listening on the target port; the connectivity probe fails
    // and the engine is never invoked, so no event of either kind appears.
    let store = KvStore::at_path(
        std::env::temp_dir().join(format!("bottega-workeroff-{}.db", uuid::Uuid::now_v7())),
    );
    let queue = PendingChangeQueue::at_path(
        std::env::temp_dir().join(format!("bottega-workeroffq-{}.db", uuid::Uuid::now_v7())),
    );
    let holder = Arc::new(TokenHolder::load(store.clone()).await);
    let api = Arc::new(
        ApiClient::new("http://127.0.0.1:9", holder, CredentialSet::builtin()).unwrap(),
    );
    let book = Arc::new(OrderBook::hydrate(store.clone(), Arc::new(queue.clone())).await);
    let engine = Arc::new(SyncEngine::new(api.clone(), store, queue, book));

    let worker = SyncWorker::with_interval(engine.clone(), api, Duration::from_millis(50));
    let mut events = worker.subscribe();
    let handle = worker.start();

    let event = timeout(Duration::from_millis(400), events.recv()).await;
    assert!(event.is_err(), "worker synced without connectivity");
    assert_eq!(engine.state().await.last_synced_at, None);

    worker.shutdown();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after shutdown")
        .unwrap();
}
