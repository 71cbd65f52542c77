//! Console entry point: wires the store, auth, remote client, order book and
//! sync worker together and runs until ctrl-c.

use std::sync::Arc;

use anyhow::Context;

use bottega_auth::TokenHolder;
use bottega_remote::ApiClient;
use bottega_state::OrderBook;
use bottega_store::KvStore;
use bottega_sync::{PendingChangeQueue, SyncEngine, SyncEvent, SyncWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bottega_observability::init();

    let store = KvStore::open_default().context("failed to open local store")?;
    tracing::info!(path = ?store.path(), "local store ready");

    let holder = Arc::new(TokenHolder::load(store.clone()).await);
    let api =
        Arc::new(ApiClient::from_env(holder.clone()).context("failed to build API client")?);
    tracing::info!(base_url = api.base_url(), "remote client ready");

    let queue = PendingChangeQueue::open_default().context("failed to open change queue")?;
    let book = Arc::new(OrderBook::hydrate(store.clone(), Arc::new(queue.clone())).await);
    tracing::info!(orders = book.len().await, "order book hydrated");

    let engine = Arc::new(SyncEngine::new(
        api.clone(),
        store.clone(),
        queue,
        book.clone(),
    ));

    let worker = SyncWorker::new(engine.clone(), api.clone());
    let mut events = worker.subscribe();
    let worker_handle = worker.start();

    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::Completed { message } => tracing::info!(%message, "sync completed"),
                SyncEvent::Failed { error } => tracing::warn!(%error, "sync failed"),
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    worker.shutdown();
    let _ = worker_handle.await;
    event_logger.abort();

    let state = engine.state().await;
    if state.pending > 0 {
        tracing::warn!(pending = state.pending, "exiting with unsynced changes queued");
    }

    Ok(())
}
