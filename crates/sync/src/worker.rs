//! Background worker running sync passes on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

use bottega_remote::ApiClient;

use crate::engine::SyncEngine;

const SYNC_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Broadcast notification of a finished sync pass.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Completed { message: String },
    Failed { error: String },
}

/// Periodic sync driver.
///
/// Every 30 seconds (skipping missed ticks) it probes connectivity and, when
/// online, runs one engine pass. Consecutive failures back off exponentially
/// up to five minutes. Shutdown is cooperative via [`SyncWorker::shutdown`].
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    api: Arc<ApiClient>,
    shutdown: Arc<Notify>,
    events: broadcast::Sender<SyncEvent>,
    interval: Duration,
}

impl SyncWorker {
    pub fn new(engine: Arc<SyncEngine>, api: Arc<ApiClient>) -> Self {
        Self::with_interval(engine, api, SYNC_INTERVAL)
    }

    /// Worker with a custom tick interval (tests).
    pub fn with_interval(
        engine: Arc<SyncEngine>,
        api: Arc<ApiClient>,
        interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            engine,
            api,
            shutdown: Arc::new(Notify::new()),
            events,
            interval,
        }
    }

    /// Subscribe to pass completions/failures.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Handle for requesting shutdown after the worker has been started.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Spawn the background loop.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.engine.clone();
        let api = self.api.clone();
        let shutdown = self.shutdown.clone();
        let events = self.events.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            tracing::info!("background sync worker started");

            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut consecutive_failures = 0u32;
            let mut next_allowed = Instant::now();

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("sync worker received shutdown signal");
                        break;
                    }
                    _ = tick.tick() => {
                        if Instant::now() < next_allowed {
                            tracing::debug!("skipping sync tick: backing off");
                            continue;
                        }

                        if !api.check_connectivity().await {
                            tracing::debug!("skipping sync tick: no connectivity");
                            continue;
                        }

                        let outcome = engine.sync_data().await;
                        if outcome.success {
                            consecutive_failures = 0;
                            next_allowed = Instant::now();
                            let _ = events.send(SyncEvent::Completed {
                                message: outcome.message,
                            });
                        } else {
                            consecutive_failures += 1;
                            let backoff = std::cmp::min(
                                Duration::from_secs(1) * (1 << consecutive_failures.min(8)),
                                MAX_BACKOFF,
                            );
                            tracing::warn!(
                                failures = consecutive_failures,
                                ?backoff,
                                message = %outcome.message,
                                "sync pass failed; backing off"
                            );
                            next_allowed = Instant::now() + backoff;
                            let _ = events.send(SyncEvent::Failed {
                                error: outcome.message,
                            });
                        }
                    }
                }
            }

            tracing::info!("background sync worker stopped");
        })
    }
}
