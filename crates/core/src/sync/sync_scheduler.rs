//! Background triggers for sync passes: periodic timer and connectivity regain.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::queue_model::SyncPassResult;
use super::sync_engine::SyncEngine;

struct BackgroundTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl BackgroundTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals the loop to exit at its next wait point. A pass already in
    /// flight runs to completion.
    fn stop(self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    periodic: Mutex<Option<BackgroundTask>>,
    listener: Mutex<Option<BackgroundTask>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            periodic: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Starts the periodic timer. Returns false when it was already running.
    pub async fn start(&self) -> bool {
        let mut guard = self.periodic.lock().await;
        if guard.as_ref().is_some_and(BackgroundTask::is_running) {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                if !engine.connectivity().is_online() {
                    continue;
                }
                let result = engine.run_sync_pass().await;
                debug!(
                    "[SyncScheduler] Periodic pass status={:?} processed={} failed={}",
                    result.status, result.processed_count, result.failed_count
                );
            }
            debug!("[SyncScheduler] Periodic timer stopped");
        });

        *guard = Some(BackgroundTask { handle, shutdown });
        info!(
            "[SyncScheduler] Periodic sync started (every {}s)",
            period.as_secs()
        );
        true
    }

    /// Stops the periodic timer; future passes are no longer scheduled.
    pub async fn stop(&self) {
        if let Some(task) = self.periodic.lock().await.take() {
            task.stop();
            info!("[SyncScheduler] Periodic sync stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(BackgroundTask::is_running)
    }

    /// Runs a pass whenever connectivity flips from offline to online.
    /// Returns false when the listener was already running.
    pub async fn start_connectivity_listener(&self) -> bool {
        let mut guard = self.listener.lock().await;
        if guard.as_ref().is_some_and(BackgroundTask::is_running) {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let mut online_rx = engine.connectivity().subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
                let online = *online_rx.borrow_and_update();
                if online {
                    info!("[SyncScheduler] Connectivity regained; draining offline queue");
                    engine.run_sync_pass().await;
                }
            }
        });

        *guard = Some(BackgroundTask { handle, shutdown });
        true
    }

    pub async fn stop_connectivity_listener(&self) {
        if let Some(task) = self.listener.lock().await.take() {
            task.stop();
        }
    }

    /// Manual trigger.
    pub async fn trigger_now(&self) -> SyncPassResult {
        self.engine.run_sync_pass().await
    }

    pub async fn shutdown(&self) {
        self.stop().await;
        self.stop_connectivity_listener().await;
    }
}
