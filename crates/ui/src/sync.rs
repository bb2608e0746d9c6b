#![forbid(unsafe_code)]

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use provdash_api::ProvApi;
use provdash_core::Snapshot;

use crate::model::UiUpdate;

/// Handle to the single pending scheduled tick. Cancelling aborts the
/// sleeping task; an already in-flight refresh is never cancelled.
pub(crate) struct TickHandle {
    task: JoinHandle<()>,
}

impl TickHandle {
    fn cancel(self) {
        self.task.abort();
    }
}

/// Periodic synchronization of instances + stats + config.
///
/// Each refresh issues the three reads concurrently and publishes the merged
/// snapshot as one atomic replacement; a failed refresh leaves the published
/// snapshot untouched and only flips the staleness indicator.
pub struct SyncEngine {
    api: Arc<dyn ProvApi>,
    tx: Sender<UiUpdate>,
    current: Arc<ArcSwap<Snapshot>>,
    interval: Duration,
    ticker: Option<TickHandle>,
    /// Most recently spawned one-shot refresh. Kept so callers can await
    /// completion; dropping it detaches the task, never aborts it.
    pub refresh_task: Option<JoinHandle<()>>,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn ProvApi>,
        tx: Sender<UiUpdate>,
        current: Arc<ArcSwap<Snapshot>>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            tx,
            current,
            interval,
            ticker: None,
            refresh_task: None,
        }
    }

    /// Refresh immediately without touching the schedule. Several refreshes
    /// may be in flight at once; each publishes atomically on completion.
    pub fn refresh_now(&mut self) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        self.refresh_task = Some(tokio::spawn(async move {
            run_refresh(api, tx, current).await;
        }));
    }

    /// Start the recurring schedule. One looping task owns the sleep, so at
    /// most one tick is ever pending; each tick runs to completion before
    /// the next sleep starts.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        let interval = self.interval;
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                run_refresh(api.clone(), tx.clone(), current.clone()).await;
            }
        });
        self.ticker = Some(TickHandle { task });
        info!(interval_ms = %self.interval.as_millis(), "sync: schedule started");
    }

    /// Cancel the pending tick, refresh immediately, resume the schedule.
    /// The next scheduled tick lands a full interval after this call rather
    /// than wherever the old timer happened to be.
    pub fn manual_refresh(&mut self) {
        self.stop();
        self.refresh_now();
        self.start();
    }

    /// Cancel the pending tick. In-flight refreshes are unaffected.
    pub fn stop(&mut self) {
        if let Some(t) = self.ticker.take() {
            t.cancel();
            info!("sync: schedule stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// One synchronization cycle: three concurrent reads, merged all-or-nothing.
pub(crate) async fn run_refresh(
    api: Arc<dyn ProvApi>,
    tx: Sender<UiUpdate>,
    current: Arc<ArcSwap<Snapshot>>,
) {
    let t0 = Instant::now();
    let (instances, stats, config) = tokio::join!(api.instances(), api.stats(), api.config());
    match (instances, stats, config) {
        (Ok(instances), Ok(stats), Ok(config)) => {
            let snap = Arc::new(Snapshot {
                instances,
                stats,
                config,
                fetched_at: Some(Utc::now()),
            });
            current.store(snap.clone());
            info!(instances = snap.instances.len(), took_ms = %t0.elapsed().as_millis(), "sync: refresh ok");
            let _ = tx.send(UiUpdate::Snapshot(snap));
        }
        (instances, stats, config) => {
            let error = instances
                .err()
                .or(stats.err())
                .or(config.err())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "refresh failed".to_string());
            warn!(error = %error, took_ms = %t0.elapsed().as_millis(), "sync: refresh failed");
            let _ = tx.send(UiUpdate::RefreshFailed {
                at: Utc::now(),
                error,
            });
        }
    }
}
