//! Headless dashboard controllers.
//!
//! All long-lived client state (current snapshot, open tabs, timers) lives
//! in one owned [`Dashboard`] value rather than ambient module state, so a
//! frontend (or a test) can run several independent sessions. Background
//! work reports back over an mpsc channel of [`UiUpdate`]s which the
//! frontend drains with [`Dashboard::pump`] before re-rendering.

#![forbid(unsafe_code)]

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use provdash_api::ProvApi;
use provdash_core::{Instance, Snapshot};

mod actions;
mod intent;
mod logparse;
mod model;
mod overlay;
mod sync;
mod util;
mod viewer;

pub use actions::ActionDispatcher;
pub use intent::UiIntent;
pub use logparse::{annotate_line, Span, SpanKind};
pub use model::{LogTab, SyncNote, UiUpdate};
pub use overlay::{OverlayId, OverlayState};
pub use sync::SyncEngine;
pub use util::{
    clock, format_timestamp, playbook_glyph, relative_time, status_glyph, sync_indicator,
    tab_glyph,
};
pub use viewer::{LogViewer, ViewerPhase};

/// Owner of all dashboard client state and the controllers that mutate it.
pub struct Dashboard {
    api: Arc<dyn ProvApi>,
    rx: Receiver<UiUpdate>,
    tx: Sender<UiUpdate>,
    current: Arc<ArcSwap<Snapshot>>,
    pub sync: SyncEngine,
    pub actions: ActionDispatcher,
    pub viewer: LogViewer,
    pub overlay: OverlayState,
    /// Instance shown in the details overlay.
    pub detail: Option<Instance>,
    pub detail_task: Option<JoinHandle<()>>,
    last_sync: Option<SyncNote>,
    /// Most recent operator-facing notice (action outcome, error, bulk
    /// summary). The frontend decides how sticky to make it.
    pub last_message: Option<String>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn ProvApi>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        let current = Arc::new(ArcSwap::from_pointee(Snapshot::default()));
        let sync = SyncEngine::new(api.clone(), tx.clone(), current.clone(), interval);
        let actions = ActionDispatcher::new(api.clone(), tx.clone(), current.clone());
        let viewer = LogViewer::new(api.clone(), tx.clone());
        Self {
            api,
            rx,
            tx,
            current,
            sync,
            actions,
            viewer,
            overlay: OverlayState::default(),
            detail: None,
            detail_task: None,
            last_sync: None,
            last_message: None,
        }
    }

    /// The snapshot currently on screen. Replaced atomically by a successful
    /// refresh; a failed refresh leaves it as-is.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn sync_note(&self) -> Option<SyncNote> {
        self.last_sync
    }

    /// "Last updated" / "Last update failed" line, once anything happened.
    pub fn indicator(&self) -> Option<String> {
        self.last_sync.as_ref().map(sync_indicator)
    }

    /// Route one operator intent to the controller that owns the state.
    pub fn dispatch(&mut self, intent: UiIntent) {
        debug!(?intent, "dispatch");
        match intent {
            UiIntent::Refresh => self.sync.manual_refresh(),
            UiIntent::AddInstance(req) => self.actions.add_instance(req),
            UiIntent::RetryInstance(id) => self.actions.retry_instance(id),
            UiIntent::RetryPlaybook { instance, playbook } => {
                self.actions.retry_playbook(instance, playbook)
            }
            UiIntent::DeleteInstance(id) => self.actions.delete_instance(id),
            UiIntent::RetryAll => self.actions.retry_all(),
            UiIntent::ShowDetails(id) => self.show_details(&id),
            UiIntent::ShowLogs(id) => self.viewer.open(&id),
            UiIntent::ActivateTab(id) => self.viewer.activate_tab(id),
            UiIntent::CloseTab(id) => {
                if self.viewer.close_tab(id) {
                    self.overlay.close_all();
                }
            }
            UiIntent::ShowOverlay(id) => self.overlay.show(id),
            UiIntent::CloseOverlays => self.close_all_overlays(),
        }
    }

    /// Hide every overlay. This is the dismissal path, so it also clears the
    /// log viewer; no tab state survives closing the backdrop.
    pub fn close_all_overlays(&mut self) {
        self.overlay.close_all();
        self.viewer.close_all();
    }

    fn show_details(&mut self, id: &str) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        let id = id.to_string();
        self.detail_task = Some(tokio::spawn(async move {
            match api.instance(&id).await {
                Ok(inst) => {
                    let _ = tx.send(UiUpdate::DetailLoaded(Box::new(inst)));
                }
                Err(e) => {
                    warn!(instance = %id, error = %e, "details: fetch failed");
                    let _ = tx.send(UiUpdate::DetailError(e.to_string()));
                }
            }
        }));
    }

    /// Drain and apply pending updates. Returns true when anything changed,
    /// i.e. the frontend should re-render.
    pub fn pump(&mut self) -> bool {
        let updates: Vec<UiUpdate> = self.rx.try_iter().collect();
        let changed = !updates.is_empty();
        for u in updates {
            self.apply(u);
        }
        changed
    }

    fn apply(&mut self, update: UiUpdate) {
        match update {
            UiUpdate::Snapshot(snap) => {
                let at = snap.fetched_at.unwrap_or_else(chrono::Utc::now);
                self.last_sync = Some(SyncNote::Updated(at));
            }
            UiUpdate::RefreshFailed { at, error } => {
                // Prior snapshot stays on screen; only the indicator flips.
                self.last_sync = Some(SyncNote::Failed(at));
                self.last_message = Some(error);
            }
            UiUpdate::DetailLoaded(inst) => {
                self.detail = Some(*inst);
                self.overlay.show(OverlayId::Details);
            }
            UiUpdate::DetailError(e) => self.last_message = Some(e),
            UiUpdate::ActionDone { message } => {
                self.last_message = Some(message);
                if self.overlay.is_visible(OverlayId::AddInstance) {
                    self.overlay.close_all();
                }
            }
            UiUpdate::ActionError(e) => self.last_message = Some(e),
            UiUpdate::BulkRetryDone { restarted, failed } => {
                self.last_message = Some(format!("{} restarted, {} failed", restarted, failed));
            }
            UiUpdate::TabLoaded { session, tab } => self.viewer.add_tab(session, tab),
            UiUpdate::ViewerReady { session } => {
                if self.viewer.finish_open(session) {
                    self.overlay.show(OverlayId::LogViewer);
                }
            }
            UiUpdate::ViewerError { session, error } => {
                if self.viewer.fail(session) {
                    self.last_message = Some(error);
                }
            }
        }
    }
}
