#![forbid(unsafe_code)]

use std::sync::mpsc::Sender;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use provdash_api::probe::probe_ordered;
use provdash_api::{ProvApi, LOG_SUFFIXES};
use provdash_core::PlaybookResult;

use crate::model::{LogTab, UiUpdate};

/// Where the viewer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Closed,
    Loading,
    Open,
}

/// Tabbed per-playbook log viewer for one instance.
///
/// Opening fetches the instance detail and resolves one tab per reported
/// playbook, in reported order, each tab's log probing completing before the
/// next begins. The fetch runs on its own cycle, uncoupled from the polling
/// schedule. Every async result carries the `session` that spawned it;
/// results from a session the operator has since closed are dropped, since
/// in-flight requests themselves cannot be cancelled.
pub struct LogViewer {
    api: Arc<dyn ProvApi>,
    tx: Sender<UiUpdate>,
    session: u64,
    phase: ViewerPhase,
    tabs: Vec<LogTab>,
    active: Option<Uuid>,
    title: String,
    /// The in-flight open task, awaitable by callers.
    pub task: Option<JoinHandle<()>>,
}

impl LogViewer {
    pub fn new(api: Arc<dyn ProvApi>, tx: Sender<UiUpdate>) -> Self {
        Self {
            api,
            tx,
            session: 0,
            phase: ViewerPhase::Closed,
            tabs: Vec::new(),
            active: None,
            title: String::new(),
            task: None,
        }
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn tabs(&self) -> &[LogTab] {
        &self.tabs
    }

    pub fn active(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&LogTab> {
        let id = self.active?;
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Open the viewer for one instance: fetch its detail and resolve one
    /// tab per reported playbook result.
    pub fn open(&mut self, instance_id: &str) {
        self.reset();
        self.session += 1;
        self.phase = ViewerPhase::Loading;
        self.title = format!("Logs: {}", instance_id);
        let session = self.session;
        let api = self.api.clone();
        let tx = self.tx.clone();
        let id = instance_id.to_string();
        info!(instance = %id, session, "logs: open start");
        self.task = Some(tokio::spawn(async move {
            let detail = match api.instance(&id).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(instance = %id, error = %e, "logs: detail fetch failed");
                    let _ = tx.send(UiUpdate::ViewerError {
                        session,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            if detail.playbook_results.is_empty() {
                info!(instance = %id, "logs: nothing to show");
                let _ = tx.send(UiUpdate::ViewerError {
                    session,
                    error: format!("No playbook results found for {}", id),
                });
                return;
            }
            for pb in &detail.playbook_results {
                let tab = build_tab(api.as_ref(), &id, pb).await;
                let _ = tx.send(UiUpdate::TabLoaded { session, tab });
            }
            let _ = tx.send(UiUpdate::ViewerReady { session });
        }));
    }

    /// Mark a tab active. Unknown ids are a no-op.
    pub fn activate_tab(&mut self, id: Uuid) {
        let Some(tab) = self.tabs.iter().find(|t| t.id == id) else {
            return;
        };
        self.title = format!("Logs: {} - {}", tab.instance_id, tab.playbook);
        self.active = Some(id);
    }

    /// Close one tab. When the active tab goes, the first remaining tab
    /// takes over; closing the last tab closes the viewer. Returns true when
    /// the viewer is closed as a result.
    pub fn close_tab(&mut self, id: Uuid) -> bool {
        let Some(pos) = self.tabs.iter().position(|t| t.id == id) else {
            return false;
        };
        self.tabs.remove(pos);
        if self.tabs.is_empty() {
            self.close_all();
            return true;
        }
        if self.active == Some(id) {
            let first = self.tabs[0].id;
            self.activate_tab(first);
        }
        false
    }

    /// Unconditionally drop all viewer state. Any still-running open task
    /// keeps running but its results no longer match the session.
    pub fn close_all(&mut self) {
        self.session += 1;
        self.reset();
    }

    fn reset(&mut self) {
        self.phase = ViewerPhase::Closed;
        self.tabs.clear();
        self.active = None;
        self.title.clear();
    }

    pub(crate) fn add_tab(&mut self, session: u64, tab: LogTab) {
        if session != self.session || self.phase == ViewerPhase::Closed {
            debug!(session, current = self.session, "logs: dropping stale tab");
            return;
        }
        self.tabs.push(tab);
    }

    /// All tabs delivered; activate the first one. Returns true when the
    /// viewer ended up open.
    pub(crate) fn finish_open(&mut self, session: u64) -> bool {
        if session != self.session {
            return false;
        }
        if self.tabs.is_empty() {
            self.reset();
            return false;
        }
        self.phase = ViewerPhase::Open;
        if self.active.is_none() {
            let first = self.tabs[0].id;
            self.activate_tab(first);
        }
        info!(tabs = self.tabs.len(), "logs: open");
        true
    }

    /// The open task failed. Returns true when it was the current session.
    pub(crate) fn fail(&mut self, session: u64) -> bool {
        if session != self.session {
            return false;
        }
        self.reset();
        true
    }
}

/// Resolve one tab's content: probe the candidate log paths in order, fall
/// back to a synthesized status summary so the tab always has something to
/// display.
async fn build_tab(api: &dyn ProvApi, instance_id: &str, pb: &PlaybookResult) -> LogTab {
    let probed = probe_ordered(LOG_SUFFIXES, |suffix| {
        api.fetch_log(instance_id, &pb.name, suffix)
    })
    .await;
    let (content, error) = match probed {
        Ok(Some(text)) if !text.trim().is_empty() => (text, false),
        Ok(_) => (synthesize_summary(pb), false),
        Err(errors) => {
            warn!(instance = %instance_id, playbook = %pb.name, attempts = errors.len(), "logs: all probes failed");
            (synthesize_summary(pb), true)
        }
    };
    LogTab {
        id: Uuid::new_v4(),
        instance_id: instance_id.to_string(),
        playbook: pb.name.clone(),
        content,
        status: pb.status,
        fetched_at: Utc::now(),
        error,
    }
}

/// Textual stand-in for a missing log file, built from the recorded run.
fn synthesize_summary(pb: &PlaybookResult) -> String {
    let mut out = format!("No log file found for playbook: {}\n\n", pb.name);
    out.push_str(&format!("Status: {}\n", pb.status));
    if let Some(t) = pb.started_at {
        out.push_str(&format!(
            "Started: {}\n",
            t.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    if let Some(t) = pb.completed_at {
        out.push_str(&format!(
            "Completed: {}\n",
            t.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    if let Some(d) = pb.duration_sec {
        out.push_str(&format!("Duration: {:.2}s\n", d));
    }
    if let Some(e) = &pb.error {
        out.push_str(&format!("Error: {}\n", e));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use provdash_core::PlaybookStatus;

    fn result(name: &str, status: PlaybookStatus) -> PlaybookResult {
        PlaybookResult {
            name: name.to_string(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn summary_is_nonempty_and_names_the_status() {
        let mut pb = result("deploy", PlaybookStatus::Failed);
        pb.duration_sec = Some(3.14159);
        pb.error = Some("unreachable".into());
        let s = synthesize_summary(&pb);
        assert!(!s.is_empty());
        assert!(s.contains("Status: failed"));
        assert!(s.contains("Duration: 3.14s"));
        assert!(s.contains("Error: unreachable"));
        assert!(s.contains("deploy"));
    }

    #[test]
    fn summary_omits_absent_fields() {
        let s = synthesize_summary(&result("base", PlaybookStatus::Pending));
        assert!(s.contains("Status: pending"));
        assert!(!s.contains("Started:"));
        assert!(!s.contains("Duration:"));
        assert!(!s.contains("Error:"));
    }
}
