#![forbid(unsafe_code)]

use uuid::Uuid;

use provdash_core::NewInstance;

use crate::overlay::OverlayId;

/// Declarative operator intents.
///
/// Frontends render markup from a snapshot and emit these instead of binding
/// mutations directly to elements; `Dashboard::dispatch` routes each to the
/// controller that owns the state it touches.
#[derive(Debug, Clone, PartialEq)]
pub enum UiIntent {
    Refresh,
    AddInstance(NewInstance),
    RetryInstance(String),
    RetryPlaybook { instance: String, playbook: String },
    DeleteInstance(String),
    RetryAll,
    ShowDetails(String),
    ShowLogs(String),
    ActivateTab(Uuid),
    CloseTab(Uuid),
    ShowOverlay(OverlayId),
    CloseOverlays,
}
