#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use provdash_core::{Instance, PlaybookStatus, Snapshot};

/// Messages background tasks post back to the dashboard loop.
///
/// Viewer-related variants carry the session that spawned them; results
/// from a session the operator has since closed are discarded on receipt.
#[derive(Debug)]
pub enum UiUpdate {
    Snapshot(Arc<Snapshot>),
    RefreshFailed { at: DateTime<Utc>, error: String },
    DetailLoaded(Box<Instance>),
    DetailError(String),
    ActionDone { message: String },
    ActionError(String),
    BulkRetryDone { restarted: usize, failed: usize },
    TabLoaded { session: u64, tab: LogTab },
    ViewerReady { session: u64 },
    ViewerError { session: u64, error: String },
}

/// One open log tab: a single (instance, playbook) pair. Ids are generated
/// per open event and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTab {
    pub id: Uuid,
    pub instance_id: String,
    pub playbook: String,
    pub content: String,
    pub status: PlaybookStatus,
    pub fetched_at: DateTime<Utc>,
    /// Set when no candidate log resource could be fetched at all (as
    /// opposed to none existing); the content is a synthesized summary
    /// either way.
    pub error: bool,
}

/// Staleness indicator for the snapshot currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncNote {
    Updated(DateTime<Utc>),
    Failed(DateTime<Utc>),
}
