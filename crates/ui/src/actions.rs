#![forbid(unsafe_code)]

use std::sync::mpsc::Sender;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use provdash_api::{ApiError, ProvApi};
use provdash_core::{NewInstance, Snapshot};

use crate::model::UiUpdate;
use crate::sync::run_refresh;

/// User-initiated mutating operations.
///
/// Every operation follows the same pattern: validate locally where there is
/// anything to validate, issue one request, treat an explicit
/// `success: false` like a transport failure, surface failures through
/// `UiUpdate::ActionError`, and refresh the snapshot before reporting
/// success. There is no retry and no offline queueing; the operator sees the
/// outcome of the one attempt that was made.
pub struct ActionDispatcher {
    api: Arc<dyn ProvApi>,
    tx: Sender<UiUpdate>,
    current: Arc<ArcSwap<Snapshot>>,
    /// Most recently spawned action, awaitable by callers.
    pub task: Option<JoinHandle<()>>,
}

impl ActionDispatcher {
    pub fn new(
        api: Arc<dyn ProvApi>,
        tx: Sender<UiUpdate>,
        current: Arc<ArcSwap<Snapshot>>,
    ) -> Self {
        Self {
            api,
            tx,
            current,
            task: None,
        }
    }

    pub fn add_instance(&mut self, req: NewInstance) {
        if req.instance_id.trim().is_empty() || req.ip_address.trim().is_empty() {
            let err = ApiError::Validation("instance_id and ip_address are required".into());
            let _ = self.tx.send(UiUpdate::ActionError(err.to_string()));
            return;
        }
        info!(instance = %req.instance_id, "actions: add start");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        self.task = Some(tokio::spawn(async move {
            let res = api
                .create_instance(&req)
                .await
                .and_then(|r| r.ok_or("Failed to add instance"));
            match res {
                Ok(_) => {
                    info!(instance = %req.instance_id, "actions: add ok");
                    run_refresh(api, tx.clone(), current).await;
                    let _ = tx.send(UiUpdate::ActionDone {
                        message: format!("instance {} added", req.instance_id),
                    });
                }
                Err(e) => {
                    warn!(instance = %req.instance_id, error = %e, "actions: add failed");
                    let _ = tx.send(UiUpdate::ActionError(e.to_string()));
                }
            }
        }));
    }

    pub fn retry_instance(&mut self, id: String) {
        info!(instance = %id, "actions: retry start");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        self.task = Some(tokio::spawn(async move {
            let res = api
                .retry_instance(&id)
                .await
                .and_then(|r| r.ok_or("Restart failed"));
            match res {
                Ok(resp) => {
                    info!(instance = %id, "actions: retry ok");
                    run_refresh(api, tx.clone(), current).await;
                    let message = resp
                        .message
                        .unwrap_or_else(|| format!("retry triggered for {}", id));
                    let _ = tx.send(UiUpdate::ActionDone { message });
                }
                Err(e) => {
                    warn!(instance = %id, error = %e, "actions: retry failed");
                    let _ = tx.send(UiUpdate::ActionError(e.to_string()));
                }
            }
        }));
    }

    pub fn retry_playbook(&mut self, id: String, playbook: String) {
        info!(instance = %id, playbook = %playbook, "actions: retry playbook start");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        self.task = Some(tokio::spawn(async move {
            let res = api
                .retry_playbook(&id, &playbook)
                .await
                .and_then(|r| r.ok_or("Restart failed"));
            match res {
                Ok(resp) => {
                    info!(instance = %id, playbook = %playbook, "actions: retry playbook ok");
                    run_refresh(api, tx.clone(), current).await;
                    let message = resp
                        .message
                        .unwrap_or_else(|| format!("retry triggered for {}/{}", id, playbook));
                    let _ = tx.send(UiUpdate::ActionDone { message });
                }
                Err(e) => {
                    warn!(instance = %id, playbook = %playbook, error = %e, "actions: retry playbook failed");
                    let _ = tx.send(UiUpdate::ActionError(e.to_string()));
                }
            }
        }));
    }

    pub fn delete_instance(&mut self, id: String) {
        info!(instance = %id, "actions: delete start");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        self.task = Some(tokio::spawn(async move {
            let res = api
                .delete_instance(&id)
                .await
                .and_then(|r| r.ok_or("Delete failed"));
            match res {
                Ok(_) => {
                    info!(instance = %id, "actions: delete ok");
                    run_refresh(api, tx.clone(), current).await;
                    let _ = tx.send(UiUpdate::ActionDone {
                        message: format!("instance {} deleted", id),
                    });
                }
                Err(e) => {
                    warn!(instance = %id, error = %e, "actions: delete failed");
                    let _ = tx.send(UiUpdate::ActionError(e.to_string()));
                }
            }
        }));
    }

    /// Restart every instance, strictly one retry in flight at a time.
    ///
    /// A failure for one instance never aborts the rest; per-instance
    /// outcomes are counted and reported in aggregate after one final
    /// refresh. Serializing the calls bounds the load a single bulk action
    /// can put on the backend.
    pub fn retry_all(&mut self) {
        info!("actions: retry all start");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.current.clone();
        self.task = Some(tokio::spawn(async move {
            let instances = match api.instances().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "actions: retry all list failed");
                    let _ = tx.send(UiUpdate::ActionError(e.to_string()));
                    return;
                }
            };
            let mut restarted = 0usize;
            let mut failed = 0usize;
            for inst in &instances {
                let res = api
                    .retry_instance(&inst.instance_id)
                    .await
                    .and_then(|r| r.ok_or("Restart failed"));
                match res {
                    Ok(_) => restarted += 1,
                    Err(e) => {
                        warn!(instance = %inst.instance_id, error = %e, "actions: retry all item failed");
                        failed += 1;
                    }
                }
            }
            run_refresh(api, tx.clone(), current).await;
            info!(restarted, failed, "actions: retry all done");
            let _ = tx.send(UiUpdate::BulkRetryDone { restarted, failed });
        }));
    }
}
