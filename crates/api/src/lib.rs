//! Backend API facade.
//!
//! This crate defines the trait and error types the frontends (CLI, headless
//! dashboard controllers) depend on. The real implementation lives in
//! `provdash-http`; `MockApi` here backs the controller tests.

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use provdash_core::{BackendConfig, Instance, NewInstance, Stats};

pub mod probe;

/// Candidate suffixes for a playbook's log resource, probed in this order.
pub const LOG_SUFFIXES: [&str; 3] = [".log", ".txt", ""];

/// Client-side error taxonomy.
///
/// `Transport` covers requests that could not complete or came back with a
/// non-success status (the message is already normalized to something an
/// operator can read). `Application` is a well-formed response that carries
/// an explicit failure flag. `Validation` is a client-side required-field
/// check that failed before any request was made.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("backend: {0}")]
    Application(String),
    #[error("validation: {0}")]
    Validation(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Response body of the mutating endpoints. A missing `success` field means
/// the call succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ActionResponse {
    pub fn success() -> Self {
        Self { success: true, message: None, error: None }
    }

    /// Fold an explicit `success: false` into the error taxonomy, preferring
    /// the backend's own message over `fallback`.
    pub fn ok_or(self, fallback: &str) -> ApiResult<ActionResponse> {
        if self.success {
            Ok(self)
        } else {
            let msg = self
                .error
                .or(self.message)
                .unwrap_or_else(|| fallback.to_string());
            Err(ApiError::Application(msg))
        }
    }
}

/// The backend surface the dashboard consumes.
#[async_trait::async_trait]
pub trait ProvApi: Send + Sync {
    /// `GET /api/instances`
    async fn instances(&self) -> ApiResult<Vec<Instance>>;

    /// `GET /api/stats`
    async fn stats(&self) -> ApiResult<Stats>;

    /// `GET /api/config`
    async fn config(&self) -> ApiResult<BackendConfig>;

    /// `GET /api/instance/{id}`, full detail including playbook results.
    async fn instance(&self, id: &str) -> ApiResult<Instance>;

    /// `POST /api/instances`
    async fn create_instance(&self, req: &NewInstance) -> ApiResult<ActionResponse>;

    /// `POST /api/instance/{id}/retry`
    async fn retry_instance(&self, id: &str) -> ApiResult<ActionResponse>;

    /// `POST /api/instance/{id}/playbook/{name}/retry`
    async fn retry_playbook(&self, id: &str, playbook: &str) -> ApiResult<ActionResponse>;

    /// `POST /api/instance/{id}/delete`
    async fn delete_instance(&self, id: &str) -> ApiResult<ActionResponse>;

    /// `GET /api/instance/{id}/logs/{playbook}{suffix}`, raw log text.
    /// `Ok(None)` means the resource does not exist under this suffix, as
    /// opposed to a fetch that failed outright.
    async fn fetch_log(&self, id: &str, playbook: &str, suffix: &str) -> ApiResult<Option<String>>;

    /// `GET /health`
    async fn health(&self) -> ApiResult<serde_json::Value>;
}

// ----------------- Mock implementation -----------------

/// In-memory implementation for tests. Records every call in order so
/// ordering properties (probe sequence, bulk sequencing) are assertable.
#[derive(Default)]
pub struct MockApi {
    pub instances: Vec<Instance>,
    pub stats: Stats,
    pub config: BackendConfig,
    pub details: HashMap<String, Instance>,
    /// Log content keyed by `"{instance}/{playbook}{suffix}"`.
    pub logs: HashMap<String, String>,
    fail: Mutex<HashSet<String>>,
    reject: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Force a transport error for one call key (e.g. `"stats"`,
    /// `"retry:b"`). Takes `&self` so behavior can change mid-test, after
    /// the mock is shared.
    pub fn fail_on(&self, key: &str) {
        self.fail.lock().unwrap().insert(key.to_string());
    }

    /// Answer one call key with an explicit `success: false`.
    pub fn reject_on(&self, key: &str) {
        self.reject.lock().unwrap().insert(key.to_string());
    }

    fn begin(&self, key: &str) -> ApiResult<()> {
        self.calls.lock().unwrap().push(key.to_string());
        if self.fail.lock().unwrap().contains(key) {
            Err(ApiError::Transport(format!("{} unavailable", key)))
        } else {
            Ok(())
        }
    }

    fn action(&self, key: &str) -> ApiResult<ActionResponse> {
        self.begin(key)?;
        if self.reject.lock().unwrap().contains(key) {
            Ok(ActionResponse {
                success: false,
                message: None,
                error: Some(format!("{} rejected", key)),
            })
        } else {
            Ok(ActionResponse::success())
        }
    }
}

#[async_trait::async_trait]
impl ProvApi for MockApi {
    async fn instances(&self) -> ApiResult<Vec<Instance>> {
        self.begin("instances")?;
        Ok(self.instances.clone())
    }

    async fn stats(&self) -> ApiResult<Stats> {
        self.begin("stats")?;
        Ok(self.stats.clone())
    }

    async fn config(&self) -> ApiResult<BackendConfig> {
        self.begin("config")?;
        Ok(self.config.clone())
    }

    async fn instance(&self, id: &str) -> ApiResult<Instance> {
        self.begin(&format!("instance:{}", id))?;
        self.details
            .get(id)
            .or_else(|| self.instances.iter().find(|i| i.instance_id == id))
            .cloned()
            .ok_or_else(|| ApiError::Transport(format!("instance not found: {}", id)))
    }

    async fn create_instance(&self, req: &NewInstance) -> ApiResult<ActionResponse> {
        self.action(&format!("create:{}", req.instance_id))
    }

    async fn retry_instance(&self, id: &str) -> ApiResult<ActionResponse> {
        self.action(&format!("retry:{}", id))
    }

    async fn retry_playbook(&self, id: &str, playbook: &str) -> ApiResult<ActionResponse> {
        self.action(&format!("retry_playbook:{}/{}", id, playbook))
    }

    async fn delete_instance(&self, id: &str) -> ApiResult<ActionResponse> {
        self.action(&format!("delete:{}", id))
    }

    async fn fetch_log(&self, id: &str, playbook: &str, suffix: &str) -> ApiResult<Option<String>> {
        let path = format!("{}/{}{}", id, playbook, suffix);
        self.begin(&format!("log:{}", path))?;
        Ok(self.logs.get(&path).cloned())
    }

    async fn health(&self) -> ApiResult<serde_json::Value> {
        self.begin("health")?;
        Ok(serde_json::json!({"status": "ok"}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_response_defaults_to_success() {
        let r: ActionResponse = serde_json::from_str(r#"{"message": "done"}"#).unwrap();
        assert!(r.success);
        assert!(r.ok_or("nope").is_ok());
    }

    #[test]
    fn explicit_failure_prefers_backend_error_text() {
        let r: ActionResponse =
            serde_json::from_str(r#"{"success": false, "error": "invalid state"}"#).unwrap();
        match r.ok_or("Restart failed") {
            Err(ApiError::Application(msg)) => assert_eq!(msg, "invalid state"),
            other => panic!("expected application error, got {:?}", other),
        }
    }

    #[test]
    fn explicit_failure_falls_back_to_caller_message() {
        let r: ActionResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        match r.ok_or("Restart failed") {
            Err(ApiError::Application(msg)) => assert_eq!(msg, "Restart failed"),
            other => panic!("expected application error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mock_records_calls_in_order() {
        let api = MockApi::new();
        api.fail_on("retry:b");
        let _ = api.retry_instance("a").await;
        let _ = api.retry_instance("b").await;
        let _ = api.retry_instance("c").await;
        assert_eq!(api.calls(), vec!["retry:a", "retry:b", "retry:c"]);
    }
}
