//! HTTP resource client for the provisioner backend.
//!
//! One outbound request per call. Non-success responses are normalized into
//! a single operator-readable message: a structured `error`/`details` field
//! when the body is JSON, the raw text body otherwise, `HTTP <status>` as
//! the last resort. Success payloads are decoded according to the declared
//! content type.

#![forbid(unsafe_code)]

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use provdash_api::{ActionResponse, ApiError, ApiResult, ProvApi};
use provdash_core::{BackendConfig, Instance, NewInstance, Stats};

/// `ProvApi` implementation speaking JSON over HTTP.
pub struct HttpApi {
    base: String,
    client: reqwest::Client,
}

enum Payload {
    Json(Value),
    Text(String),
}

impl HttpApi {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<Payload> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "http: request");
        let mut req = self.client.request(method, url.as_str());
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        let is_json = declares_json(&resp);
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Transport(error_message(
                status.as_u16(),
                is_json,
                &body,
            )));
        }
        if is_json {
            let v = resp
                .json::<Value>()
                .await
                .map_err(|e| ApiError::Transport(format!("invalid response body: {}", e)))?;
            Ok(Payload::Json(v))
        } else {
            let t = resp
                .text()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            Ok(Payload::Text(t))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.decode(self.request(Method::GET, path, None).await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        self.decode(self.request(Method::POST, path, body).await?)
    }

    fn decode<T: DeserializeOwned>(&self, payload: Payload) -> ApiResult<T> {
        match payload {
            Payload::Json(v) => serde_json::from_value(v)
                .map_err(|e| ApiError::Transport(format!("invalid response body: {}", e))),
            Payload::Text(_) => Err(ApiError::Transport("expected a JSON response".into())),
        }
    }
}

fn declares_json(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false)
}

/// Normalize a non-success response into one message.
fn error_message(status: u16, is_json: bool, body: &str) -> String {
    if is_json {
        if let Ok(v) = serde_json::from_str::<Value>(body) {
            if let Some(msg) = v
                .get("error")
                .or_else(|| v.get("details"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
        }
        format!("HTTP {}", status)
    } else if !body.is_empty() {
        body.to_string()
    } else {
        format!("HTTP {}", status)
    }
}

/// The detail endpoint may wrap the instance in `{"instance": …}` or return
/// it bare.
fn unwrap_detail(v: Value) -> Value {
    match v {
        Value::Object(mut m) => match m.remove("instance") {
            Some(inner) => inner,
            None => Value::Object(m),
        },
        other => other,
    }
}

#[async_trait::async_trait]
impl ProvApi for HttpApi {
    async fn instances(&self) -> ApiResult<Vec<Instance>> {
        self.get_json("/api/instances").await
    }

    async fn stats(&self) -> ApiResult<Stats> {
        self.get_json("/api/stats").await
    }

    async fn config(&self) -> ApiResult<BackendConfig> {
        self.get_json("/api/config").await
    }

    async fn instance(&self, id: &str) -> ApiResult<Instance> {
        let v: Value = self.get_json(&format!("/api/instance/{}", id)).await?;
        serde_json::from_value(unwrap_detail(v))
            .map_err(|e| ApiError::Transport(format!("invalid response body: {}", e)))
    }

    async fn create_instance(&self, req: &NewInstance) -> ApiResult<ActionResponse> {
        let body = serde_json::to_value(req).map_err(|e| ApiError::Transport(e.to_string()))?;
        self.post_json("/api/instances", Some(&body)).await
    }

    async fn retry_instance(&self, id: &str) -> ApiResult<ActionResponse> {
        self.post_json(&format!("/api/instance/{}/retry", id), None)
            .await
    }

    async fn retry_playbook(&self, id: &str, playbook: &str) -> ApiResult<ActionResponse> {
        self.post_json(
            &format!("/api/instance/{}/playbook/{}/retry", id, playbook),
            None,
        )
        .await
    }

    async fn delete_instance(&self, id: &str) -> ApiResult<ActionResponse> {
        self.post_json(&format!("/api/instance/{}/delete", id), None)
            .await
    }

    async fn fetch_log(&self, id: &str, playbook: &str, suffix: &str) -> ApiResult<Option<String>> {
        let url = self.url(&format!("/api/instance/{}/logs/{}{}", id, playbook, suffix));
        debug!(url = %url, "http: log probe");
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let is_json = declares_json(&resp);
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Transport(error_message(
                status.as_u16(),
                is_json,
                &body,
            )));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Some(text))
    }

    async fn health(&self) -> ApiResult<Value> {
        self.get_json("/health").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_field_wins() {
        let msg = error_message(400, true, r#"{"error": "Invalid action or instance state"}"#);
        assert_eq!(msg, "Invalid action or instance state");
    }

    #[test]
    fn json_details_field_is_second_choice() {
        let msg = error_message(500, true, r#"{"details": "disk full"}"#);
        assert_eq!(msg, "disk full");
    }

    #[test]
    fn malformed_json_falls_back_to_status() {
        assert_eq!(error_message(502, true, "<html>bad gateway</html>"), "HTTP 502");
    }

    #[test]
    fn text_body_is_used_verbatim() {
        assert_eq!(error_message(500, false, "worker crashed"), "worker crashed");
    }

    #[test]
    fn empty_body_falls_back_to_status() {
        assert_eq!(error_message(503, false, ""), "HTTP 503");
    }

    #[test]
    fn detail_payload_unwraps_when_nested() {
        let nested: Value =
            serde_json::from_str(r#"{"instance": {"instance_id": "a"}}"#).unwrap();
        assert_eq!(unwrap_detail(nested)["instance_id"], "a");
        let bare: Value = serde_json::from_str(r#"{"instance_id": "b"}"#).unwrap();
        assert_eq!(unwrap_detail(bare)["instance_id"], "b");
    }
}
