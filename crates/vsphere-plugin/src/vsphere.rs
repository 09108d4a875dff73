//! vSphere REST API HTTP client with session-based authentication.
//!
//! Communicates with vCenter / ESXi via `{scheme}://{host}:{port}/api/...`.
//! Manages session lifecycle (create / probe / delete) and provides typed
//! helpers. The session id sits behind a lock so one client can be shared
//! by concurrent lifecycle calls.

use crate::error::{PluginError, PluginResult};
use crate::types::{InventoryFilter, TaskHandle, VsphereConfig};

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// vSphere REST API client.
pub struct VsphereClient {
    client: Client,
    base_url: String,
    session_id: RwLock<Option<String>>,
    config: VsphereConfig,
}

impl VsphereClient {
    /// Build a new client from config (does NOT create a session yet).
    pub fn new(config: &VsphereConfig) -> PluginResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PluginError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            session_id: RwLock::new(None),
            config: config.clone(),
        })
    }

    /// Base URL for API calls.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current config.
    pub fn config(&self) -> &VsphereConfig {
        &self.config
    }

    // ── Session management ──────────────────────────────────────────

    /// Create a new API session (POST /api/session).
    pub async fn login(&self) -> PluginResult<String> {
        let url = format!("{}/api/session", self.base_url);

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| PluginError::connection(format!("Error logging into vCenter: {e}")))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(PluginError::connection(
                "Error logging into vCenter, check address and credentials",
            ));
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PluginError::connection(format!(
                "Login failed ({}): {body}",
                status.as_u16()
            )));
        }

        // Session ID comes back as a quoted JSON string
        let session_id: String = resp.json().await.map_err(|e| {
            PluginError::connection(format!("Failed to parse session response: {e}"))
        })?;

        *self.session_id.write().await = Some(session_id.clone());
        debug!(host = %self.config.host, "vSphere session established");
        Ok(session_id)
    }

    /// Delete the current session (DELETE /api/session).
    pub async fn logout(&self) -> PluginResult<()> {
        let sid = self.session_id.write().await.take();
        if let Some(sid) = sid {
            let url = format!("{}/api/session", self.base_url);
            match self.client.delete(&url).header(SESSION_HEADER, sid).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    debug!(status = %resp.status(), "session logout rejected");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "session logout failed"),
            }
        }
        Ok(())
    }

    /// Check if the session is still valid (GET /api/session).
    pub async fn check_session(&self) -> PluginResult<bool> {
        let Some(sid) = self.session_id.read().await.clone() else {
            return Ok(false);
        };
        let url = format!("{}/api/session", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;

        Ok(resp.status().is_success())
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    async fn require_session(&self) -> PluginResult<String> {
        self.session_id
            .read()
            .await
            .clone()
            .ok_or_else(|| PluginError::connection("Not logged in, no active session"))
    }

    /// GET a JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PluginResult<T> {
        self.get_filtered(path, &InventoryFilter::default()).await
    }

    /// GET a JSON response with the filter's query params.
    pub async fn get_filtered<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: &InventoryFilter,
    ) -> PluginResult<T> {
        let sid = self.require_session().await?;
        let url = format!("{}{}", self.base_url, path);
        let params = filter.to_params();
        let borrowed: Vec<(&str, &str)> =
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, sid)
            .query(&borrowed)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// POST with JSON body, return parsed response.
    pub async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> PluginResult<T> {
        let resp = self.post_raw(path, body).await?;
        Self::parse_response(resp).await
    }

    /// POST with JSON body, return raw `Response`.
    pub async fn post_raw<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> PluginResult<Response> {
        let sid = self.require_session().await?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header(SESSION_HEADER, sid)
            .json(body)
            .send()
            .await?;
        Self::check_status(resp).await
    }

    /// POST with JSON body to an endpoint invoked with `vmw-task=true`.
    ///
    /// The response is a task id; an empty body means the server finished
    /// the operation synchronously.
    pub async fn post_task<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> PluginResult<TaskHandle> {
        let resp = self.post_raw(path, body).await?;
        let id: Option<String> = Self::parse_response(resp).await?;
        Ok(match id {
            Some(task) if !task.is_empty() => TaskHandle::Pending(task),
            _ => TaskHandle::Completed(None),
        })
    }

    /// POST with no body, return nothing (discards response).
    pub async fn post_empty(&self, path: &str) -> PluginResult<()> {
        let sid = self.require_session().await?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    /// DELETE, ignoring response body.
    pub async fn delete(&self, path: &str) -> PluginResult<()> {
        let sid = self.require_session().await?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .delete(&url)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn check_status(resp: Response) -> PluginResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => Err(PluginError::connection(format!(
                "Session expired or invalid: {body}"
            ))),
            StatusCode::NOT_FOUND => Err(PluginError::not_found(format!(
                "Resource not found: {body}"
            ))),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => Err(
                PluginError::unsupported(format!("The operation is not supported on the object: {body}")),
            ),
            _ => Err(PluginError::api(code, format!("API error {code}: {body}"))),
        }
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response) -> PluginResult<T> {
        let text = resp.text().await.map_err(|e| {
            PluginError::parse(format!("Failed to read response body: {e}"))
        })?;

        if text.is_empty() {
            // Some vSphere endpoints return empty body for success
            return serde_json::from_str("null").map_err(|e| {
                PluginError::parse(format!("Cannot deserialise empty response: {e}"))
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            let end = text
                .char_indices()
                .nth(500)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            PluginError::parse(format!("JSON parse error: {e}; body: {}", &text[..end]))
        })
    }
}
