//! Holds the single control-plane session of a plugin instance.

use crate::control_plane::{ControlPlane, Connector};
use crate::error::{PluginError, PluginErrorKind, PluginResult};
use crate::types::VsphereConfig;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// One established session plus the settings it was opened with.
pub struct ConnectionManager<P> {
    plane: Arc<P>,
    config: VsphereConfig,
    connected_at: DateTime<Utc>,
}

impl<P: ControlPlane + 'static> ConnectionManager<P> {
    /// Parse `url` and log in through `connector`.
    ///
    /// Malformed URLs and failed logins both surface as `Connection` errors.
    pub async fn connect<C>(
        connector: &C,
        url: &str,
        insecure: bool,
        timeout_secs: u64,
    ) -> PluginResult<Self>
    where
        C: Connector<Plane = P>,
    {
        let config = VsphereConfig::from_url(url, insecure, timeout_secs)?;
        let plane = connector.connect(&config).await.map_err(|e| match e.kind {
            PluginErrorKind::Connection => e,
            _ => PluginError::connection(format!(
                "Error logging into vCenter, check address and credentials: {}",
                e.message
            )),
        })?;
        info!(endpoint = %config.endpoint(), user = %config.username, "connected to control plane");
        Ok(Self {
            plane: Arc::new(plane),
            config,
            connected_at: Utc::now(),
        })
    }

    pub fn plane(&self) -> &Arc<P> {
        &self.plane
    }

    pub fn config(&self) -> &VsphereConfig {
        &self.config
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whether this manager talks to the endpoint named by `url`.
    pub fn serves(&self, url: &str) -> bool {
        VsphereConfig::from_url(url, self.config.insecure, self.config.timeout_secs)
            .map(|c| c.endpoint() == self.config.endpoint())
            .unwrap_or(false)
    }

    /// Probe the session. Transport failures count as dead.
    pub async fn is_alive(&self) -> bool {
        match self.plane.is_alive().await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(error = %e, "session probe failed");
                false
            }
        }
    }

    /// Log in again on the same endpoint.
    pub async fn reconnect(&self) -> PluginResult<()> {
        warn!(endpoint = %self.config.endpoint(), "re-establishing control-plane session");
        self.plane.login().await.map_err(|e| match e.kind {
            PluginErrorKind::Connection => e,
            _ => PluginError::connection(format!("Reconnect failed: {}", e.message)),
        })
    }

    /// Make sure the session is usable, reconnecting once when allowed.
    pub async fn ensure_alive(&self, allow_reconnect: bool) -> PluginResult<()> {
        if self.is_alive().await {
            return Ok(());
        }
        if !allow_reconnect {
            return Err(PluginError::connection(format!(
                "Session to {} was lost (connected since {}); restart the plugin",
                self.config.endpoint(),
                self.connected_at.to_rfc3339()
            )));
        }
        self.reconnect().await
    }

    pub async fn disconnect(&self) -> PluginResult<()> {
        self.plane.logout().await
    }
}
