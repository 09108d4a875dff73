//! Error types for the vSphere instance plugin.

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginErrorKind {
    /// Missing or invalid instance property; raised before any remote call
    Configuration,
    /// Session could not be established, or the session is no longer valid
    Connection,
    /// Datacenter / datastore / host / network / pool / VM absent
    ResourceNotFound,
    /// Remote create / destroy / power task reported failure
    TaskFailure,
    /// Post-creation device attachment failed
    DeviceAttachFailure,
    /// The control-plane variant does not support the operation
    Unsupported,
    /// Operation exceeded its deadline
    Timeout,
    /// HTTP / API error with status code
    Api(u16),
    /// JSON parse / deserialization error
    Parse,
    /// Generic
    Other,
}

/// Crate error type carrying a kind, a human-readable message and any
/// itemised details (e.g. every violated property of a request).
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{kind:?}] {message}")]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub message: String,
    pub details: Vec<String>,
}

impl PluginError {
    pub fn new(kind: PluginErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            details: Vec::new(),
        }
    }

    /// A configuration error listing every violation found.
    pub fn configuration(violations: Vec<String>) -> Self {
        Self {
            kind: PluginErrorKind::Configuration,
            message: format!("Invalid instance properties: {}", violations.join("; ")),
            details: violations,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self::configuration(vec![msg])
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Connection, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::ResourceNotFound, msg)
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::TaskFailure, msg)
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::DeviceAttachFailure, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Unsupported, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Timeout, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Api(status), msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Parse, msg)
    }

    pub fn is(&self, kind: PluginErrorKind) -> bool {
        self.kind == kind
    }

    /// Re-labels a failed task submission as a `TaskFailure` for `operation`.
    ///
    /// Connection, timeout and not-found errors keep their kind so callers
    /// can still tell a dead session from a rejected task.
    pub fn in_task(self, operation: &str) -> Self {
        match self.kind {
            PluginErrorKind::Connection
            | PluginErrorKind::Timeout
            | PluginErrorKind::ResourceNotFound
            | PluginErrorKind::TaskFailure => Self {
                message: format!("{operation}: {}", self.message),
                ..self
            },
            _ => Self::task(format!(
                "{operation} failed, more detail can be found in vCenter tasks: {}",
                self.message
            )),
        }
    }

    /// Wraps any failure raised while attaching `device` as a
    /// `DeviceAttachFailure`.
    pub fn in_device(self, device: &str, vm: &str) -> Self {
        match self.kind {
            PluginErrorKind::Connection | PluginErrorKind::Timeout => self,
            _ => Self::device(format!(
                "Unable to add {device} to VM [{vm}]: {}",
                self.message
            )),
        }
    }
}

impl From<PluginError> for String {
    fn from(e: PluginError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for PluginError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(PluginErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

/// Convenience alias.
pub type PluginResult<T> = Result<T, PluginError>;
