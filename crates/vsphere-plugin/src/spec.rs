//! Decoding and validation of instance properties.
//!
//! A property map is checked once, against schema version 1, and either
//! becomes a fully-defaulted [`InstanceSpec`] or a single
//! `Configuration` error listing every violation. Parsing never touches the
//! control plane.

use crate::config::PluginConfig;
use crate::error::{PluginError, PluginResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const SCHEMA_VERSION: u64 = 1;

/// Recognised property keys (case-sensitive).
pub mod keys {
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const URL: &str = "vCenterURL";
    pub const DATASTORE: &str = "Datastore";
    pub const HOSTNAME: &str = "Hostname";
    pub const NETWORK: &str = "Network";
    pub const ANNOTATION: &str = "Annotation";
    pub const VM_PREFIX: &str = "vmPrefix";
    pub const ISO_PATH: &str = "isoPath";
    pub const CPUS: &str = "CPUs";
    pub const MEMORY: &str = "Memory";
    pub const PERSISTENT_SIZE: &str = "persistentSz";
    pub const POWER_ON: &str = "powerOn";
}

pub const DEFAULT_PREFIX: &str = "vm";
pub const DEFAULT_CPUS: u32 = 1;
pub const DEFAULT_MEMORY_MB: u64 = 512;

/// Canonical provisioning intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Control-plane URL (from the properties or the startup default)
    #[serde(skip_serializing)]
    pub url: String,
    pub datastore: String,
    pub hostname: String,
    pub network: Option<String>,
    pub annotation: String,
    pub name_prefix: String,
    pub iso_path: Option<String>,
    pub cpus: u32,
    pub memory_mb: u64,
    /// Extra persistent disk; 0 means none
    pub persistent_mb: u64,
    pub power_on: bool,
}

/// Decode an opaque property blob into a generic map.
pub fn decode_properties(blob: Option<&Value>) -> PluginResult<Map<String, Value>> {
    match blob {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(PluginError::config(format!(
            "Instance properties must be an object, got {}",
            json_type(other)
        ))),
    }
}

pub struct InstanceSpecParser<'a> {
    defaults: &'a PluginConfig,
}

impl<'a> InstanceSpecParser<'a> {
    pub fn new(defaults: &'a PluginConfig) -> Self {
        Self { defaults }
    }

    pub fn parse(&self, props: &Map<String, Value>) -> PluginResult<InstanceSpec> {
        let mut violations = Vec::new();
        let d = self.defaults;

        if let Some(v) = props.get(keys::SCHEMA_VERSION).filter(|v| !v.is_null()) {
            if v.as_u64() != Some(SCHEMA_VERSION) {
                violations.push(format!(
                    "Property '{}' must be {SCHEMA_VERSION}, got {v}",
                    keys::SCHEMA_VERSION
                ));
            }
        }

        let url = string(props, keys::URL, &mut violations)
            .filter(|u| !u.is_empty())
            .or_else(|| d.default_url().map(str::to_string));
        if url.is_none() {
            violations.push(format!(
                "Environment variable VCURL or property '{}' must be set",
                keys::URL
            ));
        }

        let datastore = required(props, keys::DATASTORE, &mut violations);
        let hostname = required(props, keys::HOSTNAME, &mut violations);

        let network = string(props, keys::NETWORK, &mut violations)
            .or_else(|| d.network.clone())
            .filter(|n| !n.is_empty());
        let annotation = string(props, keys::ANNOTATION, &mut violations).unwrap_or_default();

        let name_prefix = string(props, keys::VM_PREFIX, &mut violations)
            .or_else(|| d.vm_prefix.clone())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        if name_prefix.is_empty() {
            violations.push(format!("Property '{}' must not be empty", keys::VM_PREFIX));
        }

        let iso_path = string(props, keys::ISO_PATH, &mut violations)
            .or_else(|| d.iso_path.clone())
            .filter(|p| !p.is_empty());

        let cpus = count(props, keys::CPUS, 1, &mut violations)
            .and_then(|c| match u32::try_from(c) {
                Ok(c) => Some(c),
                Err(_) => {
                    violations.push(format!("Property '{}' is out of range", keys::CPUS));
                    None
                }
            })
            .or(d.cpus)
            .unwrap_or(DEFAULT_CPUS);
        let memory_mb = count(props, keys::MEMORY, 1, &mut violations)
            .or(d.memory_mb)
            .unwrap_or(DEFAULT_MEMORY_MB);
        let persistent_mb = count(props, keys::PERSISTENT_SIZE, 0, &mut violations)
            .or(d.persistent_size_mb)
            .unwrap_or(0);
        let power_on = flag(props, keys::POWER_ON, &mut violations).unwrap_or(d.power_on);

        if !violations.is_empty() {
            return Err(PluginError::configuration(violations));
        }

        if network.is_none() {
            warn!("The property 'Network' hasn't been set, no networks will be attached to VM");
        }
        if iso_path.is_none() {
            debug!("The property 'isoPath' hasn't been set, no media will be attached to VM");
        }

        Ok(InstanceSpec {
            url: url.unwrap_or_default(),
            datastore: datastore.unwrap_or_default(),
            hostname: hostname.unwrap_or_default(),
            network,
            annotation,
            name_prefix,
            iso_path,
            cpus,
            memory_mb,
            persistent_mb,
            power_on,
        })
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string(props: &Map<String, Value>, key: &str, violations: &mut Vec<String>) -> Option<String> {
    match props.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            violations.push(format!(
                "Property '{key}' must be a string, got {}",
                json_type(other)
            ));
            None
        }
    }
}

fn required(props: &Map<String, Value>, key: &str, violations: &mut Vec<String>) -> Option<String> {
    let before = violations.len();
    match string(props, key, violations) {
        Some(s) if !s.is_empty() => Some(s),
        Some(_) => {
            violations.push(format!("Property '{key}' must not be empty"));
            None
        }
        None if violations.len() == before => {
            violations.push(format!("Property '{key}' must be set"));
            None
        }
        None => None,
    }
}

/// A whole number `>= min`. JSON numbers decoded elsewhere may arrive as
/// floats ("4.0"), which are accepted when integral.
fn count(
    props: &Map<String, Value>,
    key: &str,
    min: u64,
    violations: &mut Vec<String>,
) -> Option<u64> {
    let value = props.get(key)?;
    if value.is_null() {
        return None;
    }
    let n = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    });
    match n {
        Some(n) if n >= min => Some(n),
        Some(_) => {
            violations.push(format!("Property '{key}' must be at least {min}"));
            None
        }
        None => {
            violations.push(format!(
                "Property '{key}' must be a non-negative whole number, got {value}"
            ));
            None
        }
    }
}

fn flag(props: &Map<String, Value>, key: &str, violations: &mut Vec<String>) -> Option<bool> {
    match props.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(other) => {
            violations.push(format!(
                "Property '{key}' must be a boolean, got {}",
                json_type(other)
            ));
            None
        }
    }
}
