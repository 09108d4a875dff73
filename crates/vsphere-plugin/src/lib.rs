//! # vSphere instance plugin
//!
//! VM lifecycle management against a vCenter / ESXi control plane through
//! the vSphere REST API: validate, provision, label, destroy and describe
//! instances on behalf of an orchestrator.
//!
//! ## Modules
//!
//! - **types** — Wire and lifecycle data structures
//! - **error** — Crate error type and kinds
//! - **vsphere** — REST HTTP client with session-based auth
//! - **inventory** — Datacenter, datastore, host, pool, network, folder, VM lookups
//! - **vm** — VM creation, power, removal, device attachment, task status
//! - **control_plane** — `ControlPlane` / `Connector` traits and the REST binding
//! - **connection** — Session holder (connect, liveness, reconnect)
//! - **task** — Waiting on remote tasks with a deadline
//! - **resolver** — Per-call resource resolution
//! - **spec** — Instance property decoding and validation
//! - **devices** — Ordered virtual-device composition
//! - **provisioner** — Create / destroy tasks and power handling
//! - **group** — Group folders and two-tier instance discovery
//! - **config** — Startup defaults
//! - **plugin** — The lifecycle facade

pub mod types;
pub mod error;
pub mod vsphere;
pub mod inventory;
pub mod vm;
pub mod control_plane;
pub mod connection;
pub mod task;
pub mod resolver;
pub mod spec;
pub mod devices;
pub mod provisioner;
pub mod group;
pub mod config;
pub mod plugin;

pub use config::PluginConfig;
pub use control_plane::{ControlPlane, Connector, RestConnector};
pub use error::{PluginError, PluginErrorKind, PluginResult};
pub use plugin::{InstancePlugin, PluginState};
pub use provisioner::VmIdentity;
pub use types::{DestroyContext, InstanceDescription, ProvisionRequest, VendorInfo};
