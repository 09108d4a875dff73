//! The lifecycle contract exposed to the orchestrator.
//!
//! The facade moves through *uninitialized → connected → ready*: the first
//! call that needs the control plane opens the session, the first successful
//! datacenter resolution makes it ready. Resources themselves are resolved
//! again on every call.

use crate::config::PluginConfig;
use crate::connection::ConnectionManager;
use crate::control_plane::{ControlPlane, Connector};
use crate::error::{PluginError, PluginErrorKind, PluginResult};
use crate::group::{annotation_group, annotation_text, group_tag, GroupNamespace, SearchTier, GROUP_TAG, GROUP_TAG_ALIAS};
use crate::provisioner::{VmIdentity, VmProvisioner};
use crate::resolver::{InventoryScope, ResourceResolver};
use crate::spec::{self, decode_properties, keys, InstanceSpecParser};
use crate::types::*;

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const VENDOR_NAME: &str = "infrakit-instance-vSphere";
pub const VENDOR_VERSION: &str = "0.5.0";
pub const VENDOR_URL: &str = "https://github.com/docker/infrakit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninitialized,
    Connected,
    Ready,
}

enum Session<P> {
    Uninitialized,
    Connected(Arc<ConnectionManager<P>>),
    Ready(Arc<ConnectionManager<P>>),
}

impl<P> Session<P> {
    fn manager(&self) -> Option<&Arc<ConnectionManager<P>>> {
        match self {
            Self::Uninitialized => None,
            Self::Connected(m) | Self::Ready(m) => Some(m),
        }
    }
}

pub struct InstancePlugin<C: Connector> {
    connector: C,
    config: PluginConfig,
    session: RwLock<Session<C::Plane>>,
}

impl<C: Connector> InstancePlugin<C> {
    pub fn new(connector: C, config: PluginConfig) -> Self {
        Self {
            connector,
            config,
            session: RwLock::new(Session::Uninitialized),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub async fn state(&self) -> PluginState {
        match *self.session.read().await {
            Session::Uninitialized => PluginState::Uninitialized,
            Session::Connected(_) => PluginState::Connected,
            Session::Ready(_) => PluginState::Ready,
        }
    }

    pub fn vendor_info(&self) -> VendorInfo {
        VendorInfo {
            name: VENDOR_NAME.to_string(),
            version: VENDOR_VERSION.to_string(),
            url: VENDOR_URL.to_string(),
        }
    }

    /// Every recognised property with the value this instance would use.
    pub fn example_properties(&self) -> Value {
        let c = &self.config;
        let text = |v: &Option<String>| json!(v.clone().unwrap_or_default());
        let mut props = Map::new();
        props.insert(keys::SCHEMA_VERSION.into(), json!(spec::SCHEMA_VERSION));
        props.insert(keys::URL.into(), text(&c.url));
        props.insert(keys::DATASTORE.into(), text(&c.datastore));
        props.insert(keys::HOSTNAME.into(), text(&c.hostname));
        props.insert(keys::NETWORK.into(), text(&c.network));
        props.insert(keys::ANNOTATION.into(), json!(""));
        props.insert(
            keys::VM_PREFIX.into(),
            json!(c.vm_prefix.as_deref().unwrap_or(spec::DEFAULT_PREFIX)),
        );
        props.insert(keys::ISO_PATH.into(), text(&c.iso_path));
        props.insert(keys::CPUS.into(), json!(c.cpus.unwrap_or(spec::DEFAULT_CPUS)));
        props.insert(
            keys::MEMORY.into(),
            json!(c.memory_mb.unwrap_or(spec::DEFAULT_MEMORY_MB)),
        );
        props.insert(
            keys::PERSISTENT_SIZE.into(),
            json!(c.persistent_size_mb.unwrap_or(0)),
        );
        props.insert(keys::POWER_ON.into(), json!(c.power_on));
        Value::Object(props)
    }

    /// Only checks that the blob decodes to a property map.
    pub async fn validate(&self, blob: &Value) -> PluginResult<()> {
        decode_properties(Some(blob)).map(|props| {
            debug!(keys = props.len(), "properties validated");
        })
    }

    pub async fn provision(&self, request: ProvisionRequest) -> PluginResult<VmIdentity> {
        let props = decode_properties(request.properties.as_ref())?;
        let spec = InstanceSpecParser::new(&self.config).parse(&props)?;
        let group = group_tag(&request.tags);
        if let Some(ref logical_id) = request.logical_id {
            debug!(logical_id = %logical_id, "logical id requested; instances are identified by VM name");
        }

        let manager = self.session(&spec.url).await?;
        let plane = manager.plane();
        let resources = ResourceResolver::new(plane.as_ref())
            .resolve(&spec.datastore, &spec.hostname, spec.network.as_deref())
            .await?;
        self.mark_ready(&manager).await;

        VmProvisioner::new(plane.as_ref(), self.config.task_policy())
            .provision(&spec, &resources, group)
            .await
    }

    /// No tag store exists, so labels are accepted and dropped.
    pub async fn label(&self, id: &str, labels: &BTreeMap<String, String>) -> PluginResult<()> {
        debug!(instance = %id, labels = labels.len(), "label is a no-op");
        Ok(())
    }

    pub async fn destroy(&self, id: &str, context: DestroyContext) -> PluginResult<()> {
        info!(instance = %id, ?context, "destroying instance");
        let manager = self.default_session().await?;
        let plane = manager.plane();
        let scope = self.scope(&manager).await?;
        VmProvisioner::new(plane.as_ref(), self.config.task_policy())
            .destroy(&scope, id)
            .await
    }

    /// Instances whose derived tags match every requested group tag.
    pub async fn describe_instances(
        &self,
        tags: &BTreeMap<String, String>,
        include_properties: bool,
    ) -> PluginResult<Vec<InstanceDescription>> {
        for key in tags.keys() {
            if key != GROUP_TAG && key != GROUP_TAG_ALIAS {
                debug!(tag = %key, "tag cannot be matched without a tag store, ignored");
            }
        }
        let group = group_tag(tags);

        let manager = self.default_session().await?;
        let plane = manager.plane();
        let scope = self.scope(&manager).await?;
        let found = GroupNamespace::new(plane.as_ref())
            .find_instances(&scope, group)
            .await?;
        debug!(group = group.unwrap_or_default(), tier = ?found.tier, count = found.vms.len(), "instances listed");

        let details =
            futures::future::join_all(found.vms.iter().map(|vm| plane.get_vm(&vm.vm))).await;

        let mut out = Vec::with_capacity(details.len());
        for (summary, info) in found.vms.iter().zip(details) {
            let info = match info {
                Ok(info) => info,
                // deleted between the listing and the detail read
                Err(e) if e.is(PluginErrorKind::ResourceNotFound) => {
                    debug!(vm = %summary.vm, name = %summary.name, "VM vanished while describing, skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let annotation = info.annotation.as_deref().unwrap_or_default();
            let vm_group = match (found.tier, annotation_group(annotation)) {
                (_, Some(g)) => Some(g),
                (SearchTier::Group, None) => group,
                (SearchTier::Inventory, None) => None,
            };
            if group.is_some() && vm_group != group {
                continue;
            }

            let mut derived = BTreeMap::new();
            if let Some(g) = vm_group {
                derived.insert(GROUP_TAG.to_string(), g.to_string());
            }
            out.push(InstanceDescription {
                id: summary.name.clone(),
                logical_id: Some(summary.name.clone()),
                tags: derived,
                properties: include_properties.then(|| describe_properties(summary, &info, annotation)),
            });
        }
        Ok(out)
    }

    /// Log out of the control plane, if connected.
    pub async fn close(&self) -> PluginResult<()> {
        let mut session = self.session.write().await;
        if let Some(manager) = session.manager() {
            manager.disconnect().await?;
        }
        *session = Session::Uninitialized;
        Ok(())
    }

    /// The session for `url`, opening it on first use.
    async fn session(&self, url: &str) -> PluginResult<Arc<ConnectionManager<C::Plane>>> {
        let existing = self.session.read().await.manager().cloned();
        if let Some(manager) = existing {
            return self.reuse(manager, url).await;
        }

        let mut session = self.session.write().await;
        if let Some(manager) = session.manager().cloned() {
            drop(session);
            return self.reuse(manager, url).await;
        }
        let manager = Arc::new(
            ConnectionManager::connect(
                &self.connector,
                url,
                self.config.insecure,
                self.config.timeout_secs,
            )
            .await?,
        );
        *session = Session::Connected(manager.clone());
        Ok(manager)
    }

    async fn reuse(
        &self,
        manager: Arc<ConnectionManager<C::Plane>>,
        url: &str,
    ) -> PluginResult<Arc<ConnectionManager<C::Plane>>> {
        if !manager.serves(url) {
            return Err(PluginError::config(format!(
                "Property '{}' names a different control plane than the active session ({})",
                keys::URL,
                manager.config().endpoint()
            )));
        }
        manager.ensure_alive(self.config.reconnect).await?;
        Ok(manager)
    }

    /// The active session, or one opened on the startup URL.
    async fn default_session(&self) -> PluginResult<Arc<ConnectionManager<C::Plane>>> {
        let existing = self.session.read().await.manager().cloned();
        match (existing, self.config.default_url()) {
            (Some(manager), _) => {
                manager.ensure_alive(self.config.reconnect).await?;
                Ok(manager)
            }
            (None, Some(url)) => self.session(url).await,
            (None, None) => Err(PluginError::config(format!(
                "Environment variable VCURL or property '{}' must be set",
                keys::URL
            ))),
        }
    }

    async fn scope(&self, manager: &Arc<ConnectionManager<C::Plane>>) -> PluginResult<InventoryScope> {
        let scope = ResourceResolver::new(manager.plane().as_ref())
            .resolve_scope()
            .await?;
        self.mark_ready(manager).await;
        Ok(scope)
    }

    async fn mark_ready(&self, manager: &Arc<ConnectionManager<C::Plane>>) {
        let mut session = self.session.write().await;
        let promote = matches!(&*session, Session::Connected(current) if Arc::ptr_eq(current, manager));
        if promote {
            *session = Session::Ready(manager.clone());
        }
    }
}

fn describe_properties(summary: &VmSummary, info: &VmInfo, annotation: &str) -> Value {
    let mut props = Map::new();
    props.insert("vm".into(), json!(summary.vm));
    props.insert("powerState".into(), json!(info.power_state));
    if let Some(ref cpu) = info.cpu {
        props.insert("cpus".into(), json!(cpu.count));
    }
    if let Some(ref memory) = info.memory {
        props.insert("memoryMB".into(), json!(memory.size_mib));
    }
    props.insert("annotation".into(), json!(annotation_text(annotation)));
    Value::Object(props)
}
