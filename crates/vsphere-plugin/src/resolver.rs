//! Resolves the inventory objects a new VM needs.
//!
//! Nothing is cached: every call walks the inventory again and returns an
//! immutable [`ResolvedResources`] owned by the caller, so concurrent
//! provisioning calls never share resolver state and out-of-band inventory
//! changes are picked up on the next call.

use crate::control_plane::ControlPlane;
use crate::error::{PluginError, PluginResult};
use crate::types::*;

use tracing::{debug, warn};

/// The single datacenter a plugin instance operates in, plus its base VM
/// folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryScope {
    pub datacenter: ManagedRef,
    pub vm_folder: ManagedRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNetwork {
    pub reference: ManagedRef,
    pub network_type: NetworkType,
}

/// Everything placement and device composition need, resolved for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResources {
    pub scope: InventoryScope,
    pub datastore: ManagedRef,
    pub host: ManagedRef,
    pub resource_pool: ManagedRef,
    pub network: Option<ResolvedNetwork>,
}

impl ResolvedResources {
    /// `[datastore] path` notation for files on the resolved datastore.
    pub fn datastore_path(&self, path: &str) -> String {
        if path.is_empty() {
            format!("[{}]", self.datastore.name)
        } else {
            format!("[{}] {}", self.datastore.name, path)
        }
    }
}

pub struct ResourceResolver<'a, P: ?Sized> {
    plane: &'a P,
}

impl<'a, P: ControlPlane + ?Sized> ResourceResolver<'a, P> {
    pub fn new(plane: &'a P) -> Self {
        Self { plane }
    }

    /// Locate the one datacenter and its VM folder.
    pub async fn resolve_scope(&self) -> PluginResult<InventoryScope> {
        let datacenters = self.plane.list_datacenters().await?;
        let dc = match datacenters.len() {
            0 => {
                return Err(PluginError::not_found(
                    "No Datacenter instance could be found inside of vCenter",
                ))
            }
            1 => datacenters.into_iter().next(),
            n => {
                return Err(PluginError::not_found(format!(
                    "Found {n} datacenters; exactly one is supported per plugin instance"
                )))
            }
        }
        .ok_or_else(|| PluginError::not_found("No Datacenter instance could be found"))?;

        let info = self.plane.get_datacenter(&dc.datacenter).await.map_err(|e| {
            PluginError::not_found(format!(
                "Error locating default datacenter folder: {}",
                e.message
            ))
        })?;

        Ok(InventoryScope {
            datacenter: ManagedRef::new(dc.datacenter, dc.name),
            vm_folder: ManagedRef::new(info.vm_folder, "vm"),
        })
    }

    /// Resolve datastore, host, the host's resource pool and, when a
    /// non-empty name is given, the network.
    pub async fn resolve(
        &self,
        datastore: &str,
        host: &str,
        network: Option<&str>,
    ) -> PluginResult<ResolvedResources> {
        let scope = self.resolve_scope().await?;
        let dc = scope.datacenter.id.clone();

        let ds = self.datastore_or_default(&dc, datastore).await?;
        let host = self.host_or_default(&dc, host).await?;
        let resource_pool = self.host_resource_pool(&host).await?;

        let network = match network.filter(|n| !n.is_empty()) {
            Some(name) => Some(self.network(&dc, name).await?),
            None => {
                warn!("No network name set, no networks will be attached to VM");
                None
            }
        };

        debug!(
            datacenter = %scope.datacenter.name,
            datastore = %ds.name,
            host = %host.name,
            pool = %resource_pool.id,
            "resources resolved"
        );

        Ok(ResolvedResources {
            scope,
            datastore: ds,
            host,
            resource_pool,
            network,
        })
    }

    async fn datastore_or_default(&self, dc: &str, name: &str) -> PluginResult<ManagedRef> {
        let mut filter = InventoryFilter::in_datacenter(dc);
        if !name.is_empty() {
            filter = filter.named(name);
        }
        let found = self.plane.list_datastores(&filter).await?;
        pick_one(
            found.into_iter().map(|d| ManagedRef::new(d.datastore, d.name)),
            "Datastore",
            name,
        )
    }

    async fn host_or_default(&self, dc: &str, name: &str) -> PluginResult<ManagedRef> {
        let mut filter = InventoryFilter::in_datacenter(dc);
        if !name.is_empty() {
            filter = filter.named(name);
        }
        let found = self.plane.list_hosts(&filter).await?;
        pick_one(
            found.into_iter().map(|h| ManagedRef::new(h.host, h.name)),
            "vSphere host",
            name,
        )
    }

    async fn host_resource_pool(&self, host: &ManagedRef) -> PluginResult<ManagedRef> {
        let filter = InventoryFilter::default().on_host(&host.id);
        let pools = self.plane.list_resource_pools(&filter).await?;
        pools
            .into_iter()
            .next()
            .map(|p| ManagedRef::new(p.resource_pool, p.name))
            .ok_or_else(|| {
                PluginError::not_found(format!(
                    "Error locating resource pool of host [{}]",
                    host.name
                ))
            })
    }

    async fn network(&self, dc: &str, name: &str) -> PluginResult<ResolvedNetwork> {
        let filter = InventoryFilter::in_datacenter(dc).named(name);
        self.plane
            .list_networks(&filter)
            .await?
            .into_iter()
            .find(|n| n.name == name)
            .map(|n| ResolvedNetwork {
                reference: ManagedRef::new(n.network, n.name),
                network_type: n.network_type,
            })
            .ok_or_else(|| PluginError::not_found(format!("Network [{name}], could not be found")))
    }
}

/// A named lookup must match by name; an unnamed one is only satisfied by
/// a single candidate.
fn pick_one<I>(candidates: I, what: &str, name: &str) -> PluginResult<ManagedRef>
where
    I: IntoIterator<Item = ManagedRef>,
{
    let mut candidates: Vec<ManagedRef> = candidates.into_iter().collect();
    if !name.is_empty() {
        return candidates
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PluginError::not_found(format!("{what} [{name}], could not be found")));
    }
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(PluginError::not_found(format!("No default {what} could be found"))),
        n => Err(PluginError::not_found(format!(
            "{n} candidates for default {what}; a name must be given"
        ))),
    }
}
