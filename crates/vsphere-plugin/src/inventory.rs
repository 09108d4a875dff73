//! Inventory lookups via the vSphere REST API: datacenters, datastores,
//! VM folders, hosts, resource pools, networks and VMs.

use crate::error::{PluginError, PluginErrorKind, PluginResult};
use crate::types::*;
use crate::vsphere::VsphereClient;

/// Read-mostly inventory operations.
pub struct InventoryManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> InventoryManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── Datacenters ─────────────────────────────────────────────────

    pub async fn list_datacenters(&self) -> PluginResult<Vec<DatacenterSummary>> {
        self.client
            .get::<Vec<DatacenterSummary>>("/api/vcenter/datacenter")
            .await
    }

    /// Datacenter detail, including its base folders.
    pub async fn get_datacenter(&self, datacenter: &str) -> PluginResult<DatacenterInfo> {
        let path = format!("/api/vcenter/datacenter/{datacenter}");
        self.client.get::<DatacenterInfo>(&path).await
    }

    // ── Storage / compute / network ─────────────────────────────────

    pub async fn list_datastores(
        &self,
        filter: &InventoryFilter,
    ) -> PluginResult<Vec<DatastoreSummary>> {
        self.client
            .get_filtered::<Vec<DatastoreSummary>>("/api/vcenter/datastore", filter)
            .await
    }

    pub async fn list_hosts(&self, filter: &InventoryFilter) -> PluginResult<Vec<HostSummary>> {
        self.client
            .get_filtered::<Vec<HostSummary>>("/api/vcenter/host", filter)
            .await
    }

    pub async fn list_resource_pools(
        &self,
        filter: &InventoryFilter,
    ) -> PluginResult<Vec<ResourcePoolSummary>> {
        self.client
            .get_filtered::<Vec<ResourcePoolSummary>>("/api/vcenter/resource-pool", filter)
            .await
    }

    pub async fn list_networks(
        &self,
        filter: &InventoryFilter,
    ) -> PluginResult<Vec<NetworkSummary>> {
        self.client
            .get_filtered::<Vec<NetworkSummary>>("/api/vcenter/network", filter)
            .await
    }

    // ── Folders ─────────────────────────────────────────────────────

    pub async fn list_folders(&self, filter: &InventoryFilter) -> PluginResult<Vec<FolderSummary>> {
        self.client
            .get_filtered::<Vec<FolderSummary>>("/api/vcenter/folder", filter)
            .await
    }

    /// Create a VM folder under `parent`. Returns the new folder id.
    ///
    /// Standalone ESXi hosts have no folder service; any 404 / 405 / 501
    /// comes back as `Unsupported`.
    pub async fn create_folder(&self, parent: &str, name: &str) -> PluginResult<String> {
        #[derive(serde::Serialize)]
        struct FolderCreateSpec<'s> {
            name: &'s str,
            parent_folder: &'s str,
            #[serde(rename = "type")]
            folder_type: &'static str,
        }
        let spec = FolderCreateSpec {
            name,
            parent_folder: parent,
            folder_type: "VIRTUAL_MACHINE",
        };
        match self.client.post::<_, String>("/api/vcenter/folder", &spec).await {
            Ok(id) => Ok(id),
            Err(e) if e.is(PluginErrorKind::ResourceNotFound) => Err(PluginError::unsupported(
                format!("Folder creation is not available on this endpoint: {}", e.message),
            )),
            Err(e) => Err(e),
        }
    }

    // ── VMs ─────────────────────────────────────────────────────────

    pub async fn list_vms(&self, filter: &InventoryFilter) -> PluginResult<Vec<VmSummary>> {
        self.client
            .get_filtered::<Vec<VmSummary>>("/api/vcenter/vm", filter)
            .await
    }

    /// Get full details for a single VM.
    pub async fn get_vm(&self, vm_id: &str) -> PluginResult<VmInfo> {
        let path = format!("/api/vcenter/vm/{vm_id}");
        self.client.get::<VmInfo>(&path).await
    }
}
