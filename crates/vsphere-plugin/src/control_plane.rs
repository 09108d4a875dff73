//! The control-plane capability seam.
//!
//! Everything above this module talks to a [`ControlPlane`]; the REST
//! binding below is the production implementation, and tests substitute an
//! in-memory inventory or a mock.

use crate::error::PluginResult;
use crate::inventory::InventoryManager;
use crate::types::*;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;

use async_trait::async_trait;

/// Operations the plugin needs from a virtualization control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // ── Session ─────────────────────────────────────────────────────

    /// (Re-)establish the session.
    async fn login(&self) -> PluginResult<()>;

    /// Whether the current session is still accepted.
    async fn is_alive(&self) -> PluginResult<bool>;

    async fn logout(&self) -> PluginResult<()>;

    // ── Inventory ───────────────────────────────────────────────────

    async fn list_datacenters(&self) -> PluginResult<Vec<DatacenterSummary>>;

    async fn get_datacenter(&self, datacenter: &str) -> PluginResult<DatacenterInfo>;

    async fn list_datastores(&self, filter: &InventoryFilter) -> PluginResult<Vec<DatastoreSummary>>;

    async fn list_hosts(&self, filter: &InventoryFilter) -> PluginResult<Vec<HostSummary>>;

    async fn list_resource_pools(
        &self,
        filter: &InventoryFilter,
    ) -> PluginResult<Vec<ResourcePoolSummary>>;

    async fn list_networks(&self, filter: &InventoryFilter) -> PluginResult<Vec<NetworkSummary>>;

    async fn list_folders(&self, filter: &InventoryFilter) -> PluginResult<Vec<FolderSummary>>;

    /// Create a VM folder; `Unsupported` when the variant has no folders.
    async fn create_folder(&self, parent: &str, name: &str) -> PluginResult<String>;

    async fn list_vms(&self, filter: &InventoryFilter) -> PluginResult<Vec<VmSummary>>;

    async fn get_vm(&self, vm_id: &str) -> PluginResult<VmInfo>;

    // ── Tasks ───────────────────────────────────────────────────────

    async fn create_vm(&self, spec: &VmCreateSpec) -> PluginResult<TaskHandle>;

    async fn delete_vm(&self, vm_id: &str) -> PluginResult<TaskHandle>;

    async fn power(&self, vm_id: &str, action: PowerAction) -> PluginResult<TaskHandle>;

    async fn task_info(&self, task_id: &str) -> PluginResult<TaskInfo>;

    // ── Devices ─────────────────────────────────────────────────────

    async fn add_nic(&self, vm_id: &str, spec: &NicCreateSpec) -> PluginResult<String>;

    async fn add_disk(&self, vm_id: &str, spec: &DiskCreateSpec) -> PluginResult<String>;

    async fn add_cdrom(&self, vm_id: &str, spec: &CdromCreateSpec) -> PluginResult<String>;
}

/// Turns connection settings into a logged-in control plane.
#[async_trait]
pub trait Connector: Send + Sync {
    type Plane: ControlPlane + 'static;

    async fn connect(&self, config: &VsphereConfig) -> PluginResult<Self::Plane>;
}

/// Connects through the vSphere REST API.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestConnector;

#[async_trait]
impl Connector for RestConnector {
    type Plane = VsphereClient;

    async fn connect(&self, config: &VsphereConfig) -> PluginResult<VsphereClient> {
        let client = VsphereClient::new(config)?;
        client.login().await?;
        Ok(client)
    }
}

#[async_trait]
impl ControlPlane for VsphereClient {
    async fn login(&self) -> PluginResult<()> {
        VsphereClient::login(self).await.map(|_| ())
    }

    async fn is_alive(&self) -> PluginResult<bool> {
        self.check_session().await
    }

    async fn logout(&self) -> PluginResult<()> {
        VsphereClient::logout(self).await
    }

    async fn list_datacenters(&self) -> PluginResult<Vec<DatacenterSummary>> {
        InventoryManager::new(self).list_datacenters().await
    }

    async fn get_datacenter(&self, datacenter: &str) -> PluginResult<DatacenterInfo> {
        InventoryManager::new(self).get_datacenter(datacenter).await
    }

    async fn list_datastores(&self, filter: &InventoryFilter) -> PluginResult<Vec<DatastoreSummary>> {
        InventoryManager::new(self).list_datastores(filter).await
    }

    async fn list_hosts(&self, filter: &InventoryFilter) -> PluginResult<Vec<HostSummary>> {
        InventoryManager::new(self).list_hosts(filter).await
    }

    async fn list_resource_pools(
        &self,
        filter: &InventoryFilter,
    ) -> PluginResult<Vec<ResourcePoolSummary>> {
        InventoryManager::new(self).list_resource_pools(filter).await
    }

    async fn list_networks(&self, filter: &InventoryFilter) -> PluginResult<Vec<NetworkSummary>> {
        InventoryManager::new(self).list_networks(filter).await
    }

    async fn list_folders(&self, filter: &InventoryFilter) -> PluginResult<Vec<FolderSummary>> {
        InventoryManager::new(self).list_folders(filter).await
    }

    async fn create_folder(&self, parent: &str, name: &str) -> PluginResult<String> {
        InventoryManager::new(self).create_folder(parent, name).await
    }

    async fn list_vms(&self, filter: &InventoryFilter) -> PluginResult<Vec<VmSummary>> {
        InventoryManager::new(self).list_vms(filter).await
    }

    async fn get_vm(&self, vm_id: &str) -> PluginResult<VmInfo> {
        InventoryManager::new(self).get_vm(vm_id).await
    }

    async fn create_vm(&self, spec: &VmCreateSpec) -> PluginResult<TaskHandle> {
        VmManager::new(self).create_vm(spec).await
    }

    async fn delete_vm(&self, vm_id: &str) -> PluginResult<TaskHandle> {
        VmManager::new(self).delete_vm(vm_id).await
    }

    async fn power(&self, vm_id: &str, action: PowerAction) -> PluginResult<TaskHandle> {
        VmManager::new(self).power(vm_id, action).await
    }

    async fn task_info(&self, task_id: &str) -> PluginResult<TaskInfo> {
        VmManager::new(self).task_info(task_id).await
    }

    async fn add_nic(&self, vm_id: &str, spec: &NicCreateSpec) -> PluginResult<String> {
        VmManager::new(self).add_nic(vm_id, spec).await
    }

    async fn add_disk(&self, vm_id: &str, spec: &DiskCreateSpec) -> PluginResult<String> {
        VmManager::new(self).add_disk(vm_id, spec).await
    }

    async fn add_cdrom(&self, vm_id: &str, spec: &CdromCreateSpec) -> PluginResult<String> {
        VmManager::new(self).add_cdrom(vm_id, spec).await
    }
}
