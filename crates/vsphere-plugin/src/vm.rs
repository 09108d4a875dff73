//! VM lifecycle endpoints of the vSphere REST API: creation (as a task),
//! deletion, power, device attachment and task status.

use crate::error::PluginResult;
use crate::types::*;
use crate::vsphere::VsphereClient;

/// Mutating VM operations backed by `VsphereClient`.
pub struct VmManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── Create / Delete ─────────────────────────────────────────────

    /// Submit VM creation as a task. The task result is the VM identifier.
    pub async fn create_vm(&self, spec: &VmCreateSpec) -> PluginResult<TaskHandle> {
        self.client
            .post_task("/api/vcenter/vm?vmw-task=true", spec)
            .await
    }

    /// Delete (unregister and remove) a VM. Synchronous on REST.
    pub async fn delete_vm(&self, vm_id: &str) -> PluginResult<TaskHandle> {
        let path = format!("/api/vcenter/vm/{vm_id}");
        self.client.delete(&path).await?;
        Ok(TaskHandle::Completed(None))
    }

    // ── Power operations ────────────────────────────────────────────

    pub async fn power(&self, vm_id: &str, action: PowerAction) -> PluginResult<TaskHandle> {
        let path = format!("/api/vcenter/vm/{vm_id}/power?action={}", action.as_str());
        self.client.post_empty(&path).await?;
        Ok(TaskHandle::Completed(None))
    }

    // ── Devices ─────────────────────────────────────────────────────

    /// Add a NIC to a VM. Returns the NIC identifier.
    pub async fn add_nic(&self, vm_id: &str, spec: &NicCreateSpec) -> PluginResult<String> {
        let path = format!("/api/vcenter/vm/{vm_id}/hardware/ethernet");
        self.client.post(&path, spec).await
    }

    /// Add a disk to a VM. Returns the disk identifier.
    pub async fn add_disk(&self, vm_id: &str, spec: &DiskCreateSpec) -> PluginResult<String> {
        let path = format!("/api/vcenter/vm/{vm_id}/hardware/disk");
        self.client.post(&path, spec).await
    }

    /// Add a CD-ROM to a VM. Returns the CD-ROM identifier.
    pub async fn add_cdrom(&self, vm_id: &str, spec: &CdromCreateSpec) -> PluginResult<String> {
        let path = format!("/api/vcenter/vm/{vm_id}/hardware/cdrom");
        self.client.post(&path, spec).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    pub async fn task_info(&self, task_id: &str) -> PluginResult<TaskInfo> {
        let path = format!("/api/cis/tasks/{task_id}");
        self.client.get::<TaskInfo>(&path).await
    }
}
