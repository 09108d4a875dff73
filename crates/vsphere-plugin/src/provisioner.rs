//! VM creation and removal.

use crate::control_plane::ControlPlane;
use crate::devices::DeviceComposer;
use crate::error::{PluginError, PluginResult};
use crate::group::{annotate, GroupNamespace};
use crate::resolver::{InventoryScope, ResolvedResources};
use crate::spec::InstanceSpec;
use crate::task::{wait_for_task, TaskPolicy};
use crate::types::*;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const GUEST_OS: &str = "OTHER_LINUX_64";

/// A VM the plugin created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmIdentity {
    /// Generated name; also the orchestrator-facing instance id
    pub name: String,
    /// Control-plane managed-object id
    pub vm_id: String,
    pub group: Option<String>,
}

/// `prefix-<random 63-bit integer>`
pub fn generate_name(prefix: &str) -> String {
    format!("{prefix}-{}", rand::random::<u64>() >> 1)
}

pub struct VmProvisioner<'a, P: ?Sized> {
    plane: &'a P,
    policy: TaskPolicy,
}

impl<'a, P: ControlPlane + ?Sized> VmProvisioner<'a, P> {
    pub fn new(plane: &'a P, policy: TaskPolicy) -> Self {
        Self { plane, policy }
    }

    /// Build the creation descriptor for `name`, placed in `folder`.
    pub fn create_spec(
        spec: &InstanceSpec,
        resources: &ResolvedResources,
        folder: &ManagedRef,
        name: &str,
        group: Option<&str>,
    ) -> VmCreateSpec {
        VmCreateSpec {
            name: name.to_string(),
            guest_os: GUEST_OS.to_string(),
            placement: VmPlacementSpec {
                folder: Some(folder.id.clone()),
                resource_pool: Some(resources.resource_pool.id.clone()),
                host: Some(resources.host.id.clone()),
                datastore: Some(resources.datastore.id.clone()),
            },
            cpu: VmCpuSpec { count: spec.cpus },
            memory: VmMemorySpec {
                size_mib: spec.memory_mb,
            },
            scsi_adapters: vec![DeviceComposer::controller()],
            annotation: Some(annotate(group, &spec.annotation)),
        }
    }

    /// Create the VM, attach its devices, and power it on when asked.
    ///
    /// A VM whose device attachment fails is left in place; the error names
    /// it so the orchestrator can destroy it.
    pub async fn provision(
        &self,
        spec: &InstanceSpec,
        resources: &ResolvedResources,
        group: Option<&str>,
    ) -> PluginResult<VmIdentity> {
        let folder = GroupNamespace::new(self.plane)
            .locate(&resources.scope, group)
            .await?;
        let name = generate_name(&spec.name_prefix);
        let create = Self::create_spec(spec, resources, &folder.folder, &name, group);

        info!(vm = %name, folder = %folder.folder.name, group = group.unwrap_or_default(), "creating VM");
        let handle = self
            .plane
            .create_vm(&create)
            .await
            .map_err(|e| e.in_task("Creating new VM"))?;
        let vm_id = wait_for_task(self.plane, handle, "Creating new VM", &self.policy)
            .await?
            .ok_or_else(|| PluginError::task(format!("Creating new VM [{name}] returned no VM id")))?;

        let devices = DeviceComposer::compose(spec, resources, &name);
        DeviceComposer::attach(self.plane, &vm_id, &devices)
            .await
            .map_err(|e| {
                warn!(vm = %name, id = %vm_id, "VM left without all of its devices");
                e
            })?;

        if spec.power_on {
            info!(vm = %name, "powering on VM");
            self.run(&vm_id, PowerAction::Start, "Power On").await?;
        }

        info!(vm = %name, id = %vm_id, "VM provisioned");
        Ok(VmIdentity {
            name,
            vm_id,
            group: group.map(str::to_string),
        })
    }

    /// Remove the VM called `name`, powering it off first if it runs.
    pub async fn destroy(&self, scope: &InventoryScope, name: &str) -> PluginResult<()> {
        let vm = GroupNamespace::new(self.plane)
            .find_by_name(scope, name)
            .await?
            .ok_or_else(|| PluginError::not_found(format!("VM [{name}] could not be found")))?;

        if vm.power_state == VmPowerState::PoweredOn {
            info!(vm = %name, "powering off VM before removal");
            self.run(&vm.vm, PowerAction::Stop, "Power Off").await?;
        }

        let handle = self
            .plane
            .delete_vm(&vm.vm)
            .await
            .map_err(|e| e.in_task("Deleting VM"))?;
        wait_for_task(self.plane, handle, "Deleting VM", &self.policy).await?;
        info!(vm = %name, id = %vm.vm, "VM destroyed");
        Ok(())
    }

    async fn run(&self, vm_id: &str, action: PowerAction, operation: &str) -> PluginResult<()> {
        let handle = self
            .plane
            .power(vm_id, action)
            .await
            .map_err(|e| e.in_task(operation))?;
        wait_for_task(self.plane, handle, operation, &self.policy).await?;
        Ok(())
    }
}
