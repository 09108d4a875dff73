//! Ordered virtual-device composition.
//!
//! The storage controller rides along in the creation descriptor so it
//! exists before any disk; everything else is attached once the VM object
//! exists, always in the order controller → network adapter → persistent
//! disk → removable media.

use crate::control_plane::ControlPlane;
use crate::error::PluginResult;
use crate::resolver::ResolvedResources;
use crate::spec::InstanceSpec;
use crate::types::*;

use tracing::{debug, info};

/// Bus the paravirtual controller is created on; disks attach to it.
pub const CONTROLLER_BUS: u32 = 0;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualDevice {
    ScsiController(ScsiAdapterSpec),
    NetworkAdapter(NicCreateSpec),
    PersistentDisk(DiskCreateSpec),
    Cdrom(CdromCreateSpec),
}

impl VirtualDevice {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ScsiController(_) => "SCSI controller",
            Self::NetworkAdapter(_) => "network adapter",
            Self::PersistentDisk(_) => "persistent disk",
            Self::Cdrom(_) => "CD-ROM",
        }
    }
}

pub struct DeviceComposer;

impl DeviceComposer {
    /// The paravirtual SCSI controller every VM carries.
    pub fn controller() -> ScsiAdapterSpec {
        ScsiAdapterSpec {
            adapter_type: ScsiAdapterType::Pvscsi,
            bus: Some(CONTROLLER_BUS),
        }
    }

    /// Every device for `vm_name`, in attachment order.
    pub fn compose(
        spec: &InstanceSpec,
        resources: &ResolvedResources,
        vm_name: &str,
    ) -> Vec<VirtualDevice> {
        let mut devices = vec![VirtualDevice::ScsiController(Self::controller())];

        if let Some(ref network) = resources.network {
            devices.push(VirtualDevice::NetworkAdapter(NicCreateSpec {
                nic_type: NicType::Vmxnet3,
                backing: NicBackingSpec {
                    backing_type: network.network_type,
                    network: network.reference.id.clone(),
                },
                start_connected: true,
                allow_guest_control: true,
            }));
        }

        if spec.persistent_mb > 0 {
            devices.push(VirtualDevice::PersistentDisk(DiskCreateSpec {
                bus: DiskHostBus::Scsi,
                scsi: Some(ScsiAddressSpec {
                    bus: CONTROLLER_BUS,
                    unit: None,
                }),
                new_vmdk: NewVmdkSpec {
                    name: vm_name.to_string(),
                    capacity: spec.persistent_mb.saturating_mul(MB),
                },
            }));
        }

        if let Some(ref iso) = spec.iso_path {
            devices.push(VirtualDevice::Cdrom(CdromCreateSpec {
                bus: DiskHostBus::Ide,
                backing: CdromBackingSpec {
                    backing_type: CdromBackingType::IsoFile,
                    iso_file: Some(resources.datastore_path(iso)),
                },
                start_connected: true,
                allow_guest_control: true,
            }));
        }

        devices
    }

    /// Attach `devices` to an existing VM in order, stopping at the first
    /// failure. The controller is skipped; it was created with the VM.
    pub async fn attach<P: ControlPlane + ?Sized>(
        plane: &P,
        vm_id: &str,
        devices: &[VirtualDevice],
    ) -> PluginResult<Vec<String>> {
        let mut attached = Vec::with_capacity(devices.len());
        for device in devices {
            let id = match device {
                VirtualDevice::ScsiController(_) => {
                    debug!(vm = %vm_id, "controller present from creation");
                    continue;
                }
                VirtualDevice::NetworkAdapter(nic) => plane.add_nic(vm_id, nic).await,
                VirtualDevice::PersistentDisk(disk) => plane.add_disk(vm_id, disk).await,
                VirtualDevice::Cdrom(cdrom) => plane.add_cdrom(vm_id, cdrom).await,
            }
            .map_err(|e| e.in_device(device.label(), vm_id))?;
            info!(vm = %vm_id, device = device.label(), id = %id, "device attached");
            attached.push(id);
        }
        Ok(attached)
    }
}
