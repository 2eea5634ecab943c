//! The provisioning saga.
//!
//! Persisting a VM and defining its domain cannot share a transaction, so
//! creation runs as a sequence of steps with explicit compensation:
//!
//! 1. persist the aggregate (VM, storages, networks, PCI devices, pins) in
//!    one write;
//! 2. create the sparse raw backing image, if the VM has raw storage;
//! 3. build the domain descriptor and define it.
//!
//! When step 2 or 3 fails, everything this attempt created is removed in
//! order: VM row, storage rows, network rows, MAC identities created during
//! network resolution, then the raw image. A failing compensation step is
//! reported as [`VmmError::Compensation`] and stops the rollback.

use crate::{
    core::{
        domain::{
            error::{VmmError, VmmResult},
            model::{
                storage::{NewStorage, StorageEmulation, StorageType},
                vm::{NewVm, Vm},
            },
        },
        infrastructure::{
            control_plane::ControlPlane,
            domain_xml::{DiskSource, DiskSpec, DomainDescriptorBuilder, InterfaceSpec},
            store::{InventoryStore, VmStore},
        },
    },
    vm::application::service::{
        network_attachment_service::NetworkAttachment, validation_service::ValidatedVm,
    },
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs::OpenOptions;
use tracing::{error, info, instrument, warn};

/// Everything a single provisioning attempt created.
#[derive(Debug, Default)]
struct RollbackScope {
    vm: Option<Vm>,
    created_macs: Vec<i64>,
    created_image: Option<PathBuf>,
}

pub struct ProvisioningService {
    vms: Arc<dyn VmStore>,
    inventory: Arc<dyn InventoryStore>,
    control_plane: Arc<dyn ControlPlane>,
}

impl ProvisioningService {
    pub fn new(
        vms: Arc<dyn VmStore>,
        inventory: Arc<dyn InventoryStore>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            vms,
            inventory,
            control_plane,
        }
    }

    /// Persists the VM and defines its domain.
    ///
    /// # Errors
    /// * `VmmError::Conflict` if a unique constraint rejected the write.
    /// * `VmmError::CreationRolledBack` if the image or domain could not be
    ///   created and every persisted row was removed again.
    /// * `VmmError::Compensation` if the rollback itself failed.
    #[instrument(skip_all, fields(vm_id = %validated.vm_id, name = %validated.name.as_str()))]
    pub async fn provision(
        &self,
        validated: &ValidatedVm,
        attachment: Option<NetworkAttachment>,
    ) -> VmmResult<Vm> {
        let mut scope = RollbackScope {
            created_macs: attachment
                .iter()
                .filter_map(|a| a.created_mac.as_ref().map(|o| o.id))
                .collect(),
            ..Default::default()
        };

        let new_vm = new_vm(validated, attachment.as_ref());
        let vm = match self.vms.insert_vm(&new_vm).await {
            Ok(vm) => vm,
            Err(e) => {
                let cause = VmmError::from(e);
                warn!(error = %cause, "failed to persist VM");
                return Err(match self.roll_back(&scope).await {
                    Ok(()) => cause,
                    Err((step, source)) => compensation_failed(step, source, cause),
                });
            }
        };
        scope.vm = Some(vm.clone());

        if let Err(cause) = self
            .instantiate(&vm, validated, attachment.as_ref(), &mut scope)
            .await
        {
            warn!(error = %cause, record_id = vm.id, "domain creation failed, rolling back");
            return Err(match self.roll_back(&scope).await {
                Ok(()) => VmmError::CreationRolledBack {
                    source: Box::new(cause),
                },
                Err((step, source)) => compensation_failed(step, source, cause),
            });
        }

        info!(record_id = vm.id, "VM provisioned");
        Ok(vm)
    }

    async fn instantiate(
        &self,
        vm: &Vm,
        validated: &ValidatedVm,
        attachment: Option<&NetworkAttachment>,
        scope: &mut RollbackScope,
    ) -> VmmResult<()> {
        if let Some(storage) = &validated.storage {
            if let Some(path) = &storage.image_path {
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(path)
                    .await?;
                scope.created_image = Some(path.clone());
                file.set_len(storage.size).await?;
            }
        }

        let descriptor = descriptor(vm, validated, attachment).build()?;
        let domain = self.control_plane.define(&descriptor).await?;
        info!(domain = %domain.name, uuid = %domain.uuid, "domain defined");
        Ok(())
    }

    async fn roll_back(&self, scope: &RollbackScope) -> Result<(), (&'static str, VmmError)> {
        if let Some(vm) = &scope.vm {
            self.vms
                .delete_vm_row(vm.id)
                .await
                .map_err(|e| ("delete VM row", e.into()))?;
            for storage in &vm.storages {
                self.vms
                    .delete_storage_row(storage.id)
                    .await
                    .map_err(|e| ("delete storage row", e.into()))?;
            }
            for network in &vm.networks {
                self.vms
                    .delete_network_row(network.id)
                    .await
                    .map_err(|e| ("delete network row", e.into()))?;
            }
        }

        if !scope.created_macs.is_empty() {
            self.inventory
                .delete_network_objects(&scope.created_macs)
                .await
                .map_err(|e| ("delete created MAC identity", e.into()))?;
        }

        if let Some(path) = &scope.created_image {
            remove_image(path)
                .await
                .map_err(|e| ("remove created raw image", e.into()))?;
        }

        Ok(())
    }
}

fn compensation_failed(step: &'static str, source: VmmError, cause: VmmError) -> VmmError {
    error!(step, error = %source, cause = %cause, "compensation failed, manual cleanup required");
    VmmError::Compensation {
        step,
        source: Box::new(source),
        cause: Box::new(cause),
    }
}

async fn remove_image(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn new_vm(validated: &ValidatedVm, attachment: Option<&NetworkAttachment>) -> NewVm {
    let mut storages = Vec::with_capacity(2);
    if let Some(storage) = &validated.storage {
        let name = match storage.kind {
            StorageType::Raw => validated.vm_id.to_string(),
            _ => String::new(),
        };
        storages.push(NewStorage {
            name,
            kind: storage.kind,
            dataset: storage.dataset.guid.clone(),
            size: storage.size,
            emulation: storage.emulation,
        });
    }
    if let Some(iso) = &validated.iso {
        storages.push(NewStorage {
            name: String::new(),
            kind: StorageType::Iso,
            dataset: iso.uuid.clone(),
            size: 0,
            emulation: StorageEmulation::AhciCd,
        });
    }

    NewVm {
        name: validated.name.as_str().to_string(),
        description: validated.description.as_str().to_string(),
        vm_id: validated.vm_id.get(),
        cpu_sockets: validated.cpu_sockets,
        cpu_cores: validated.cpu_cores,
        cpu_threads: validated.cpu_threads,
        ram: validated.ram,
        vnc_port: validated.vnc_port.get(),
        vnc_password: validated
            .vnc_password
            .as_ref()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default(),
        vnc_resolution: validated.vnc_resolution.clone(),
        vnc_wait: validated.vnc_wait,
        start_at_boot: validated.start_at_boot,
        start_order: validated.start_order,
        wol: false,
        tpm_emulation: validated.tpm_emulation,
        time_offset: validated.time_offset,
        iso: validated
            .iso
            .as_ref()
            .map(|iso| iso.uuid.clone())
            .unwrap_or_default(),
        storages,
        networks: attachment.map(|a| a.network.clone()).into_iter().collect(),
        pci_devices: validated.pci_devices.clone(),
        cpu_pinning: validated.cpu_pinning.clone(),
    }
}

fn descriptor(
    vm: &Vm,
    validated: &ValidatedVm,
    attachment: Option<&NetworkAttachment>,
) -> DomainDescriptorBuilder {
    let mut builder = DomainDescriptorBuilder::from_vm(vm);

    if let Some(storage) = &validated.storage {
        let source = match &storage.image_path {
            Some(path) => DiskSource::File(path.clone()),
            None => DiskSource::Block(Path::new("/dev/zvol").join(&storage.dataset.name)),
        };
        builder = builder.disk(DiskSpec {
            source,
            bus: storage.emulation,
        });
    }
    if let Some(iso) = &validated.iso {
        builder = builder.disk(DiskSpec {
            source: DiskSource::Cdrom(iso.path.clone()),
            bus: StorageEmulation::AhciCd,
        });
    }
    if let Some(attachment) = attachment {
        builder = builder.interface(InterfaceSpec {
            bridge: attachment.switch.bridge.clone(),
            mac: Some(attachment.mac.clone()),
            model: attachment.network.emulation.clone(),
        });
    }

    builder
}
