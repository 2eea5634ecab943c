use crate::{
    core::{
        domain::{
            error::{VmmError, VmmResult},
            model::{
                storage::{Storage, StorageType},
                vm::Vm,
            },
        },
        infrastructure::{
            control_plane::ControlPlane,
            storage_pool::StoragePool,
            store::{InventoryStore, VmStore},
        },
    },
    vm::application::request::remove_vm_request::RemoveVmOptions,
};
use std::{io::ErrorKind, sync::Arc};
use tracing::{info, instrument, warn};

/// Removes a VM and, optionally, what it was backed by.
pub struct TeardownService {
    vms: Arc<dyn VmStore>,
    inventory: Arc<dyn InventoryStore>,
    pool: Arc<dyn StoragePool>,
    control_plane: Arc<dyn ControlPlane>,
}

impl TeardownService {
    pub fn new(
        vms: Arc<dyn VmStore>,
        inventory: Arc<dyn InventoryStore>,
        pool: Arc<dyn StoragePool>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            vms,
            inventory,
            pool,
            control_plane,
        }
    }

    /// Tears a VM down step by step.
    ///
    /// Backing data goes first (as the options ask), then storage rows, the
    /// domain definition, network rows, stats rows and the VM row. MAC
    /// identities are deleted last in their own transaction. Steps are not
    /// atomic across each other: a failure leaves the earlier steps done.
    #[instrument(skip(self), fields(record_id = id))]
    pub async fn remove_vm(&self, id: i64, options: RemoveVmOptions) -> VmmResult<()> {
        let vm = self
            .vms
            .get_vm(id)
            .await?
            .ok_or_else(|| VmmError::not_found("vm", id))?;

        for storage in &vm.storages {
            match storage.kind {
                StorageType::Raw if options.delete_raw_disks => self.delete_raw_image(storage).await?,
                StorageType::Zvol if options.delete_volumes => self.destroy_volume(storage).await?,
                _ => {}
            }
        }

        for storage in &vm.storages {
            self.vms.delete_storage_row(storage.id).await?;
        }

        self.remove_domain(&vm).await?;

        let mut mac_ids = Vec::with_capacity(vm.networks.len());
        for network in &vm.networks {
            self.vms.delete_network_row(network.id).await?;
            mac_ids.extend(network.mac_id);
        }

        for stat in &vm.stats {
            self.vms.delete_stat_row(stat.id).await?;
        }

        self.vms.delete_vm_row(vm.id).await?;

        if options.clean_up_macs && !mac_ids.is_empty() {
            self.inventory.delete_network_objects(&mac_ids).await?;
            info!(count = mac_ids.len(), "deleted MAC identities");
        }

        info!(vm_id = vm.vm_id, "VM removed");
        Ok(())
    }

    async fn delete_raw_image(&self, storage: &Storage) -> VmmResult<()> {
        let filesystems = self.pool.list_filesystems().await?;
        let dataset = filesystems
            .iter()
            .find(|d| d.guid == storage.dataset)
            .ok_or_else(|| VmmError::not_found("filesystem", &storage.dataset))?;
        let mountpoint = dataset.effective_mountpoint().ok_or_else(|| {
            VmmError::StoragePool(format!("filesystem {} has no mountpoint", dataset.name))
        })?;

        let path = mountpoint.join(storage.image_file_name());
        match tokio::fs::try_exists(&path).await {
            Ok(true) => match tokio::fs::remove_file(&path).await {
                Ok(()) => info!(path = %path.display(), "deleted raw image"),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(path = %path.display(), "raw image vanished before deletion");
                }
                Err(e) => return Err(e.into()),
            },
            Ok(false) => warn!(path = %path.display(), "raw image not found, skipping"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot check raw image, skipping"),
        }
        Ok(())
    }

    async fn destroy_volume(&self, storage: &Storage) -> VmmResult<()> {
        let volumes = self.pool.list_volumes().await?;
        let volume = volumes
            .iter()
            .find(|d| d.guid == storage.dataset)
            .ok_or_else(|| VmmError::not_found("volume", &storage.dataset))?;
        self.pool.destroy(&volume.guid, true).await?;
        info!(volume = %volume.name, "destroyed volume");
        Ok(())
    }

    async fn remove_domain(&self, vm: &Vm) -> VmmResult<()> {
        let name = vm.vm_id.to_string();
        let Some(domain) = self.control_plane.lookup_domain(&name).await? else {
            warn!(domain = %name, "domain not defined, skipping undefine");
            return Ok(());
        };

        if self.control_plane.domain_state(&domain).await?.is_active() {
            self.control_plane.destroy(&domain).await?;
        }
        self.control_plane.undefine(&domain).await?;
        info!(domain = %name, "domain undefined");
        Ok(())
    }
}
