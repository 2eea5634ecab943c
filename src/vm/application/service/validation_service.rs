//! Capacity and identity checks run before any mutation.
//!
//! [`ValidationService::validate`] only reads. It walks the rules in a fixed
//! order and stops at the first violation, so callers always see the
//! earliest problem in their request. A successful run yields a
//! [`ValidatedVm`] whose fields are already parsed into their domain types.

use crate::{
    core::{
        domain::{
            error::{ConflictError, ValidationError, VmmResult},
            model::{
                pool_dataset::{DatasetKind, PoolDataset},
                storage::{StorageEmulation, StorageType, image_file_name},
            },
            value_object::{ClockOffset, Description, VmId, VmName, VncPassword, VncPort},
        },
        infrastructure::{
            config::OrchestratorConfig,
            host_probe::HostProbe,
            storage_pool::StoragePool,
            store::{InventoryStore, VmStore},
        },
    },
    vm::application::request::create_vm_request::{CreateVmRequest, is_selected},
};
use std::{collections::HashSet, path::PathBuf, sync::Arc};
use tracing::{debug, instrument};

/// The data disk of a validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStorage {
    pub kind: StorageType,
    pub dataset: PoolDataset,
    /// Bytes for raw storage, zero for zvol.
    pub size: u64,
    pub emulation: StorageEmulation,
    /// Backing image path for raw storage.
    pub image_path: Option<PathBuf>,
}

/// The network attachment a validated request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    pub switch_name: String,
    pub emulation: String,
    pub mac_id: Option<i64>,
}

/// A downloaded ISO to attach as a CD-ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoAttachment {
    pub uuid: String,
    pub path: PathBuf,
}

/// A VM request that passed every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedVm {
    pub name: VmName,
    pub vm_id: VmId,
    pub description: Description,
    pub storage: Option<ValidatedStorage>,
    pub network: Option<NetworkRequest>,
    pub cpu_sockets: u32,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub ram: u64,
    pub vnc_port: VncPort,
    pub vnc_password: Option<VncPassword>,
    pub vnc_resolution: String,
    pub vnc_wait: bool,
    pub start_at_boot: bool,
    pub start_order: u32,
    pub tpm_emulation: bool,
    pub pci_devices: Vec<u32>,
    pub cpu_pinning: Vec<u32>,
    pub iso: Option<IsoAttachment>,
    pub time_offset: ClockOffset,
}

pub struct ValidationService {
    vms: Arc<dyn VmStore>,
    inventory: Arc<dyn InventoryStore>,
    pool: Arc<dyn StoragePool>,
    host: Arc<dyn HostProbe>,
    config: Arc<OrchestratorConfig>,
}

impl ValidationService {
    pub fn new(
        vms: Arc<dyn VmStore>,
        inventory: Arc<dyn InventoryStore>,
        pool: Arc<dyn StoragePool>,
        host: Arc<dyn HostProbe>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            vms,
            inventory,
            pool,
            host,
            config,
        }
    }

    #[instrument(skip_all, fields(name = %request.name, vm_id = ?request.vm_id))]
    pub async fn validate(&self, request: &CreateVmRequest) -> VmmResult<ValidatedVm> {
        let result = self.run_checks(request).await;
        if let Err(e) = &result {
            debug!(error = %e, "request rejected");
        }
        result
    }

    async fn run_checks(&self, request: &CreateVmRequest) -> VmmResult<ValidatedVm> {
        let name = VmName::new(request.name.clone())?;
        let vm_id = self.check_vm_id(request.vm_id).await?;
        let description = Description::new(request.description.clone())?;
        let storage = self.check_storage(request, vm_id).await?;
        let network = self.check_network(request).await?;
        let vcpus = self.check_compute(request)?;
        let vnc_port = self.check_vnc_port(request.vnc_port).await?;

        let vnc_password = if request.vnc_password.is_empty() {
            None
        } else {
            Some(VncPassword::new(
                request.vnc_password.clone(),
                &self.config.vnc_password,
            )?)
        };

        if request.vnc_resolution.trim().is_empty() {
            return Err(ValidationError::NoVncResolution.into());
        }

        let start_order = u32::try_from(request.start_order)
            .map_err(|_| ValidationError::InvalidBootOrder(request.start_order))?;

        self.check_pci_devices(&request.pci_devices).await?;
        self.check_cpu_pinning(&request.cpu_pinning, vcpus).await?;
        let iso = self.check_iso(&request.iso).await?;
        let time_offset = request.time_offset.parse::<ClockOffset>()?;

        Ok(ValidatedVm {
            name,
            vm_id,
            description,
            storage,
            network,
            cpu_sockets: request.cpu_sockets,
            cpu_cores: request.cpu_cores,
            cpu_threads: request.cpu_threads,
            ram: request.ram,
            vnc_port,
            vnc_password,
            vnc_resolution: request.vnc_resolution.clone(),
            vnc_wait: request.vnc_wait.unwrap_or(true),
            start_at_boot: request.start_at_boot.unwrap_or(true),
            start_order,
            tpm_emulation: request.tpm_emulation.unwrap_or(false),
            pci_devices: request.pci_devices.clone(),
            cpu_pinning: request.cpu_pinning.clone(),
            iso,
            time_offset,
        })
    }

    async fn check_vm_id(&self, vm_id: Option<u32>) -> VmmResult<VmId> {
        let vm_id = VmId::new(vm_id.ok_or(ValidationError::InvalidVmId(None))?)?;
        if self.vms.vm_id_in_use(vm_id.get()).await? {
            return Err(ConflictError::VmIdInUse(vm_id.get()).into());
        }
        Ok(vm_id)
    }

    async fn check_storage(
        &self,
        request: &CreateVmRequest,
        vm_id: VmId,
    ) -> VmmResult<Option<ValidatedStorage>> {
        if !is_selected(&request.storage_type) {
            return Ok(None);
        }

        let kind = match request.storage_type.parse::<StorageType>()? {
            StorageType::Iso => {
                return Err(ValidationError::InvalidStorageType(request.storage_type.clone()).into());
            }
            kind => kind,
        };

        let size = match kind {
            StorageType::Raw => {
                let min = self.config.min_raw_disk_bytes;
                match request.storage_size {
                    Some(size) if size >= min => size,
                    _ => return Err(ValidationError::DiskTooSmall { min }.into()),
                }
            }
            _ => 0,
        };

        let (noun, expected_kind) = match kind {
            StorageType::Raw => ("filesystem", DatasetKind::Filesystem),
            _ => ("volume", DatasetKind::Volume),
        };
        let guid = request.storage_dataset.trim();
        if guid.is_empty() {
            return Err(ValidationError::NoDatasetSelected { noun }.into());
        }

        if request.storage_emulation_type.is_empty() {
            return Err(ValidationError::NoEmulationType.into());
        }
        let emulation = StorageEmulation::parse_disk(&request.storage_emulation_type)?;

        let dataset = self
            .pool
            .list_datasets()
            .await?
            .into_iter()
            .find(|d| d.guid == guid)
            .ok_or_else(|| ValidationError::DatasetNotFound(guid.to_string()))?;

        if dataset.kind != expected_kind {
            return Err(ValidationError::InvalidDatasetType {
                guid: guid.to_string(),
                expected: noun,
            }
            .into());
        }

        let image_path = match kind {
            StorageType::Raw => Some(self.check_raw_target(&dataset, vm_id, size).await?),
            _ => {
                if self.vms.dataset_in_use(guid).await? {
                    return Err(ConflictError::ZvolInUse(guid.to_string()).into());
                }
                None
            }
        };

        Ok(Some(ValidatedStorage {
            kind,
            dataset,
            size,
            emulation,
            image_path,
        }))
    }

    async fn check_raw_target(
        &self,
        dataset: &PoolDataset,
        vm_id: VmId,
        size: u64,
    ) -> VmmResult<PathBuf> {
        let mountpoint = dataset
            .effective_mountpoint()
            .ok_or_else(|| ValidationError::DatasetMissingMountpoint(dataset.guid.clone()))?;

        let image_path = mountpoint.join(image_file_name(&vm_id.to_string()));
        if tokio::fs::try_exists(&image_path).await? {
            return Err(
                ValidationError::RawImageExists(image_path.display().to_string()).into(),
            );
        }

        let available = dataset
            .available_bytes()
            .ok_or_else(|| ValidationError::UnknownAvailableSpace(dataset.guid.clone()))?;
        if available < size {
            return Err(ValidationError::InsufficientSpace {
                guid: dataset.guid.clone(),
                available,
                requested: size,
            }
            .into());
        }

        Ok(image_path)
    }

    async fn check_network(&self, request: &CreateVmRequest) -> VmmResult<Option<NetworkRequest>> {
        if !is_selected(&request.switch_name) {
            return Ok(None);
        }

        if request.switch_emulation_type.trim().is_empty() {
            return Err(ValidationError::NoSwitchEmulationType.into());
        }

        // 0 is treated like an absent id
        let mac_id = request.mac_id.filter(|id| *id != 0);
        if let Some(id) = mac_id {
            let object = self
                .inventory
                .network_object(id)
                .await?
                .ok_or(ValidationError::MacObjectNotFound(id))?;
            if !object.is_mac() {
                return Err(ValidationError::InvalidMacObjectType {
                    id,
                    kind: object.kind,
                }
                .into());
            }
            if object.entries.is_empty() {
                return Err(ValidationError::MacObjectHasNoEntries(id).into());
            }
            if self.vms.mac_object_attached(id).await? {
                return Err(ConflictError::MacObjectInUse(id).into());
            }
        }

        Ok(Some(NetworkRequest {
            switch_name: request.switch_name.clone(),
            emulation: request.switch_emulation_type.clone(),
            mac_id,
        }))
    }

    /// Returns the vCPU count of the requested topology.
    fn check_compute(&self, request: &CreateVmRequest) -> VmmResult<u32> {
        for (axis, value) in [
            ("sockets", request.cpu_sockets),
            ("cores", request.cpu_cores),
            ("threads", request.cpu_threads),
        ] {
            if value < 1 {
                return Err(ValidationError::InvalidCpuTopology { axis }.into());
            }
        }

        let max = self.config.max_vcpus;
        let vcpus = request
            .cpu_sockets
            .checked_mul(request.cpu_cores)
            .and_then(|n| n.checked_mul(request.cpu_threads))
            .filter(|&n| n <= max)
            .ok_or(ValidationError::TooManyVcpus { max })?;

        if request.ram < self.config.min_memory_bytes {
            return Err(ValidationError::MemoryTooSmall {
                min: self.config.min_memory_bytes,
                requested: request.ram,
            }
            .into());
        }
        Ok(vcpus)
    }

    async fn check_vnc_port(&self, port: u32) -> VmmResult<VncPort> {
        let port = VncPort::new(port)?;
        if self.vms.vnc_port_in_use(port.get()).await? {
            return Err(ConflictError::VncPortInUse(port.get()).into());
        }
        if self.host.port_in_use(port.get()).await? {
            return Err(ConflictError::VncPortBound(port.get()).into());
        }
        Ok(port)
    }

    async fn check_pci_devices(&self, devices: &[u32]) -> VmmResult<()> {
        reject_duplicates("pci device", devices)?;
        for &device in devices {
            if !self.inventory.passthrough_device_exists(device).await? {
                return Err(ValidationError::PciDeviceNotFound(device).into());
            }
            if let Some(owner) = self.vms.pci_device_owner(device).await? {
                debug!(device, owner, "device already assigned");
                return Err(ConflictError::PciDeviceInUse(device).into());
            }
        }
        Ok(())
    }

    async fn check_cpu_pinning(&self, pins: &[u32], vcpus: u32) -> VmmResult<()> {
        if pins.is_empty() {
            return Ok(());
        }

        if pins.len() > vcpus as usize {
            return Err(ValidationError::PinningExceedsVcpus { vcpus }.into());
        }

        let cores = self
            .config
            .logical_cores_override
            .unwrap_or_else(|| self.host.logical_cores());
        if pins.len() > cores {
            return Err(ValidationError::PinningExceedsLogicalCores { cores }.into());
        }

        reject_duplicates("cpu pin", pins)?;
        for &core in pins {
            if core as usize >= cores {
                return Err(ValidationError::PinnedCoreOutOfRange { core, cores }.into());
            }
            if let Some(owner) = self.vms.pinned_core_owner(core).await? {
                debug!(core, owner, "core already pinned");
                return Err(ConflictError::CpuAlreadyPinned(core).into());
            }
        }
        Ok(())
    }

    async fn check_iso(&self, iso: &str) -> VmmResult<Option<IsoAttachment>> {
        if !is_selected(iso) {
            return Ok(None);
        }
        let path = self
            .inventory
            .iso_path(iso)
            .await?
            .ok_or_else(|| ValidationError::IsoNotFound(iso.to_string()))?;
        Ok(Some(IsoAttachment {
            uuid: iso.to_string(),
            path,
        }))
    }
}

fn reject_duplicates(field: &'static str, values: &[u32]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(values.len());
    for &value in values {
        if !seen.insert(value) {
            return Err(ValidationError::DuplicateEntry { field, value });
        }
    }
    Ok(())
}
