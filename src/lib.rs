mod core;
mod vm;

#[cfg(test)]
mod tests;

pub use crate::core::{
    domain::{
        error::{
            ConflictError, ControlPlaneError, DescriptorError, StoragePoolError, ValidationError,
            VmmError, VmmResult,
        },
        model::{
            domain_state::{DomainHandle, DomainState},
            network::{Network, SwitchKind, SwitchRef},
            network_object::NetworkObject,
            pool_dataset::{DatasetKind, PoolDataset},
            storage::{Storage, StorageEmulation, StorageType},
            vm::{Vm, VmAction, VmState, VmStats, VmSummary},
        },
        value_object::{
            ClockOffset, Description, MacAddress, VmId, VmName, VncPassword, VncPort,
        },
    },
    infrastructure::{
        config::{OrchestratorConfig, RateLimitConfig, VncPasswordPolicy},
        control_plane::{ControlPlane, RateLimitedControlPlane},
        domain_xml::{DescriptorSummary, inspect_descriptor, set_clock_offset},
        host_probe::{HostProbe, SystemHost},
        sqlite_store::SqliteStore,
        storage_pool::StoragePool,
        store::{InventoryStore, StoreError, VmStore},
    },
};
pub use crate::vm::application::request::{
    create_vm_request::CreateVmRequest, remove_vm_request::RemoveVmOptions,
};
use crate::vm::application::service::{
    clock_service::ClockService, lifecycle_service::LifecycleService,
    network_attachment_service::NetworkAttachmentService,
    provisioning_service::ProvisioningService, teardown_service::TeardownService,
    validation_service::ValidationService,
};
use std::sync::Arc;
use tracing::instrument;

/// Orchestrates the lifecycle of virtual machines on a single host.
///
/// The orchestrator ties together:
/// - a persistent VM store (and the inventory of switches, MAC identities,
///   passthrough devices and ISOs it references)
/// - the virtualization control plane that defines and runs domains
/// - the storage-pool driver backing VM disks
///
/// # Examples
///
/// ```no_run
/// use leeca_vmm::{
///     ControlPlane, CreateVmRequest, SqliteStore, StoragePool, VmOrchestrator, VmmResult,
/// };
/// use std::{path::Path, sync::Arc};
///
/// async fn provision(
///     control_plane: Arc<dyn ControlPlane>,
///     pool: Arc<dyn StoragePool>,
/// ) -> VmmResult<()> {
///     let store = SqliteStore::open_and_init(Path::new("/var/db/vmm.sqlite")).await?;
///
///     let orchestrator = VmOrchestrator::builder()
///         .store(Arc::new(store))
///         .control_plane(control_plane)
///         .storage_pool(pool)
///         .build()?;
///
///     let vm = orchestrator
///         .create_vm(&CreateVmRequest {
///             name: "web".to_string(),
///             vm_id: Some(101),
///             cpu_sockets: 1,
///             cpu_cores: 2,
///             cpu_threads: 1,
///             ram: 2 << 30,
///             vnc_port: 5901,
///             vnc_resolution: "1024x768".to_string(),
///             time_offset: "utc".to_string(),
///             ..Default::default()
///         })
///         .await?;
///     println!("created VM record {}", vm.id);
///     Ok(())
/// }
/// ```
pub struct VmOrchestrator {
    validation: ValidationService,
    networks: NetworkAttachmentService,
    provisioning: ProvisioningService,
    clock: ClockService,
    teardown: TeardownService,
    lifecycle: LifecycleService,
}

/// Builder for VmOrchestrator configuration
#[derive(Default)]
pub struct VmOrchestratorBuilder {
    vms: Option<Arc<dyn VmStore>>,
    inventory: Option<Arc<dyn InventoryStore>>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    storage_pool: Option<Arc<dyn StoragePool>>,
    host: Option<Arc<dyn HostProbe>>,
    config: OrchestratorConfig,
}

impl VmOrchestratorBuilder {
    /// Uses one SQLite database for VMs and inventory.
    pub fn store(mut self, store: Arc<SqliteStore>) -> Self {
        self.vms = Some(store.clone());
        self.inventory = Some(store);
        self
    }

    pub fn vm_store(mut self, vms: Arc<dyn VmStore>) -> Self {
        self.vms = Some(vms);
        self
    }

    pub fn inventory_store(mut self, inventory: Arc<dyn InventoryStore>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    pub fn storage_pool(mut self, pool: Arc<dyn StoragePool>) -> Self {
        self.storage_pool = Some(pool);
        self
    }

    /// Overrides the host probe. Defaults to [`SystemHost`].
    pub fn host(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `VmmError::Configuration` if a collaborator is missing or the
    /// configuration is inconsistent.
    pub fn build(self) -> VmmResult<VmOrchestrator> {
        self.config.validate()?;

        let vms = self.vms.ok_or_else(|| missing("VM store"))?;
        let inventory = self.inventory.ok_or_else(|| missing("inventory store"))?;
        let pool = self.storage_pool.ok_or_else(|| missing("storage pool"))?;
        let mut control_plane = self.control_plane.ok_or_else(|| missing("control plane"))?;
        if let Some(limit) = self.config.control_plane_rate_limit {
            control_plane = Arc::new(RateLimitedControlPlane::new(control_plane, limit)?);
        }
        let host = self.host.unwrap_or_else(|| {
            Arc::new(SystemHost::new(
                self.config.port_probe_address,
                self.config.logical_cores_override,
            ))
        });
        let config = Arc::new(self.config);

        Ok(VmOrchestrator {
            validation: ValidationService::new(
                vms.clone(),
                inventory.clone(),
                pool.clone(),
                host,
                config,
            ),
            networks: NetworkAttachmentService::new(inventory.clone()),
            provisioning: ProvisioningService::new(
                vms.clone(),
                inventory.clone(),
                control_plane.clone(),
            ),
            clock: ClockService::new(vms.clone(), control_plane.clone()),
            teardown: TeardownService::new(vms.clone(), inventory, pool, control_plane.clone()),
            lifecycle: LifecycleService::new(vms, control_plane),
        })
    }
}

fn missing(part: &str) -> VmmError {
    VmmError::Configuration(format!("{part} is required"))
}

impl VmOrchestrator {
    /// Creates a new builder for VmOrchestrator configuration
    pub fn builder() -> VmOrchestratorBuilder {
        VmOrchestratorBuilder::default()
    }

    /// Validates, persists and defines a new VM.
    ///
    /// # Returns
    ///
    /// * `Ok(Vm)` with the persisted record once its domain is defined
    ///
    /// # Errors
    ///
    /// This method will return an error if:
    /// - A validation rule is violated (`VmmError::Validation`)
    /// - A unique resource is already taken (`VmmError::Conflict`)
    /// - The domain could not be defined (`VmmError::CreationRolledBack`)
    /// - Rolling back a failed creation failed (`VmmError::Compensation`)
    #[instrument(skip_all, fields(name = %request.name, vm_id = ?request.vm_id))]
    pub async fn create_vm(&self, request: &CreateVmRequest) -> VmmResult<Vm> {
        let validated = self.validation.validate(request).await?;
        let attachment = match &validated.network {
            Some(network) => Some(
                self.networks
                    .resolve(validated.name.as_str(), network)
                    .await?,
            ),
            None => None,
        };
        self.provisioning.provision(&validated, attachment).await
    }

    /// Removes a VM by record id, along with what `options` selects.
    pub async fn remove_vm(&self, id: i64, options: RemoveVmOptions) -> VmmResult<()> {
        self.teardown.remove_vm(id, options).await
    }

    pub async fn perform_action(&self, id: i64, action: VmAction) -> VmmResult<()> {
        self.lifecycle.perform_action(id, action).await
    }

    pub async fn update_description(&self, id: i64, description: &str) -> VmmResult<()> {
        self.lifecycle.update_description(id, description).await
    }

    /// Sets the guest clock offset (`utc` or `localtime`) of a shut-off VM.
    pub async fn modify_clock(&self, vm_id: u32, offset: &str) -> VmmResult<()> {
        self.clock.modify_clock(vm_id, offset).await
    }

    pub async fn modify_wake_on_lan(&self, vm_id: u32, enabled: bool) -> VmmResult<()> {
        self.lifecycle.modify_wake_on_lan(vm_id, enabled).await
    }

    pub async fn modify_boot_order(
        &self,
        vm_id: u32,
        start_at_boot: bool,
        start_order: i64,
    ) -> VmmResult<()> {
        self.lifecycle
            .modify_boot_order(vm_id, start_at_boot, start_order)
            .await
    }

    /// Returns every VM with its current state.
    pub async fn list_vms(&self) -> VmmResult<Vec<Vm>> {
        self.lifecycle.list_vms().await
    }

    pub async fn simple_list(&self) -> VmmResult<Vec<VmSummary>> {
        self.lifecycle.simple_list().await
    }

    pub async fn get_vm(&self, id: i64) -> VmmResult<Vm> {
        self.lifecycle.get_vm(id).await
    }
}
