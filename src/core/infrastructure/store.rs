//! Persistence contracts used by the orchestration services.
//!
//! Every method is a single atomic step. Multi-row writes
//! ([`VmStore::insert_vm`], [`InventoryStore::create_mac_object`],
//! [`InventoryStore::delete_network_objects`]) run in one transaction.

use crate::core::domain::{
    error::{ConflictError, VmmError},
    model::{
        network::SwitchRef,
        network_object::NetworkObject,
        vm::{NewVm, Vm, VmAction},
    },
    value_object::ClockOffset,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a persistence backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot initialize store: {0}")]
    Init(String),

    #[error("query failed: {0}")]
    Query(String),

    /// A unique constraint rejected the write.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: u32, found: u32 },

    /// An update addressed a row that does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl From<StoreError> for VmmError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(conflict) => VmmError::Conflict(conflict),
            StoreError::NotFound { kind, id } => VmmError::NotFound { kind, id },
            other => VmmError::Persistence(other.to_string()),
        }
    }
}

/// Access to persisted VM aggregates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VmStore: Send + Sync {
    async fn vm_id_in_use(&self, vm_id: u32) -> Result<bool, StoreError>;

    async fn vnc_port_in_use(&self, port: u16) -> Result<bool, StoreError>;

    /// True if any storage row references the dataset.
    async fn dataset_in_use(&self, dataset: &str) -> Result<bool, StoreError>;

    /// The VM id owning a passthrough device, if any.
    async fn pci_device_owner(&self, device_id: u32) -> Result<Option<u32>, StoreError>;

    /// The VM id that pinned a host core, if any.
    async fn pinned_core_owner(&self, core: u32) -> Result<Option<u32>, StoreError>;

    /// True if any network row references the MAC identity.
    async fn mac_object_attached(&self, mac_id: i64) -> Result<bool, StoreError>;

    /// Persists a VM with its storages, networks, PCI devices and pins.
    async fn insert_vm(&self, vm: &NewVm) -> Result<Vm, StoreError>;

    async fn get_vm(&self, id: i64) -> Result<Option<Vm>, StoreError>;

    async fn find_vm_by_vm_id(&self, vm_id: u32) -> Result<Option<Vm>, StoreError>;

    async fn list_vms(&self) -> Result<Vec<Vm>, StoreError>;

    async fn delete_vm_row(&self, id: i64) -> Result<(), StoreError>;

    async fn delete_storage_row(&self, id: i64) -> Result<(), StoreError>;

    async fn delete_network_row(&self, id: i64) -> Result<(), StoreError>;

    async fn delete_stat_row(&self, id: i64) -> Result<(), StoreError>;

    async fn update_clock_offset(&self, vm_id: u32, offset: ClockOffset)
    -> Result<(), StoreError>;

    async fn update_description(&self, id: i64, description: &str) -> Result<(), StoreError>;

    async fn update_wake_on_lan(&self, vm_id: u32, enabled: bool) -> Result<(), StoreError>;

    async fn update_boot_order(
        &self,
        vm_id: u32,
        start_at_boot: bool,
        start_order: u32,
    ) -> Result<(), StoreError>;

    /// Stamps `started_at` or `stopped_at` after a power action.
    async fn record_power_event(
        &self,
        id: i64,
        action: VmAction,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Access to the host inventory the VMs reference: switches, network
/// identity objects, passthrough devices and downloaded ISOs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Switches with the given name, standard switches first.
    async fn find_switches(&self, name: &str) -> Result<Vec<SwitchRef>, StoreError>;

    async fn network_object(&self, id: i64) -> Result<Option<NetworkObject>, StoreError>;

    async fn network_object_name_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Creates a MAC identity object with a single resolved value.
    async fn create_mac_object(&self, name: &str, mac: &str)
    -> Result<NetworkObject, StoreError>;

    /// Deletes the objects with their entries and resolution-cache rows.
    async fn delete_network_objects(&self, ids: &[i64]) -> Result<(), StoreError>;

    async fn passthrough_device_exists(&self, id: u32) -> Result<bool, StoreError>;

    /// Location of a downloaded ISO, if the uuid is known.
    async fn iso_path(&self, uuid: &str) -> Result<Option<PathBuf>, StoreError>;
}
