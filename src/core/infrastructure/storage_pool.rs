//! Contract for the storage-pool driver (ZFS-style datasets).

use crate::core::domain::{error::StoragePoolError, model::pool_dataset::PoolDataset};
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePool: Send + Sync {
    /// All filesystem datasets with their properties.
    async fn list_filesystems(&self) -> Result<Vec<PoolDataset>, StoragePoolError>;

    /// All volume datasets with their properties.
    async fn list_volumes(&self) -> Result<Vec<PoolDataset>, StoragePoolError>;

    /// Every dataset of any kind.
    async fn list_datasets(&self) -> Result<Vec<PoolDataset>, StoragePoolError>;

    /// Destroys a dataset by guid.
    async fn destroy(&self, guid: &str, recursive: bool) -> Result<(), StoragePoolError>;
}
