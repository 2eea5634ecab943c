//! Storage attached to a VM.

use crate::core::domain::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The kind of backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// A sparse image file on a pool filesystem.
    Raw,
    /// A pool volume used as a block device.
    Zvol,
    /// A downloaded ISO image attached as a CD-ROM.
    Iso,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Raw => "raw",
            StorageType::Zvol => "zvol",
            StorageType::Iso => "iso",
        }
    }
}

impl FromStr for StorageType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "raw" => Ok(StorageType::Raw),
            "zvol" => Ok(StorageType::Zvol),
            "iso" => Ok(StorageType::Iso),
            other => Err(ValidationError::InvalidStorageType(other.to_string())),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The emulated bus a disk is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum StorageEmulation {
    #[serde(rename = "virtio-blk")]
    VirtioBlk,
    #[serde(rename = "ahci-hd")]
    AhciHd,
    #[serde(rename = "nvme")]
    Nvme,
    /// Reserved for ISO attachments.
    #[serde(rename = "ahci-cd")]
    AhciCd,
}

impl StorageEmulation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEmulation::VirtioBlk => "virtio-blk",
            StorageEmulation::AhciHd => "ahci-hd",
            StorageEmulation::Nvme => "nvme",
            StorageEmulation::AhciCd => "ahci-cd",
        }
    }

    /// Parses an emulation a caller may select for a data disk.
    /// `ahci-cd` is not selectable.
    pub fn parse_disk(value: &str) -> Result<Self, ValidationError> {
        match value {
            "virtio-blk" => Ok(StorageEmulation::VirtioBlk),
            "ahci-hd" => Ok(StorageEmulation::AhciHd),
            "nvme" => Ok(StorageEmulation::Nvme),
            other => Err(ValidationError::InvalidEmulationType(other.to_string())),
        }
    }

    pub(crate) fn from_stored(value: &str) -> Option<Self> {
        match value {
            "ahci-cd" => Some(StorageEmulation::AhciCd),
            other => Self::parse_disk(other).ok(),
        }
    }
}

impl fmt::Display for StorageEmulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted storage row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    pub id: i64,
    /// Record id of the owning VM.
    pub vm_ref: i64,
    /// Base name of the backing image for raw storage, empty otherwise.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StorageType,
    /// Pool dataset guid for raw and zvol storage, download uuid for ISOs.
    pub dataset: String,
    /// Size in bytes. Only meaningful for raw storage.
    pub size: u64,
    pub emulation: StorageEmulation,
}

impl Storage {
    /// File name of the raw backing image under the dataset's mountpoint.
    pub fn image_file_name(&self) -> String {
        image_file_name(&self.name)
    }
}

/// A storage row ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStorage {
    pub name: String,
    pub kind: StorageType,
    pub dataset: String,
    pub size: u64,
    pub emulation: StorageEmulation,
}

pub(crate) fn image_file_name(name: &str) -> String {
    format!("{name}.img")
}
