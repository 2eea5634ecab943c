//! Datasets reported by the storage-pool driver.

use crate::core::domain::value_object::byte_size::parse_human_size;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

/// The kind of a pool dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Filesystem,
    Volume,
    Snapshot,
}

/// A pool-managed filesystem or volume.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDataset {
    /// Stable unique identifier.
    pub guid: String,
    /// Full dataset name, e.g. `tank/vms/disk0`.
    pub name: String,
    pub kind: DatasetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,
    /// Raw driver properties, e.g. `available`.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl PoolDataset {
    /// The mountpoint, ignoring empty or `none`/`legacy` values.
    pub fn effective_mountpoint(&self) -> Option<&PathBuf> {
        self.mountpoint.as_ref().filter(|m| {
            let m = m.as_os_str();
            !m.is_empty() && m != "none" && m != "legacy" && m != "-"
        })
    }

    /// Available space in bytes, parsed from the `available` property.
    pub fn available_bytes(&self) -> Option<u64> {
        self.properties
            .get("available")
            .and_then(|v| parse_human_size(v))
    }
}
