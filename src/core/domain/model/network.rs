//! Network attachments and the switches they connect to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of switch a network attachment connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchKind {
    /// A bridge managed by the host.
    Standard,
    /// A pre-existing bridge registered by name.
    Manual,
}

impl SwitchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchKind::Standard => "standard",
            SwitchKind::Manual => "manual",
        }
    }

    pub(crate) fn from_stored(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(SwitchKind::Standard),
            "manual" => Some(SwitchKind::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for SwitchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A switch resolved by name, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRef {
    pub kind: SwitchKind,
    pub id: i64,
    pub name: String,
    /// The host bridge interface backing the switch.
    pub bridge: String,
}

/// A persisted network attachment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: i64,
    /// Record id of the owning VM.
    pub vm_ref: i64,
    /// MAC identity object providing the address.
    pub mac_id: Option<i64>,
    pub switch_id: i64,
    #[serde(rename = "switchType")]
    pub switch_kind: SwitchKind,
    /// Emulated NIC model, e.g. `virtio`.
    pub emulation: String,
}

/// A network attachment ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNetwork {
    pub mac_id: Option<i64>,
    pub switch_id: i64,
    pub switch_kind: SwitchKind,
    pub emulation: String,
}
