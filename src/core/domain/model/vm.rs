//! Domain models for persisted virtual machines.
//!
//! A [`Vm`] is the aggregate root: its storages, networks and historical
//! stats are owned by it and deleted with it. The [`VmState`] is derived
//! from the control plane on read and never persisted.

use super::{
    network::{Network, NewNetwork},
    storage::{NewStorage, Storage},
};
use crate::core::domain::{error::ValidationError, value_object::ClockOffset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A virtual machine as stored by the orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    /// Internal record id.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
    /// Free-form description (may be empty).
    pub description: String,
    /// The user-chosen VM id, also the domain name on the control plane.
    pub vm_id: u32,
    /// Number of CPU sockets.
    pub cpu_sockets: u32,
    /// Number of cores per socket.
    pub cpu_cores: u32,
    /// Number of threads per core.
    pub cpu_threads: u32,
    /// Memory in bytes.
    pub ram: u64,
    /// VNC console port.
    pub vnc_port: u16,
    /// VNC console password (empty when unset).
    pub vnc_password: String,
    /// VNC framebuffer resolution, e.g. `1024x768`.
    pub vnc_resolution: String,
    /// Whether the guest waits for a VNC client before booting.
    pub vnc_wait: bool,
    /// Start the VM when the host boots.
    pub start_at_boot: bool,
    /// Position in the host boot sequence.
    pub start_order: u32,
    /// Wake-on-LAN enabled.
    pub wol: bool,
    /// TPM emulation enabled.
    pub tpm_emulation: bool,
    /// Guest clock offset.
    pub time_offset: ClockOffset,
    /// ISO download uuid (empty when none is attached).
    pub iso: String,
    pub storages: Vec<Storage>,
    pub networks: Vec<Network>,
    /// Passthrough device ids owned exclusively by this VM.
    pub pci_devices: Vec<u32>,
    /// Host logical cores pinned exclusively by this VM.
    pub cpu_pinning: Vec<u32>,
    #[serde(skip)]
    pub stats: Vec<VmStats>,
    /// Derived from the control plane, [`VmState::Unknown`] until queried.
    pub state: VmState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Vm {
    /// Total virtual CPUs (sockets x cores x threads).
    pub fn vcpus(&self) -> u32 {
        self.cpu_sockets * self.cpu_cores * self.cpu_threads
    }

    /// Ids of the MAC identities referenced by this VM's networks.
    pub fn mac_ids(&self) -> Vec<i64> {
        self.networks.iter().filter_map(|n| n.mac_id).collect()
    }
}

/// A VM aggregate ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVm {
    pub name: String,
    pub description: String,
    pub vm_id: u32,
    pub cpu_sockets: u32,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub ram: u64,
    pub vnc_port: u16,
    pub vnc_password: String,
    pub vnc_resolution: String,
    pub vnc_wait: bool,
    pub start_at_boot: bool,
    pub start_order: u32,
    pub wol: bool,
    pub tpm_emulation: bool,
    pub time_offset: ClockOffset,
    pub iso: String,
    pub storages: Vec<NewStorage>,
    pub networks: Vec<NewNetwork>,
    pub pci_devices: Vec<u32>,
    pub cpu_pinning: Vec<u32>,
}

/// A historical resource-usage sample.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmStats {
    pub id: i64,
    pub vm_ref: i64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub memory_used: f64,
    pub created_at: DateTime<Utc>,
}

/// The derived runtime state of a VM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmState {
    Active,
    Inactive,
    #[default]
    Unknown,
}

/// A compact listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSummary {
    pub vm_id: u32,
    pub name: String,
    pub state: VmState,
}

/// A power action a caller may request on a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VmAction {
    /// Boot the domain.
    Start,
    /// Force the domain off.
    Stop,
    /// Ask the guest to shut down.
    Shutdown,
    /// Ask the guest to reboot.
    Reboot,
}

impl FromStr for VmAction {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(VmAction::Start),
            "stop" => Ok(VmAction::Stop),
            "shutdown" => Ok(VmAction::Shutdown),
            "reboot" => Ok(VmAction::Reboot),
            other => Err(ValidationError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            VmAction::Start => "start",
            VmAction::Stop => "stop",
            VmAction::Shutdown => "shutdown",
            VmAction::Reboot => "reboot",
        };
        f.write_str(action)
    }
}
