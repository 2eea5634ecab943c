use serde::{Deserialize, Serialize};

/// A proposed VM, exactly as submitted by a caller.
///
/// Fields are kept loose (strings, options, signed integers) so that every
/// rule violation is reported by validation instead of by deserialization.
/// `"none"` (any case) is accepted wherever a reference is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateVmRequest {
    pub name: String,
    #[serde(rename = "vmId")]
    pub vm_id: Option<u32>,
    pub description: String,

    /// `raw`, `zvol`, or empty/`none` for no data disk.
    pub storage_type: String,
    /// Pool dataset guid backing the data disk.
    pub storage_dataset: String,
    /// Requested size in bytes, only used for `raw`.
    pub storage_size: Option<u64>,
    pub storage_emulation_type: String,

    /// Switch to attach to, empty/`none` for no network.
    pub switch_name: String,
    pub switch_emulation_type: String,
    /// Existing MAC identity to reuse. A fresh one is created when absent.
    pub mac_id: Option<i64>,

    pub cpu_sockets: u32,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub cpu_pinning: Vec<u32>,
    /// Memory in bytes.
    pub ram: u64,

    pub vnc_port: u32,
    pub vnc_password: String,
    pub vnc_resolution: String,
    pub vnc_wait: Option<bool>,

    pub start_order: i64,
    pub start_at_boot: Option<bool>,
    pub tpm_emulation: Option<bool>,

    pub pci_devices: Vec<u32>,
    /// Download uuid of an ISO to attach.
    pub iso: String,
    /// `utc` or `localtime`.
    pub time_offset: String,
}

/// True if an optional reference is set to something other than `none`.
pub(crate) fn is_selected(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case("none")
}
