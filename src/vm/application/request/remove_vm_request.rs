use serde::{Deserialize, Serialize};

/// What to clean up besides the VM's own rows and domain definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveVmOptions {
    /// Delete the MAC identities the VM's networks referenced.
    pub clean_up_macs: bool,
    /// Delete backing image files of raw storages.
    pub delete_raw_disks: bool,
    /// Destroy pool volumes backing zvol storages.
    pub delete_volumes: bool,
}
