use crate::core::domain::error::ValidationError;
use std::fmt;

/// A user-chosen VM id. Also the name of the VM's domain on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmId(u32);

impl VmId {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 9999;

    /// Creates a new VM id, validating its range.
    pub fn new(id: u32) -> Result<Self, ValidationError> {
        validate_vm_id(Some(id))?;
        Ok(Self(id))
    }

    /// Returns the id.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Returns the name the domain is registered under on the control plane.
    pub fn domain_name(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates that a VM id is present and within `[1, 9999]`.
pub(crate) fn validate_vm_id(id: Option<u32>) -> Result<(), ValidationError> {
    match id {
        Some(id) if (VmId::MIN..=VmId::MAX).contains(&id) => Ok(()),
        other => Err(ValidationError::InvalidVmId(other)),
    }
}
