use crate::core::domain::error::ValidationError;

const MAX_NAME_LENGTH: usize = 64;

/// A validated VM name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmName(String);

impl VmName {
    /// Creates a new name, validating the allowed charset.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_vm_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates a VM name: ASCII alphanumerics plus `-`, `_` and `.`, starting
/// with an alphanumeric character.
pub(crate) fn validate_vm_name(name: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidName(name.to_string());

    let first = name.chars().next().ok_or_else(invalid)?;
    if !first.is_ascii_alphanumeric() || name.len() > MAX_NAME_LENGTH {
        return Err(invalid());
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.';
    if !name.chars().all(allowed) {
        return Err(invalid());
    }
    Ok(())
}
