use crate::core::domain::error::ValidationError;

/// A validated VNC port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VncPort(u16);

impl VncPort {
    /// Creates a new port, validating its range.
    pub fn new(port: u32) -> Result<Self, ValidationError> {
        validate_vnc_port(port)?;
        Ok(Self(port as u16))
    }

    /// Returns the port number.
    pub fn get(&self) -> u16 {
        self.0
    }
}

/// Validates a port number.
pub(crate) fn validate_vnc_port(port: u32) -> Result<(), ValidationError> {
    if port == 0 || port > u32::from(u16::MAX) {
        return Err(ValidationError::InvalidVncPort(port));
    }
    Ok(())
}
