//! Orchestrator configuration.

use crate::core::domain::{
    error::{VmmError, VmmResult},
    value_object::byte_size::MIB,
};
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, num::NonZeroU32, path::Path};

/// Rules a non-empty VNC password must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VncPasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    /// Minimum zxcvbn score (0-4). `None` disables the entropy check.
    pub min_score: Option<u8>,
}

impl Default for VncPasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 64,
            min_score: None,
        }
    }
}

/// Token-bucket limits applied to control-plane calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl RateLimitConfig {
    /// Returns the non-zero quota parameters, rejecting zero values.
    pub(crate) fn quota_parts(&self) -> VmmResult<(NonZeroU32, NonZeroU32)> {
        let rate = NonZeroU32::new(self.requests_per_second).ok_or_else(|| {
            VmmError::Configuration("requests_per_second must be greater than 0".to_string())
        })?;
        let burst = NonZeroU32::new(self.burst_size).ok_or_else(|| {
            VmmError::Configuration("burst_size must be greater than 0".to_string())
        })?;
        Ok((rate, burst))
    }
}

/// Configuration for [`crate::VmOrchestrator`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub vnc_password: VncPasswordPolicy,
    /// Smallest memory size a VM may request, in bytes.
    pub min_memory_bytes: u64,
    /// Smallest raw disk a VM may request, in bytes.
    pub min_raw_disk_bytes: u64,
    /// Optional throttling of control-plane calls.
    pub control_plane_rate_limit: Option<RateLimitConfig>,
    /// Address the VNC listener probe binds to.
    pub port_probe_address: IpAddr,
    /// Overrides the detected number of host logical cores.
    pub logical_cores_override: Option<usize>,
    /// Largest sockets x cores x threads product a VM may request.
    pub max_vcpus: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            vnc_password: VncPasswordPolicy::default(),
            min_memory_bytes: 128 * MIB,
            min_raw_disk_bytes: 128 * MIB,
            control_plane_rate_limit: None,
            port_probe_address: IpAddr::from([0, 0, 0, 0]),
            logical_cores_override: None,
            max_vcpus: 256,
        }
    }
}

impl OrchestratorConfig {
    /// Loads a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> VmmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VmmError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses a configuration from a JSON document.
    pub fn from_json_str(raw: &str) -> VmmResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| VmmError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency of the configuration.
    pub fn validate(&self) -> VmmResult<()> {
        if self.vnc_password.min_length == 0 {
            return Err(VmmError::Configuration(
                "vncPassword.minLength must be greater than 0".to_string(),
            ));
        }
        if self.vnc_password.min_length > self.vnc_password.max_length {
            return Err(VmmError::Configuration(
                "vncPassword.minLength cannot exceed maxLength".to_string(),
            ));
        }
        if matches!(self.vnc_password.min_score, Some(score) if score > 4) {
            return Err(VmmError::Configuration(
                "vncPassword.minScore must be between 0 and 4".to_string(),
            ));
        }
        if self.max_vcpus == 0 {
            return Err(VmmError::Configuration(
                "maxVcpus must be greater than 0".to_string(),
            ));
        }
        if let Some(rate_limit) = &self.control_plane_rate_limit {
            rate_limit.quota_parts()?;
        }
        Ok(())
    }
}
