use crate::core::domain::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How the guest clock is offset from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockOffset {
    #[default]
    Utc,
    Localtime,
}

impl ClockOffset {
    /// Returns the value as written into the domain descriptor.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockOffset::Utc => "utc",
            ClockOffset::Localtime => "localtime",
        }
    }
}

impl FromStr for ClockOffset {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "utc" => Ok(ClockOffset::Utc),
            "localtime" => Ok(ClockOffset::Localtime),
            other => Err(ValidationError::InvalidClockOffset(other.to_string())),
        }
    }
}

impl fmt::Display for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
