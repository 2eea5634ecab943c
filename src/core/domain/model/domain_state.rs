//! Control-plane domain handles and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a domain registered on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainHandle {
    pub name: String,
    pub uuid: String,
}

/// The lifecycle state of a domain as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    NoState,
    Running,
    Blocked,
    Paused,
    ShuttingDown,
    /// No live configuration is active; definition edits are safe.
    Shutoff,
    Crashed,
    Suspended,
}

impl DomainState {
    /// True if the domain has a live configuration.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DomainState::Running
                | DomainState::Blocked
                | DomainState::Paused
                | DomainState::ShuttingDown
                | DomainState::Suspended
        )
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            DomainState::NoState => "no state",
            DomainState::Running => "running",
            DomainState::Blocked => "blocked",
            DomainState::Paused => "paused",
            DomainState::ShuttingDown => "shutting down",
            DomainState::Shutoff => "shut off",
            DomainState::Crashed => "crashed",
            DomainState::Suspended => "suspended",
        };
        f.write_str(state)
    }
}
