//! Named network identity objects.

use serde::{Deserialize, Serialize};

/// A named identity record holding one or more resolved values.
///
/// Only objects of kind [`NetworkObject::MAC_KIND`] can back a VM's network
/// attachment; their entries are MAC address strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkObject {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub entries: Vec<String>,
}

impl NetworkObject {
    pub const MAC_KIND: &'static str = "Mac";

    pub fn is_mac(&self) -> bool {
        self.kind == Self::MAC_KIND
    }

    /// The first resolved value, if any.
    pub fn first_entry(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }
}
