use farmerbot_id::FarmId;
use serde::{Deserialize, Serialize};

/// The farm the bot manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    pub id: FarmId,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Public IPv4 addresses the farm can hand out across all nodes.
    #[serde(rename = "publicIPs", default)]
    pub public_ips: u64,
}

impl Farm {
    pub fn new(id: FarmId) -> Self {
        Self {
            id,
            description: String::new(),
            public_ips: 0,
        }
    }
}
