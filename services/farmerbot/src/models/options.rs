use std::collections::BTreeSet;

use farmerbot_id::NodeId;
use serde::{Deserialize, Serialize};

use super::capacity::Capacity;

/// Constraints of an allocation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOptions {
    #[serde(default)]
    pub certified: bool,

    /// Hand out a whole dedicated node.
    #[serde(default)]
    pub dedicated: bool,

    #[serde(default)]
    pub public_config: bool,

    #[serde(rename = "publicIPs", default)]
    pub public_ips: u64,

    #[serde(default)]
    pub capacity: Capacity,
}

/// Body of a find-node call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindNodeRequest {
    #[serde(flatten)]
    pub options: NodeOptions,

    /// Nodes the caller already tried.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude: BTreeSet<NodeId>,
}
