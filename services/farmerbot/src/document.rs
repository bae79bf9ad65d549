//! Configuration document parsing and validation.
//!
//! The document is JSON shaped `{farm, nodes, power}`. The same rules apply
//! whether it is loaded at startup or sent piecewise through the API:
//!
//! - the farm id is required
//! - a node needs its id, its twin id and all four total resource dimensions
//! - `overProvisionCPU` defaults to 1 and must lie in [1, 4]
//! - defined nodes start powered on
//! - the wake-up threshold defaults to 80 and is clamped into [50, 80]

use farmerbot_id::{FarmId, IdError, NodeId, TwinId};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::models::{
    Capacity, ConsumableResources, Farm, FindNodeRequest, Node, NodeOptions, Power,
    MAX_WAKE_UP_THRESHOLD, MIN_WAKE_UP_THRESHOLD,
};

/// Lowest accepted compute over-provisioning factor.
pub const MIN_OVER_PROVISION_CPU: f64 = 1.0;

/// Highest accepted compute over-provisioning factor.
pub const MAX_OVER_PROVISION_CPU: f64 = 4.0;

/// Document validation errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} is required for {entity}")]
    Required { entity: String, field: &'static str },

    #[error("overProvisionCPU of {entity} should be a value between 1 and 4 not {value}")]
    OverProvisionCpu { entity: String, value: f64 },

    #[error("invalid id for {entity}: {source}")]
    InvalidId {
        entity: String,
        #[source]
        source: IdError,
    },
}

/// A whole configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmerbotConfig {
    pub farm: Farm,
    pub nodes: Vec<Node>,
    pub power: Power,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    farm: RawFarm,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    power: Power,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFarm {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    description: String,
    #[serde(rename = "publicIPs", default)]
    public_ips: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    id: u32,
    #[serde(rename = "twinID", default)]
    twin_id: u32,
    #[serde(rename = "farmID", default)]
    farm_id: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    certified: bool,
    #[serde(default)]
    dedicated: bool,
    #[serde(default)]
    public_config: bool,
    #[serde(default)]
    resources: RawResources,
}

#[derive(Debug, Default, Deserialize)]
struct RawResources {
    #[serde(rename = "overProvisionCPU", alias = "OverProvisionCPU", default)]
    over_provision_cpu: f64,
    #[serde(default)]
    total: Capacity,
}

/// Parse and validate a whole document.
pub fn parse_config(content: &[u8]) -> Result<FarmerbotConfig, DocumentError> {
    let raw: RawConfig = serde_json::from_slice(content)?;

    let farm = validate_farm(raw.farm)?;
    let nodes = raw
        .nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| {
            let entity = format!("node with index {index}");
            validate_node(node, entity, Some(farm.id))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let power = normalize_power(raw.power);

    Ok(FarmerbotConfig { farm, nodes, power })
}

/// Parse a farm definition.
pub fn parse_farm(content: &[u8]) -> Result<Farm, DocumentError> {
    validate_farm(serde_json::from_slice(content)?)
}

/// Parse a node definition.
pub fn parse_node(content: &[u8]) -> Result<Node, DocumentError> {
    let raw: RawNode = serde_json::from_slice(content)?;
    let entity = format!("node {}", raw.id);
    validate_node(raw, entity, None)
}

/// Parse a power policy, applying the default and clamping the threshold.
pub fn parse_power(content: &[u8]) -> Result<Power, DocumentError> {
    Ok(normalize_power(serde_json::from_slice(content)?))
}

pub fn parse_node_options(content: &[u8]) -> Result<NodeOptions, DocumentError> {
    Ok(serde_json::from_slice(content)?)
}

pub fn parse_find_node_request(content: &[u8]) -> Result<FindNodeRequest, DocumentError> {
    Ok(serde_json::from_slice(content)?)
}

/// Apply the default threshold and clamp it into range.
pub fn normalize_power(power: Power) -> Power {
    let requested = power.wake_up_threshold;
    let (power, out_of_range) = power.normalized();
    if out_of_range {
        warn!(
            requested,
            applied = power.wake_up_threshold,
            "wakeUpThreshold should be in the range [{MIN_WAKE_UP_THRESHOLD}, {MAX_WAKE_UP_THRESHOLD}]"
        );
    }
    power
}

fn validate_farm(raw: RawFarm) -> Result<Farm, DocumentError> {
    let id = required_id(raw.id, "farm", "farm ID")?;
    Ok(Farm {
        id,
        description: raw.description,
        public_ips: raw.public_ips,
    })
}

fn validate_node(
    raw: RawNode,
    entity: String,
    farm_id: Option<FarmId>,
) -> Result<Node, DocumentError> {
    let id: NodeId = required_id(raw.id, &entity, "node ID")?;
    let twin_id: TwinId = required_id(raw.twin_id, &entity, "twin ID")?;
    let farm_id = match raw.farm_id {
        0 => farm_id,
        n => Some(FarmId::new(n).map_err(|source| DocumentError::InvalidId {
            entity: entity.clone(),
            source,
        })?),
    };

    let total = raw.resources.total;
    for (field, value) in [
        ("total SRU", total.sru),
        ("total CRU", total.cru),
        ("total MRU", total.mru),
        ("total HRU", total.hru),
    ] {
        if value == 0 {
            return Err(DocumentError::Required { entity, field });
        }
    }

    let over_provision_cpu = match raw.resources.over_provision_cpu {
        v if v == 0.0 => MIN_OVER_PROVISION_CPU,
        v if (MIN_OVER_PROVISION_CPU..=MAX_OVER_PROVISION_CPU).contains(&v) => v,
        value => return Err(DocumentError::OverProvisionCpu { entity, value }),
    };

    let mut node = Node::new(id, twin_id, total);
    node.farm_id = farm_id;
    node.description = raw.description;
    node.certified = raw.certified;
    node.dedicated = raw.dedicated;
    node.public_config = raw.public_config;
    node.resources = ConsumableResources {
        over_provision_cpu,
        total,
        used: Capacity::default(),
    };
    Ok(node)
}

fn required_id<T>(value: u32, entity: &str, field: &'static str) -> Result<T, DocumentError>
where
    T: TryFrom<u32, Error = IdError>,
{
    T::try_from(value).map_err(|_| DocumentError::Required {
        entity: entity.to_string(),
        field,
    })
}
