//! Domain model: capacity, nodes, the farm and its power policy.

mod capacity;
mod farm;
mod node;
mod options;
mod power;

pub use capacity::{Capacity, ConsumableResources, NodeStatistics};
pub use farm::Farm;
pub use node::{
    filter_off_nodes, filter_transitioning_nodes, filter_unused_on_nodes, Anomaly, Node,
    PingOutcome, PowerRequest, PowerState,
};
pub use options::{FindNodeRequest, NodeOptions};
pub use power::{
    Power, PowerStatus, WakeupTime, DEFAULT_WAKE_UP_THRESHOLD, MAX_WAKE_UP_THRESHOLD,
    MIN_WAKE_UP_THRESHOLD,
};
