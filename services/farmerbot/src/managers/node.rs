//! Node definitions and allocation.

use std::collections::BTreeSet;

use farmerbot_id::NodeId;
use tracing::{debug, info, instrument, warn, Span};

use super::Fleet;
use crate::error::{FarmerbotError, FarmerbotResult};
use crate::models::{Node, NodeOptions, PowerState};

/// Defines nodes and hands them out to workloads.
#[derive(Clone)]
pub struct NodeManager {
    fleet: Fleet,
    span: Span,
}

impl NodeManager {
    pub fn new(fleet: Fleet, span: Span) -> Self {
        Self { fleet, span }
    }

    /// Store (or replace) a node definition.
    #[instrument(parent = &self.span, skip_all, fields(node_id = %node.id))]
    pub async fn define(&self, node: Node) -> FarmerbotResult<Node> {
        let _gate = self.fleet.gate.lock().await;
        self.fleet.store.update_node(&node).await?;
        info!(twin_id = %node.twin_id, dedicated = node.dedicated, "Node defined");
        Ok(node)
    }

    pub async fn get_node(&self, id: NodeId) -> FarmerbotResult<Node> {
        Ok(self.fleet.store.get_node(id).await?)
    }

    pub async fn list_nodes(&self) -> FarmerbotResult<Vec<Node>> {
        Ok(self.fleet.store.get_nodes().await?)
    }

    /// Pick a node for a workload, claim what it needs and wake it if it
    /// sleeps.
    ///
    /// The claim is stored even when the power-on fails; the next
    /// authoritative refresh of the node corrects it.
    #[instrument(
        parent = &self.span,
        skip_all,
        fields(
            dedicated = options.dedicated,
            public_ips = options.public_ips,
            excluded = exclude.len(),
        )
    )]
    pub async fn find_node(
        &self,
        options: &NodeOptions,
        exclude: &BTreeSet<NodeId>,
    ) -> FarmerbotResult<Node> {
        let _gate = self.fleet.gate.lock().await;

        let nodes = self.fleet.store.get_nodes().await?;
        let farm = self.fleet.store.get_farm().await?;

        if options.public_ips > 0 {
            let used: u64 = nodes.iter().map(|n| n.public_ips_used).sum();
            if used.saturating_add(options.public_ips) > farm.public_ips {
                warn!(used, total = farm.public_ips, "Public IP budget exhausted");
                return Err(FarmerbotError::InsufficientPublicIps {
                    farm_id: farm.id,
                    requested: options.public_ips,
                    used,
                    total: farm.public_ips,
                });
            }
        }

        let mut candidates: Vec<Node> = nodes
            .into_iter()
            .filter(|node| is_candidate(node, options, exclude))
            .collect();

        if candidates.is_empty() {
            return Err(FarmerbotError::NoSuitableNode);
        }

        // Nodes that are already on avoid a wake-up delay.
        candidates.sort_by_key(|n| n.power_state != PowerState::On);
        let mut node = candidates.swap_remove(0);
        debug!(node_id = %node.id, power_state = %node.power_state, "Found a node");

        let claim = if options.dedicated {
            node.resources.total
        } else {
            options.capacity
        };
        node.claim(&claim);
        node.public_ips_used = node.public_ips_used.saturating_add(options.public_ips);

        let now = self.fleet.clock.now();
        let powered = node.request_power(self.fleet.chain.as_ref(), true, now).await;
        self.fleet.store.update_node(&node).await?;
        let outcome = powered?;

        info!(node_id = %node.id, ?outcome, "Node allocated");
        Ok(node)
    }
}

fn is_candidate(node: &Node, options: &NodeOptions, exclude: &BTreeSet<NodeId>) -> bool {
    if options.certified && !node.certified {
        return false;
    }
    if options.public_config && !node.public_config {
        return false;
    }
    if node.has_active_rent_contract {
        return false;
    }
    if options.dedicated && (!node.dedicated || !node.is_unused()) {
        return false;
    }
    // Dedicated nodes are only shared when the request would take all of it.
    if !options.dedicated && node.dedicated && options.capacity != node.resources.total {
        return false;
    }
    if exclude.contains(&node.id) {
        return false;
    }
    node.can_claim(&options.capacity)
}
