//! Power policy and the two power routines.

use chrono::{DateTime, Utc};
use farmerbot_id::NodeId;
use farmerbot_reconcile::usage_percent;
use serde::Serialize;
use tracing::{debug, info, instrument, Span};

use super::Fleet;
use crate::document::normalize_power;
use crate::error::{FarmerbotError, FarmerbotResult};
use crate::models::{
    filter_off_nodes, filter_transitioning_nodes, filter_unused_on_nodes, Node, Power,
    PowerState, PowerStatus,
};

/// What the daily wake-up did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WakeupOutcome {
    /// Today's wake-up time has not been reached.
    NotYetDue { scheduled_at: DateTime<Utc> },
    /// Every sleeping node has been awake since the wake-up time.
    NothingToWake,
    Woke { node_id: NodeId },
}

/// What a power management round decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PowerDecision {
    /// A transition is still in flight; nothing was decided.
    Deferred { transitioning: Vec<NodeId> },
    /// No powered-on capacity to measure.
    NoCapacity,
    WokeUp { node_id: NodeId, usage_percent: u64 },
    /// Usage is high but every node is already on.
    AtCapacity { usage_percent: u64 },
    PoweredOff {
        node_ids: Vec<NodeId>,
        usage_percent: u64,
    },
}

/// Manages the power policy and node power.
#[derive(Clone)]
pub struct PowerManager {
    fleet: Fleet,
    span: Span,
}

impl PowerManager {
    pub fn new(fleet: Fleet, span: Span) -> Self {
        Self { fleet, span }
    }

    /// Store the power policy, clamping the threshold into range.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn configure(&self, power: Power) -> FarmerbotResult<Power> {
        let power = normalize_power(power);
        let _gate = self.fleet.gate.lock().await;
        self.fleet.store.set_power(&power).await?;
        info!(
            wake_up_threshold = power.wake_up_threshold,
            periodic_wake_up = %power.periodic_wake_up,
            "Power configured"
        );
        Ok(power)
    }

    pub async fn get_power(&self) -> FarmerbotResult<PowerStatus> {
        let power = self.fleet.store.get_power().await?;
        Ok(power.status(self.fleet.clock.now()))
    }

    #[instrument(parent = &self.span, skip(self))]
    pub async fn power_on(&self, node_id: NodeId) -> FarmerbotResult<Node> {
        let _gate = self.fleet.gate.lock().await;
        self.power_on_locked(node_id).await
    }

    /// Power a node off. Refused when it would leave fewer than one node on.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn power_off(&self, node_id: NodeId) -> FarmerbotResult<Node> {
        let _gate = self.fleet.gate.lock().await;
        self.power_off_locked(node_id).await
    }

    /// Wake one sleeping node once its daily wake-up time has passed.
    ///
    /// Only one node is woken per call; the others follow on later rounds.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn periodic_wakeup(&self) -> FarmerbotResult<WakeupOutcome> {
        let _gate = self.fleet.gate.lock().await;

        let nodes = self.fleet.store.get_nodes().await?;
        let power = self.fleet.store.get_power().await?;

        let now = self.fleet.clock.now();
        let scheduled_at = power.periodic_wake_up.today(now);
        debug!(%scheduled_at, "Periodic wakeup time");

        if now < scheduled_at {
            return Ok(WakeupOutcome::NotYetDue { scheduled_at });
        }

        let sleeper = nodes.iter().find(|n| {
            n.power_state == PowerState::Off
                && n.last_time_awake.is_none_or(|awake| awake < scheduled_at)
        });

        match sleeper {
            Some(node) => {
                info!(node_id = %node.id, "Periodic wakeup");
                self.power_on_locked(node.id).await?;
                Ok(WakeupOutcome::Woke { node_id: node.id })
            }
            None => Ok(WakeupOutcome::NothingToWake),
        }
    }

    /// Balance powered-on capacity against farm usage.
    ///
    /// Wakes one node when usage reaches the threshold, otherwise powers off
    /// idle nodes as long as usage stays under it. At least one idle node
    /// without a public config is always left on, and nodes with a public
    /// config are never powered off. A failed power call aborts the round;
    /// nodes already switched stay switched.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn power_management(&self) -> FarmerbotResult<PowerDecision> {
        let _gate = self.fleet.gate.lock().await;

        let nodes = self.fleet.store.get_nodes().await?;
        let power = self.fleet.store.get_power().await?;

        let transitioning: Vec<NodeId> = filter_transitioning_nodes(&nodes)
            .iter()
            .map(|n| n.id)
            .collect();
        if !transitioning.is_empty() {
            debug!(?transitioning, "Waiting for power transitions to settle");
            return Ok(PowerDecision::Deferred { transitioning });
        }

        let (mut used, mut total) = nodes
            .iter()
            .filter(|n| n.power_state == PowerState::On)
            .fold((0u64, 0u64), |(used, total), n| {
                (
                    used.saturating_add(n.resources.used.sum()),
                    total.saturating_add(n.resources.total.sum()),
                )
            });

        let Some(usage) = usage_percent(used, total) else {
            return Ok(PowerDecision::NoCapacity);
        };

        if usage >= power.wake_up_threshold {
            return match filter_off_nodes(&nodes).first() {
                Some(node) => {
                    info!(
                        node_id = %node.id,
                        usage_percent = usage,
                        "Too much resource usage, turning on a node"
                    );
                    self.power_on_locked(node.id).await?;
                    Ok(PowerDecision::WokeUp {
                        node_id: node.id,
                        usage_percent: usage,
                    })
                }
                None => Ok(PowerDecision::AtCapacity {
                    usage_percent: usage,
                }),
            };
        }

        let unused = filter_unused_on_nodes(&nodes);
        let mut left_online = unused.iter().filter(|n| !n.public_config).count();
        let mut powered_off = Vec::new();

        for node in unused {
            if left_online <= 1 {
                break;
            }
            if node.public_config {
                continue;
            }

            let new_used = used.saturating_sub(node.resources.used.sum());
            let new_total = total.saturating_sub(node.resources.total.sum());
            let Some(projected) = usage_percent(new_used, new_total) else {
                break;
            };
            if projected >= power.wake_up_threshold {
                continue;
            }

            info!(
                node_id = %node.id,
                usage_percent = usage,
                projected_percent = projected,
                "Too low resource usage, turning off an unused node"
            );
            self.power_off_locked(node.id).await?;
            used = new_used;
            total = new_total;
            left_online -= 1;
            powered_off.push(node.id);
        }

        if powered_off.is_empty() {
            debug!(usage_percent = usage, "Nothing to shut down");
        }
        Ok(PowerDecision::PoweredOff {
            node_ids: powered_off,
            usage_percent: usage,
        })
    }

    async fn power_on_locked(&self, node_id: NodeId) -> FarmerbotResult<Node> {
        let mut node = self.fleet.store.get_node(node_id).await?;
        let outcome = node
            .request_power(self.fleet.chain.as_ref(), true, self.fleet.clock.now())
            .await?;
        self.fleet.store.update_node(&node).await?;
        info!(node_id = %node_id, ?outcome, "Power on");
        Ok(node)
    }

    async fn power_off_locked(&self, node_id: NodeId) -> FarmerbotResult<Node> {
        let on_nodes = self.fleet.store.filter_on_nodes().await?;
        if on_nodes.len() < 2 {
            return Err(FarmerbotError::LastOnlineNode { node_id });
        }

        let mut node = self.fleet.store.get_node(node_id).await?;
        let outcome = node
            .request_power(self.fleet.chain.as_ref(), false, self.fleet.clock.now())
            .await?;
        self.fleet.store.update_node(&node).await?;
        info!(node_id = %node_id, ?outcome, "Power off");
        Ok(node)
    }
}
