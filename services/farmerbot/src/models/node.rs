//! Node record, power state machine and resource claims.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use farmerbot_id::{FarmId, NodeId, TwinId};
use farmerbot_reconcile::{check_transition, ClaimCountdown, ReconcileError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::capacity::{Capacity, ConsumableResources, NodeStatistics};
use crate::chain::ChainClient;
use crate::error::{FarmerbotError, FarmerbotResult};

/// Power state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    #[default]
    On,
    Off,
    WakingUp,
    ShuttingDown,
}

impl PowerState {
    /// True while a power command is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::WakingUp | Self::ShuttingDown)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::On => "on",
            Self::Off => "off",
            Self::WakingUp => "waking up",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(s)
    }
}

/// A node in the farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    /// Address of the node's agent.
    #[serde(rename = "twinID")]
    pub twin_id: TwinId,

    #[serde(rename = "farmID", default, skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<FarmId>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub certified: bool,

    /// Dedicated nodes are only ever handed out whole.
    #[serde(default)]
    pub dedicated: bool,

    /// Nodes with a public config serve as network access nodes.
    #[serde(default)]
    pub public_config: bool,

    #[serde(rename = "publicIPsUsed", default)]
    pub public_ips_used: u64,

    #[serde(default)]
    pub wg_ports: BTreeSet<u16>,

    pub resources: ConsumableResources,

    #[serde(default)]
    pub power_state: PowerState,

    #[serde(default)]
    pub timeout_claimed_resources: ClaimCountdown,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_time_power_state_changed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_time_awake: Option<DateTime<Utc>>,

    #[serde(default)]
    pub has_active_rent_contract: bool,
}

/// What `request_power` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerRequest {
    /// The node is already on (or off) or heading there.
    AlreadySatisfied,
    /// A power command was accepted by the chain.
    Issued,
}

/// A reconciliation anomaly: the node did not do what we expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// The node never came up; it is considered off again.
    WakeupTimedOut { node_id: NodeId, elapsed_secs: u64 },
    /// The node never went down; it is considered on again.
    ShutdownTimedOut { node_id: NodeId, elapsed_secs: u64 },
    /// The node stopped answering while it was supposed to be on.
    UnexpectedlyOffline { node_id: NodeId },
}

/// Result of interpreting one liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingOutcome {
    /// The node is confirmed on and its statistics should be refreshed.
    pub refresh: bool,
    /// The record changed and must be written back.
    pub changed: bool,
    pub anomaly: Option<Anomaly>,
}

impl Node {
    pub fn new(id: NodeId, twin_id: TwinId, total: Capacity) -> Self {
        Self {
            id,
            twin_id,
            farm_id: None,
            description: String::new(),
            certified: false,
            dedicated: false,
            public_config: false,
            public_ips_used: 0,
            wg_ports: BTreeSet::new(),
            resources: ConsumableResources::new(total),
            power_state: PowerState::On,
            timeout_claimed_resources: ClaimCountdown::EXPIRED,
            last_time_power_state_changed: None,
            last_time_awake: None,
            has_active_rent_contract: false,
        }
    }

    /// True when nothing is running on the node.
    pub fn is_unused(&self) -> bool {
        self.resources.used.is_empty()
    }

    /// Whether `requested` fits in what is left on the node.
    pub fn can_claim(&self, requested: &Capacity) -> bool {
        requested.fits_within(&self.resources.free())
    }

    /// Provisionally reserve `requested`.
    ///
    /// No bound check happens here; callers must check `can_claim` first.
    /// The claim is trusted until the countdown expires and usage is read
    /// back from the node.
    pub fn claim(&mut self, requested: &Capacity) {
        self.resources.used.add(requested);
        self.timeout_claimed_resources.reset();
    }

    /// Overwrite capacity with an authoritative report from the node.
    pub fn update_resources(&mut self, stats: &NodeStatistics) {
        self.resources.total = stats.total;
        self.resources.used = stats.used;
        self.public_ips_used = stats.used.ipv4;
    }

    /// Ask the chain to power the node on or off.
    pub async fn request_power(
        &mut self,
        chain: &dyn ChainClient,
        want_on: bool,
        now: DateTime<Utc>,
    ) -> FarmerbotResult<PowerRequest> {
        match (want_on, self.power_state) {
            (true, PowerState::On | PowerState::WakingUp)
            | (false, PowerState::Off | PowerState::ShuttingDown) => {
                return Ok(PowerRequest::AlreadySatisfied);
            }
            (_, state) if state.is_transitioning() => {
                return Err(FarmerbotError::NodeBusy {
                    node_id: self.id,
                    state,
                });
            }
            _ => {}
        }

        chain
            .set_node_power_state(self.id, want_on)
            .await
            .map_err(|e| FarmerbotError::remote(format!("chain (power {})", self.id), e))?;

        self.power_state = if want_on {
            PowerState::WakingUp
        } else {
            PowerState::ShuttingDown
        };
        self.last_time_power_state_changed = Some(now);
        Ok(PowerRequest::Issued)
    }

    /// Apply the result of a liveness probe to the power state.
    ///
    /// `timeout` bounds how long a transition may stay unconfirmed. A
    /// transition with no recorded start counts as already timed out.
    pub fn observe_ping(
        &mut self,
        responded: bool,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> PingOutcome {
        let since = self
            .last_time_power_state_changed
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let timed_out =
            |node: &Node| check_transition(node.id.to_string(), since, now, timeout).err();

        if !responded {
            return match self.power_state {
                PowerState::Off => {
                    debug!(node_id = %self.id, "Node is offline");
                    PingOutcome::unchanged()
                }
                PowerState::WakingUp => match timed_out(self) {
                    None => {
                        debug!(node_id = %self.id, "Node is waking up");
                        PingOutcome::unchanged()
                    }
                    Some(ReconcileError::Timeout { elapsed, .. }) => {
                        warn!(
                            node_id = %self.id,
                            elapsed_secs = elapsed.as_secs(),
                            "Node wakeup was unsuccessful, putting its state back to off"
                        );
                        self.set_power_state(PowerState::Off, now);
                        PingOutcome::anomaly(Anomaly::WakeupTimedOut {
                            node_id: self.id,
                            elapsed_secs: elapsed.as_secs(),
                        })
                    }
                },
                PowerState::ShuttingDown => {
                    debug!(node_id = %self.id, "Node shutdown was successful");
                    self.set_power_state(PowerState::Off, now);
                    PingOutcome::changed()
                }
                PowerState::On => {
                    error!(node_id = %self.id, "Node is not responding while we expect it to");
                    self.set_power_state(PowerState::Off, now);
                    PingOutcome::anomaly(Anomaly::UnexpectedlyOffline { node_id: self.id })
                }
            };
        }

        let mut outcome = PingOutcome {
            refresh: true,
            changed: true,
            anomaly: None,
        };

        if self.power_state == PowerState::ShuttingDown {
            match timed_out(self) {
                None => {
                    debug!(node_id = %self.id, "Node is shutting down");
                    return PingOutcome::unchanged();
                }
                Some(ReconcileError::Timeout { elapsed, .. }) => {
                    warn!(
                        node_id = %self.id,
                        elapsed_secs = elapsed.as_secs(),
                        "Node shutdown was unsuccessful, putting its state back to on"
                    );
                    outcome.anomaly = Some(Anomaly::ShutdownTimedOut {
                        node_id: self.id,
                        elapsed_secs: elapsed.as_secs(),
                    });
                }
            }
        } else {
            debug!(node_id = %self.id, "Node is online");
        }

        self.set_power_state(PowerState::On, now);
        self.last_time_awake = Some(now);
        outcome
    }

    fn set_power_state(&mut self, state: PowerState, now: DateTime<Utc>) {
        if self.power_state != state {
            self.power_state = state;
            self.last_time_power_state_changed = Some(now);
        }
    }
}

impl PingOutcome {
    fn unchanged() -> Self {
        Self {
            refresh: false,
            changed: false,
            anomaly: None,
        }
    }

    fn changed() -> Self {
        Self {
            refresh: false,
            changed: true,
            anomaly: None,
        }
    }

    fn anomaly(anomaly: Anomaly) -> Self {
        Self {
            refresh: false,
            changed: true,
            anomaly: Some(anomaly),
        }
    }
}

/// Nodes that are off.
pub fn filter_off_nodes(nodes: &[Node]) -> Vec<&Node> {
    nodes
        .iter()
        .filter(|n| n.power_state == PowerState::Off)
        .collect()
}

/// Nodes that are on and carry no workload.
pub fn filter_unused_on_nodes(nodes: &[Node]) -> Vec<&Node> {
    nodes
        .iter()
        .filter(|n| n.power_state == PowerState::On && n.is_unused())
        .collect()
}

/// Nodes with a power command in flight.
pub fn filter_transitioning_nodes(nodes: &[Node]) -> Vec<&Node> {
    nodes
        .iter()
        .filter(|n| n.power_state.is_transitioning())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;
    use chrono::TimeZone;
    use farmerbot_reconcile::TIMEOUT_POWER_STATE_CHANGE;
    use proptest::prelude::*;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn node(state: PowerState) -> Node {
        let mut node = Node::new(
            NodeId::new(1).unwrap(),
            TwinId::new(11).unwrap(),
            Capacity::new(4, 4, 4, 4),
        );
        node.power_state = state;
        node
    }

    #[tokio::test]
    async fn test_request_power_noop_when_already_there() {
        let chain = MockChain::new();
        let mut n = node(PowerState::On);
        assert_eq!(
            n.request_power(&chain, true, now()).await.unwrap(),
            PowerRequest::AlreadySatisfied
        );

        n.power_state = PowerState::Off;
        assert_eq!(
            n.request_power(&chain, false, now()).await.unwrap(),
            PowerRequest::AlreadySatisfied
        );
        assert_eq!(chain.power_calls().len(), 0);
    }

    #[tokio::test]
    async fn test_request_power_on_from_off() {
        let chain = MockChain::new();
        let mut n = node(PowerState::Off);

        let result = n.request_power(&chain, true, now()).await.unwrap();
        assert_eq!(result, PowerRequest::Issued);
        assert_eq!(n.power_state, PowerState::WakingUp);
        assert_eq!(n.last_time_power_state_changed, Some(now()));

        // Second request is absorbed by the in-flight transition.
        let result = n.request_power(&chain, true, now()).await.unwrap();
        assert_eq!(result, PowerRequest::AlreadySatisfied);
        assert_eq!(chain.power_calls(), vec![(n.id, true)]);
    }

    #[tokio::test]
    async fn test_request_power_opposite_direction_is_busy() {
        let chain = MockChain::new();

        let mut n = node(PowerState::WakingUp);
        let err = n.request_power(&chain, false, now()).await.unwrap_err();
        assert!(matches!(err, FarmerbotError::NodeBusy { state: PowerState::WakingUp, .. }));

        let mut n = node(PowerState::ShuttingDown);
        let err = n.request_power(&chain, true, now()).await.unwrap_err();
        assert!(matches!(err, FarmerbotError::NodeBusy { state: PowerState::ShuttingDown, .. }));

        assert!(chain.power_calls().is_empty());
    }

    #[tokio::test]
    async fn test_request_power_chain_failure_leaves_state() {
        let chain = MockChain::new();
        chain.fail_power_calls(true);
        let mut n = node(PowerState::On);

        let err = n.request_power(&chain, false, now()).await.unwrap_err();
        assert!(matches!(err, FarmerbotError::RemoteUnavailable { .. }));
        assert_eq!(n.power_state, PowerState::On);
        assert_eq!(n.last_time_power_state_changed, None);
    }

    #[test]
    fn test_claims() {
        let mut n = node(PowerState::On);
        let total = n.resources.total;

        assert!(n.is_unused());
        assert!(n.can_claim(&total));

        n.claim(&total);
        assert!(!n.is_unused());
        assert!(!n.can_claim(&total));
        assert!(!n.can_claim(&Capacity::new(1, 0, 0, 0)));
        assert!(n.can_claim(&Capacity::default()));
        assert!(!n.timeout_claimed_resources.is_due());
    }

    #[test]
    fn test_over_provisioned_compute() {
        let mut n = node(PowerState::On);
        n.resources.over_provision_cpu = 2.0;
        assert!(n.can_claim(&Capacity::new(8, 1, 1, 1)));
        assert!(!n.can_claim(&Capacity::new(9, 1, 1, 1)));
        // Only compute is over-provisioned.
        assert!(!n.can_claim(&Capacity::new(1, 5, 1, 1)));
    }

    #[test]
    fn test_update_resources() {
        let mut n = node(PowerState::On);
        n.claim(&Capacity::new(1, 1, 1, 1));
        let mut used = Capacity::new(2, 2, 2, 2);
        used.ipv4 = 2;
        n.update_resources(&NodeStatistics {
            total: Capacity::new(8, 8, 8, 8),
            used,
        });
        assert_eq!(n.resources.total, Capacity::new(8, 8, 8, 8));
        assert_eq!(n.resources.used.cru, 2);
        assert_eq!(n.public_ips_used, 2);
    }

    #[rstest]
    #[case::off_stays_off(PowerState::Off, false, 0, PowerState::Off, false, false)]
    #[case::waking_within_timeout(PowerState::WakingUp, false, 10, PowerState::WakingUp, false, false)]
    #[case::waking_timed_out(PowerState::WakingUp, false, 31, PowerState::Off, false, true)]
    #[case::shutdown_confirmed(PowerState::ShuttingDown, false, 5, PowerState::Off, false, false)]
    #[case::on_went_dark(PowerState::On, false, 0, PowerState::Off, false, true)]
    #[case::on_answers(PowerState::On, true, 0, PowerState::On, true, false)]
    #[case::off_came_back(PowerState::Off, true, 0, PowerState::On, true, false)]
    #[case::wakeup_confirmed(PowerState::WakingUp, true, 3, PowerState::On, true, false)]
    #[case::shutting_down_within_timeout(PowerState::ShuttingDown, true, 10, PowerState::ShuttingDown, false, false)]
    #[case::shutdown_timed_out(PowerState::ShuttingDown, true, 45, PowerState::On, true, true)]
    fn test_observe_ping(
        #[case] start: PowerState,
        #[case] responded: bool,
        #[case] minutes_since_change: i64,
        #[case] expected: PowerState,
        #[case] refresh: bool,
        #[case] anomaly: bool,
    ) {
        let mut n = node(start);
        n.last_time_power_state_changed = Some(now() - chrono::Duration::minutes(minutes_since_change));

        let outcome = n.observe_ping(responded, now(), TIMEOUT_POWER_STATE_CHANGE);

        assert_eq!(n.power_state, expected);
        assert_eq!(outcome.refresh, refresh);
        assert_eq!(outcome.anomaly.is_some(), anomaly);
        if refresh {
            assert_eq!(n.last_time_awake, Some(now()));
        }
    }

    #[rstest]
    #[case::waking_without_timestamp(PowerState::WakingUp, false, PowerState::Off)]
    #[case::shutting_down_without_timestamp(PowerState::ShuttingDown, true, PowerState::On)]
    fn test_observe_ping_unstamped_transition_times_out(
        #[case] start: PowerState,
        #[case] responded: bool,
        #[case] expected: PowerState,
    ) {
        let mut n = node(start);
        n.last_time_power_state_changed = None;

        let outcome = n.observe_ping(responded, now(), TIMEOUT_POWER_STATE_CHANGE);

        assert_eq!(n.power_state, expected);
        assert!(outcome.anomaly.is_some());
        assert_eq!(n.last_time_power_state_changed, Some(now()));
    }

    #[test]
    fn test_observe_ping_stamps_only_real_transitions() {
        let earlier = now() - chrono::Duration::hours(5);
        let mut n = node(PowerState::On);
        n.last_time_power_state_changed = Some(earlier);

        n.observe_ping(true, now(), TIMEOUT_POWER_STATE_CHANGE);
        assert_eq!(n.last_time_power_state_changed, Some(earlier));

        n.observe_ping(false, now(), TIMEOUT_POWER_STATE_CHANGE);
        assert_eq!(n.last_time_power_state_changed, Some(now()));
    }

    #[test]
    fn test_node_json_shape() {
        let json = serde_json::json!({
            "id": 3,
            "twinID": 33,
            "publicConfig": true,
            "publicIPsUsed": 1,
            "resources": {"total": {"CRU": 1, "MRU": 1, "SRU": 1, "HRU": 1}},
            "powerState": "wakingUp"
        });
        let n: Node = serde_json::from_value(json).unwrap();
        assert_eq!(n.id.get(), 3);
        assert_eq!(n.twin_id.get(), 33);
        assert!(n.public_config);
        assert_eq!(n.power_state, PowerState::WakingUp);
        assert!(n.timeout_claimed_resources.is_due());
    }

    #[test]
    fn test_filters() {
        let nodes = vec![
            node(PowerState::On),
            node(PowerState::Off),
            node(PowerState::WakingUp),
            node(PowerState::ShuttingDown),
        ];
        assert_eq!(filter_off_nodes(&nodes).len(), 1);
        assert_eq!(filter_unused_on_nodes(&nodes).len(), 1);
        assert_eq!(filter_transitioning_nodes(&nodes).len(), 2);
    }

    fn capacity() -> impl Strategy<Value = Capacity> {
        (0u64..64, 0u64..64, 0u64..64, 0u64..64).prop_map(|(c, m, s, h)| Capacity::new(c, m, s, h))
    }

    proptest! {
        #[test]
        fn prop_can_claim_never_exceeds_free(
            total in capacity(),
            used in capacity(),
            requested in capacity(),
            factor in 1.0f64..=4.0,
        ) {
            let mut n = node(PowerState::On);
            n.resources.total = total;
            n.resources.used = used;
            n.resources.over_provision_cpu = factor;

            let effective_cru = (total.cru as f64 * factor).ceil() as u64;
            let exceeds = requested.cru > effective_cru.saturating_sub(used.cru)
                || requested.mru > total.mru.saturating_sub(used.mru)
                || requested.sru > total.sru.saturating_sub(used.sru)
                || requested.hru > total.hru.saturating_sub(used.hru);

            prop_assert_eq!(n.can_claim(&requested), !exceeds);
        }
    }
}
