//! Node liveness and statistics refresh.
//!
//! A refresh pass has two phases. First every node is probed concurrently
//! without holding any lock. Then, under the fleet gate, each node is
//! re-read from the store and the observation is applied to that fresh
//! record, so claims made by allocations during the probe are kept.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use farmerbot_id::NodeId;
use farmerbot_reconcile::TIMEOUT_POWER_STATE_CHANGE;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, instrument, warn, Span};

use crate::agent::{AgentError, NodeAgent};
use crate::chain::ChainError;
use crate::error::{FarmerbotError, FarmerbotResult};
use crate::managers::Fleet;
use crate::models::{Anomaly, Node, NodeStatistics};

/// Default number of nodes probed at once.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 8;

/// What the agent and the chain said about one node.
#[derive(Debug)]
struct Observation {
    node_id: NodeId,
    responded: bool,
    statistics: Option<Result<NodeStatistics, AgentError>>,
    rent_contract: Option<Result<u64, ChainError>>,
    public_config: Option<Result<bool, AgentError>>,
    wg_ports: Option<Result<Vec<u16>, AgentError>>,
}

/// Result of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub checked: usize,
    pub responded: usize,
    pub refreshed: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Probes nodes and writes back what it learns.
pub struct NodeRefresher {
    fleet: Fleet,
    agent: Arc<dyn NodeAgent>,
    concurrency: usize,
    transition_timeout: Duration,
    span: Span,
}

impl NodeRefresher {
    pub fn new(fleet: Fleet, agent: Arc<dyn NodeAgent>, span: Span) -> Self {
        Self {
            fleet,
            agent,
            concurrency: DEFAULT_REFRESH_CONCURRENCY,
            transition_timeout: TIMEOUT_POWER_STATE_CHANGE,
            span,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// How long a power transition may stay unconfirmed.
    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = timeout;
        self
    }

    /// Probe every node and apply the results.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn refresh_all(&self) -> FarmerbotResult<RefreshSummary> {
        let nodes = self.fleet.store.get_nodes().await?;

        let observations: Vec<Observation> = stream::iter(nodes)
            .map(|node| self.observe(node))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let _gate = self.fleet.gate.lock().await;
        let now = self.fleet.clock.now();
        let mut summary = RefreshSummary {
            checked: observations.len(),
            ..Default::default()
        };

        for observation in observations {
            let mut node = match self.fleet.store.get_node(observation.node_id).await {
                Ok(node) => node,
                Err(e) => match FarmerbotError::from(e) {
                    FarmerbotError::NotFound { .. } => {
                        warn!(node_id = %observation.node_id, "Node vanished during refresh");
                        continue;
                    }
                    other => return Err(other),
                },
            };

            if observation.responded {
                summary.responded += 1;
            }

            let refreshed = apply(&mut node, observation, now, self.transition_timeout);
            if refreshed.refresh {
                summary.refreshed += 1;
            }
            if let Some(anomaly) = refreshed.anomaly {
                summary.anomalies.push(anomaly);
            }
            if refreshed.changed || refreshed.refresh {
                self.fleet.store.update_node(&node).await?;
            }
        }

        debug!(
            checked = summary.checked,
            responded = summary.responded,
            refreshed = summary.refreshed,
            anomalies = summary.anomalies.len(),
            "Node refresh complete"
        );
        Ok(summary)
    }

    async fn observe(&self, node: Node) -> Observation {
        let twin = node.twin_id;
        let responded = match self.agent.system_version(twin).await {
            Ok(()) => true,
            Err(e) => {
                debug!(node_id = %node.id, error = %e, "Node did not answer");
                false
            }
        };

        let mut observation = Observation {
            node_id: node.id,
            responded,
            statistics: None,
            rent_contract: None,
            public_config: None,
            wg_ports: None,
        };
        if !responded {
            return observation;
        }

        if node.timeout_claimed_resources.is_due() {
            observation.statistics = Some(self.agent.statistics(twin).await);
        }
        let (rent_contract, public_config, wg_ports) = tokio::join!(
            self.fleet.chain.get_node_rent_contract(node.id),
            self.agent.has_public_config(twin),
            self.agent.list_wg_ports(twin),
        );
        observation.rent_contract = Some(rent_contract);
        observation.public_config = Some(public_config);
        observation.wg_ports = Some(wg_ports);
        observation
    }
}

struct Applied {
    refresh: bool,
    changed: bool,
    anomaly: Option<Anomaly>,
}

fn apply(node: &mut Node, observation: Observation, now: DateTime<Utc>, timeout: Duration) -> Applied {
    let outcome = node.observe_ping(observation.responded, now, timeout);
    let applied = Applied {
        refresh: outcome.refresh,
        changed: outcome.changed,
        anomaly: outcome.anomaly,
    };
    if !outcome.refresh {
        return applied;
    }

    if node.timeout_claimed_resources.tick() {
        match observation.statistics {
            Some(Ok(stats)) => node.update_resources(&stats),
            Some(Err(e)) => {
                warn!(node_id = %node.id, error = %e, "Failed to get node statistics");
            }
            None => {}
        }
    }

    match observation.rent_contract {
        Some(Ok(contract_id)) => node.has_active_rent_contract = contract_id != 0,
        Some(Err(e)) => warn!(node_id = %node.id, error = %e, "Failed to get rent contract"),
        None => {}
    }

    match observation.public_config {
        Some(Ok(public_config)) => node.public_config = public_config,
        Some(Err(e)) => warn!(node_id = %node.id, error = %e, "Failed to get public config"),
        None => {}
    }

    match observation.wg_ports {
        Some(Ok(ports)) => node.wg_ports = ports.into_iter().collect(),
        Some(Err(e)) => warn!(node_id = %node.id, error = %e, "Failed to list wireguard ports"),
        None => {}
    }

    debug!(node_id = %node.id, resources = ?node.resources, "Node refreshed");
    applied
}
