//! Shared harness for farmerbot integration tests.
//!
//! Everything runs in process: a memory store, a mock chain, mock node
//! agents and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use farmerbot::{
    agent::MockNodeAgent,
    chain::MockChain,
    db::{MemoryStore, Store},
    managers::{FarmManager, Fleet, NodeManager, PowerManager},
    models::{Capacity, Farm, Node, NodeStatistics, Power, PowerState, WakeupTime},
    scheduler::{NodeRefresher, ReconcileWorker},
};
use farmerbot_id::{FarmId, NodeId, TwinId};
use farmerbot_reconcile::{Clock, ManualClock, DEFAULT_RECONCILE_INTERVAL};
use tracing::Span;

/// 2024-03-01 12:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn node_id(id: u32) -> NodeId {
    NodeId::new(id).unwrap()
}

/// Twin addressing node `id`.
pub fn twin_id(id: u32) -> TwinId {
    TwinId::new(id + 100).unwrap()
}

pub fn node(id: u32, total: Capacity) -> Node {
    Node::new(node_id(id), twin_id(id), total)
}

pub fn small() -> Capacity {
    Capacity::new(4, 4, 4, 4)
}

pub fn off(mut node: Node) -> Node {
    node.power_state = PowerState::Off;
    node
}

/// A wake-up time that never fires during a test day starting at noon.
pub fn late_wakeup() -> Power {
    Power {
        wake_up_threshold: 80,
        periodic_wake_up: WakeupTime::parse("11:59PM").unwrap(),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,farmerbot=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<MockChain>,
    pub agent: Arc<MockNodeAgent>,
    pub clock: Arc<ManualClock>,
    pub fleet: Fleet,
    pub farms: FarmManager,
    pub nodes: NodeManager,
    pub power: PowerManager,
}

impl Harness {
    /// A farm with `public_ips` addresses and the given nodes, power
    /// policy [`late_wakeup`], clock at [`start`].
    pub async fn new(public_ips: u64, nodes: Vec<Node>) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let mut farm = Farm::new(FarmId::new(1).unwrap());
        farm.public_ips = public_ips;
        store.set_farm(&farm).await.unwrap();
        store.set_nodes(&nodes).await.unwrap();
        store.set_power(&late_wakeup()).await.unwrap();

        let chain = Arc::new(MockChain::new());
        let agent = Arc::new(MockNodeAgent::new());
        let clock = Arc::new(ManualClock::new(start()));
        let fleet = Fleet::new(store.clone(), chain.clone(), clock.clone());

        Self {
            farms: FarmManager::new(fleet.clone(), Span::none()),
            nodes: NodeManager::new(fleet.clone(), Span::none()),
            power: PowerManager::new(fleet.clone(), Span::none()),
            store,
            chain,
            agent,
            clock,
            fleet,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Make node `id` answer probes, reporting `stats`.
    pub fn online(&self, id: u32, stats: NodeStatistics) {
        self.agent.set_online(twin_id(id), true);
        self.agent.set_statistics(twin_id(id), stats);
    }

    pub fn offline(&self, id: u32) {
        self.agent.set_online(twin_id(id), false);
    }

    pub fn refresher(&self) -> NodeRefresher {
        NodeRefresher::new(self.fleet.clone(), self.agent.clone(), Span::none())
    }

    pub fn worker(&self) -> ReconcileWorker {
        ReconcileWorker::new(
            self.refresher(),
            self.power.clone(),
            DEFAULT_RECONCILE_INTERVAL,
            Span::none(),
        )
    }

    pub async fn stored(&self, id: u32) -> Node {
        self.store.get_node(node_id(id)).await.unwrap()
    }

    pub async fn set_node(&self, node: &Node) {
        self.store.update_node(node).await.unwrap();
    }
}
