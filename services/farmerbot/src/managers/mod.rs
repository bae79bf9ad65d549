//! Farm, node and power managers.
//!
//! Managers are the only writers of farm state besides the reconciliation
//! worker. Every read-modify-write of store records happens while holding
//! the [`FleetGate`], so allocations, operator power commands, the power
//! routines and the worker's write-back never interleave.

mod farm;
mod node;
mod power;

pub use farm::FarmManager;
pub use node::NodeManager;
pub use power::{PowerDecision, PowerManager, WakeupOutcome};

use std::sync::Arc;

use farmerbot_reconcile::Clock;
use tokio::sync::{Mutex, MutexGuard};

use crate::chain::ChainClient;
use crate::db::Store;

/// Serializes writers of farm state.
#[derive(Clone, Default)]
pub struct FleetGate(Arc<Mutex<()>>);

impl FleetGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Collaborators shared by the managers and the worker.
#[derive(Clone)]
pub struct Fleet {
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn ChainClient>,
    pub clock: Arc<dyn Clock>,
    pub gate: FleetGate,
}

impl Fleet {
    pub fn new(store: Arc<dyn Store>, chain: Arc<dyn ChainClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            chain,
            clock,
            gate: FleetGate::new(),
        }
    }
}
