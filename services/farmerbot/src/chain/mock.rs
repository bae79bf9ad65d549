//! In-memory chain for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use farmerbot_id::{NodeId, TwinId};
use tracing::info;

use super::{ChainClient, ChainError, TxHash};
use crate::agent::{AgentError, TwinDirectory, TwinEndpoint};

#[derive(Debug, Default)]
struct State {
    power_calls: Vec<(NodeId, bool)>,
    fail_power_calls: bool,
    rent_contracts: HashMap<NodeId, u64>,
}

/// Records power calls and serves rent contracts and twins from memory.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<State>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Power calls accepted so far, in order.
    pub fn power_calls(&self) -> Vec<(NodeId, bool)> {
        self.state().power_calls.clone()
    }

    /// Make every power call fail.
    pub fn fail_power_calls(&self, fail: bool) {
        self.state().fail_power_calls = fail;
    }

    pub fn set_rent_contract(&self, node: NodeId, contract_id: u64) {
        self.state().rent_contracts.insert(node, contract_id);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn set_node_power_state(&self, node: NodeId, on: bool) -> Result<TxHash, ChainError> {
        let mut state = self.state();
        if state.fail_power_calls {
            return Err(ChainError::Rpc {
                method: "setNodePowerState".to_string(),
                code: -32000,
                message: "mock chain configured to fail".to_string(),
            });
        }
        info!(node_id = %node, on, "[MOCK] Setting node power state");
        state.power_calls.push((node, on));
        Ok(TxHash(format!("0x{:064x}", state.power_calls.len())))
    }

    async fn get_node_rent_contract(&self, node: NodeId) -> Result<u64, ChainError> {
        Ok(self.state().rent_contracts.get(&node).copied().unwrap_or(0))
    }

    async fn get_twin(&self, twin: TwinId) -> Result<TwinEndpoint, ChainError> {
        Ok(TwinEndpoint {
            twin_id: twin,
            relay_url: format!("http://relay.invalid/{}", twin.get()),
            public_key: None,
        })
    }
}

#[async_trait]
impl TwinDirectory for MockChain {
    async fn resolve_twin(&self, twin: TwinId) -> Result<TwinEndpoint, AgentError> {
        self.get_twin(twin).await.map_err(|e| AgentError::Resolve {
            twin_id: twin,
            message: e.to_string(),
        })
    }
}
