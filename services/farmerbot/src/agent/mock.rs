//! In-memory node agents for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use farmerbot_id::TwinId;
use tracing::debug;

use super::{AgentError, NodeAgent};
use crate::models::NodeStatistics;

#[derive(Debug, Clone, Default)]
struct MockNode {
    online: bool,
    statistics: NodeStatistics,
    public_config: bool,
    wg_ports: Vec<u16>,
    statistics_calls: usize,
    fail_statistics: bool,
}

/// Fake fleet of node agents. Unknown twins never answer.
#[derive(Debug, Default)]
pub struct MockNodeAgent {
    nodes: Mutex<HashMap<TwinId, MockNode>>,
}

impl MockNodeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_node<R>(&self, twin: TwinId, f: impl FnOnce(&mut MockNode) -> R) -> R {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        f(nodes.entry(twin).or_default())
    }

    /// Make the agent answer (or stop answering) liveness probes.
    pub fn set_online(&self, twin: TwinId, online: bool) {
        self.with_node(twin, |n| n.online = online);
    }

    pub fn set_statistics(&self, twin: TwinId, statistics: NodeStatistics) {
        self.with_node(twin, |n| n.statistics = statistics);
    }

    pub fn set_public_config(&self, twin: TwinId, public_config: bool) {
        self.with_node(twin, |n| n.public_config = public_config);
    }

    pub fn set_wg_ports(&self, twin: TwinId, ports: Vec<u16>) {
        self.with_node(twin, |n| n.wg_ports = ports);
    }

    /// Make statistics calls fail while liveness keeps working.
    pub fn fail_statistics(&self, twin: TwinId, fail: bool) {
        self.with_node(twin, |n| n.fail_statistics = fail);
    }

    /// Number of statistics calls served for `twin`.
    pub fn statistics_calls(&self, twin: TwinId) -> usize {
        self.with_node(twin, |n| n.statistics_calls)
    }

    fn online(&self, twin: TwinId) -> Result<MockNode, AgentError> {
        let node = self.with_node(twin, |n| n.clone());
        if node.online {
            Ok(node)
        } else {
            Err(AgentError::Unreachable { twin_id: twin })
        }
    }
}

#[async_trait]
impl NodeAgent for MockNodeAgent {
    async fn system_version(&self, twin: TwinId) -> Result<(), AgentError> {
        self.online(twin)?;
        debug!(twin_id = %twin, "[MOCK] system version");
        Ok(())
    }

    async fn statistics(&self, twin: TwinId) -> Result<NodeStatistics, AgentError> {
        let node = self.online(twin)?;
        self.with_node(twin, |n| n.statistics_calls += 1);
        if node.fail_statistics {
            return Err(AgentError::Remote {
                cmd: "zos.statistics.get".to_string(),
                message: "statistics unavailable".to_string(),
            });
        }
        Ok(node.statistics)
    }

    async fn has_public_config(&self, twin: TwinId) -> Result<bool, AgentError> {
        Ok(self.online(twin)?.public_config)
    }

    async fn list_wg_ports(&self, twin: TwinId) -> Result<Vec<u16>, AgentError> {
        Ok(self.online(twin)?.wg_ports)
    }
}
