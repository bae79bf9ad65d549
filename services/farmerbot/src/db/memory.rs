use async_trait::async_trait;
use farmerbot_id::NodeId;
use tokio::sync::RwLock;

use super::{DbError, Store};
use crate::models::{Farm, Node, Power};

#[derive(Debug, Default)]
struct State {
    farm: Option<Farm>,
    power: Option<Power>,
    nodes: Vec<Node>,
}

/// In-process store. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_farm(&self) -> Result<Farm, DbError> {
        self.state
            .read()
            .await
            .farm
            .clone()
            .ok_or_else(|| DbError::not_found("farm", "definition"))
    }

    async fn set_farm(&self, farm: &Farm) -> Result<(), DbError> {
        self.state.write().await.farm = Some(farm.clone());
        Ok(())
    }

    async fn get_power(&self) -> Result<Power, DbError> {
        Ok(self.state.read().await.power.unwrap_or_default())
    }

    async fn set_power(&self, power: &Power) -> Result<(), DbError> {
        self.state.write().await.power = Some(*power);
        Ok(())
    }

    async fn get_node(&self, id: NodeId) -> Result<Node, DbError> {
        self.state
            .read()
            .await
            .nodes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| DbError::not_found("node", id))
    }

    async fn get_nodes(&self) -> Result<Vec<Node>, DbError> {
        Ok(self.state.read().await.nodes.clone())
    }

    async fn update_node(&self, node: &Node) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        match state.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node.clone(),
            None => state.nodes.push(node.clone()),
        }
        Ok(())
    }

    async fn set_nodes(&self, nodes: &[Node]) -> Result<(), DbError> {
        self.state.write().await.nodes = nodes.to_vec();
        Ok(())
    }
}
