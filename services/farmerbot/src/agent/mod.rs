//! Node agent boundary.
//!
//! Each node runs an agent addressed by its twin. The bot asks it whether it
//! is alive, what it has in use, whether it carries a public network config
//! and which WireGuard ports are taken.

mod client;
mod mock;
mod twins;

pub use client::RmbNodeAgent;
pub use mock::MockNodeAgent;
pub use twins::{TwinCache, TwinDirectory, TwinEndpoint};

use async_trait::async_trait;
use farmerbot_id::TwinId;
use thiserror::Error;

use crate::models::NodeStatistics;

/// Node agent call errors.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("agent returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The agent answered with an error envelope.
    #[error("{cmd} failed: {message}")]
    Remote { cmd: String, message: String },

    #[error("{cmd} returned no data")]
    EmptyResponse { cmd: String },

    #[error("could not resolve {twin_id}: {message}")]
    Resolve { twin_id: TwinId, message: String },

    #[error("{twin_id} is unreachable")]
    Unreachable { twin_id: TwinId },
}

/// Calls the bot makes on a node agent.
#[async_trait]
pub trait NodeAgent: Send + Sync {
    /// Liveness probe. Any error means the node did not answer.
    async fn system_version(&self, twin: TwinId) -> Result<(), AgentError>;

    async fn statistics(&self, twin: TwinId) -> Result<NodeStatistics, AgentError>;

    /// Whether the node has a public network config and can act as an
    /// access node.
    async fn has_public_config(&self, twin: TwinId) -> Result<bool, AgentError>;

    /// WireGuard ports taken on the node.
    async fn list_wg_ports(&self, twin: TwinId) -> Result<Vec<u16>, AgentError>;
}
