//! Controller error taxonomy.

use std::time::Duration;

use farmerbot_id::{FarmId, NodeId};
use thiserror::Error;

use crate::agent::AgentError;
use crate::chain::ChainError;
use crate::db::DbError;
use crate::document::DocumentError;
use crate::models::PowerState;

/// Result alias for controller operations.
pub type FarmerbotResult<T> = Result<T, FarmerbotError>;

/// Suggested wait before retrying a request against a node mid-transition.
pub const NODE_BUSY_RETRY_AFTER: Duration = Duration::from_secs(5 * 60);

/// A failed call to a remote collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Errors surfaced by the managers and the reconciliation worker.
#[derive(Debug, Error)]
pub enum FarmerbotError {
    /// The request or configuration document is malformed.
    #[error("validation failed: {0}")]
    Validation(#[from] DocumentError),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// No node satisfies the allocation constraints.
    #[error("could not find a suitable node with the given options")]
    NoSuitableNode,

    #[error("no more public ips available for {farm_id}: requested {requested}, {used} of {total} in use")]
    InsufficientPublicIps {
        farm_id: FarmId,
        requested: u64,
        used: u64,
        total: u64,
    },

    /// A power command opposes a transition still in flight.
    #[error("{node_id} is {state}, try again once the transition settles")]
    NodeBusy { node_id: NodeId, state: PowerState },

    #[error("cannot power off {node_id}, at least one node should be on in the farm")]
    LastOnlineNode { node_id: NodeId },

    #[error("{target} unavailable: {source}")]
    RemoteUnavailable {
        target: String,
        #[source]
        source: RemoteError,
    },

    #[error("storage failure: {0}")]
    Storage(#[source] DbError),
}

impl FarmerbotError {
    pub fn remote(target: impl Into<String>, source: impl Into<RemoteError>) -> Self {
        Self::RemoteUnavailable {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn node_not_found(id: NodeId) -> Self {
        Self::NotFound {
            kind: "node",
            id: id.to_string(),
        }
    }

    /// Whether the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NodeBusy { .. } | Self::RemoteUnavailable { .. })
    }
}

impl From<DbError> for FarmerbotError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Storage(other),
        }
    }
}
