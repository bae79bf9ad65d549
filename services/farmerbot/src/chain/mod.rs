//! Chain boundary.
//!
//! Power changes are authorized on chain. The chain also knows which nodes
//! are under a rent contract and where each twin can be reached.

mod client;
mod mock;

pub use client::HttpChainClient;
pub use mock::MockChain;

use std::fmt;

use async_trait::async_trait;
use farmerbot_id::{NodeId, TwinId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::TwinEndpoint;

/// Chain call errors.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chain gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{method} failed with code {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} returned no result")]
    EmptyResult { method: String },
}

/// Handle of a submitted chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Calls the bot makes on the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Request a power change for `node`, signed with the farmer's identity.
    async fn set_node_power_state(&self, node: NodeId, on: bool) -> Result<TxHash, ChainError>;

    /// Id of the active rent contract on `node`, 0 when there is none.
    async fn get_node_rent_contract(&self, node: NodeId) -> Result<u64, ChainError>;

    async fn get_twin(&self, twin: TwinId) -> Result<TwinEndpoint, ChainError>;
}
