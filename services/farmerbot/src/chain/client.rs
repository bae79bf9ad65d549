//! JSON-RPC client for the chain gateway.
//!
//! The gateway holds the farmer's signing identity and submits extrinsics on
//! the bot's behalf.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use farmerbot_id::{NodeId, TwinId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{ChainClient, ChainError, TxHash};
use crate::agent::{AgentError, TwinDirectory, TwinEndpoint};

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PowerParams {
    node_id: NodeId,
    power_target: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeParams {
    node_id: NodeId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TwinParams {
    twin_id: TwinId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RentContract {
    #[serde(default)]
    contract_id: u64,
}

/// Chain client over HTTP JSON-RPC.
pub struct HttpChainClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpChainClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc<P, T>(&self, method: &str, params: P) -> Result<T, ChainError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "Calling chain gateway");

        let response = self
            .client
            .post(&self.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(method, status, body = %body, "Chain gateway call failed");
            return Err(ChainError::Status { status, body });
        }

        let reply: RpcResponse<T> = response.json().await?;
        if let Some(err) = reply.error {
            return Err(ChainError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }
        reply.result.ok_or_else(|| ChainError::EmptyResult {
            method: method.to_string(),
        })
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn set_node_power_state(&self, node: NodeId, on: bool) -> Result<TxHash, ChainError> {
        let params = PowerParams {
            node_id: node,
            power_target: if on { "Up" } else { "Down" },
        };
        self.rpc("setNodePowerState", params).await
    }

    async fn get_node_rent_contract(&self, node: NodeId) -> Result<u64, ChainError> {
        let contract: Option<RentContract> = self
            .rpc("getNodeRentContract", NodeParams { node_id: node })
            .await
            .or_else(|e| match e {
                ChainError::EmptyResult { .. } => Ok(None),
                other => Err(other),
            })?;
        Ok(contract.map(|c| c.contract_id).unwrap_or(0))
    }

    async fn get_twin(&self, twin: TwinId) -> Result<TwinEndpoint, ChainError> {
        self.rpc("getTwin", TwinParams { twin_id: twin }).await
    }
}

#[async_trait]
impl TwinDirectory for HttpChainClient {
    async fn resolve_twin(&self, twin: TwinId) -> Result<TwinEndpoint, AgentError> {
        self.get_twin(twin).await.map_err(|e| AgentError::Resolve {
            twin_id: twin,
            message: e.to_string(),
        })
    }
}
