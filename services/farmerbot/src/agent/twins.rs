use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use farmerbot_id::TwinId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::AgentError;

/// Where a twin's agent can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinEndpoint {
    pub twin_id: TwinId,

    /// Base URL of the relay serving this twin.
    pub relay_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Authoritative twin lookup.
#[async_trait]
pub trait TwinDirectory: Send + Sync {
    async fn resolve_twin(&self, twin: TwinId) -> Result<TwinEndpoint, AgentError>;
}

/// Lookup-or-populate cache in front of a [`TwinDirectory`].
///
/// Twins do not move during the life of the process, so entries never
/// expire.
pub struct TwinCache {
    directory: Arc<dyn TwinDirectory>,
    entries: RwLock<HashMap<TwinId, TwinEndpoint>>,
}

impl TwinCache {
    pub fn new(directory: Arc<dyn TwinDirectory>) -> Self {
        Self {
            directory,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, twin: TwinId) -> Result<TwinEndpoint, AgentError> {
        if let Some(endpoint) = self.entries.read().await.get(&twin) {
            return Ok(endpoint.clone());
        }

        let endpoint = self.directory.resolve_twin(twin).await?;
        debug!(twin_id = %twin, relay_url = %endpoint.relay_url, "Cached twin endpoint");

        let mut entries = self.entries.write().await;
        Ok(entries.entry(twin).or_insert(endpoint).clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
