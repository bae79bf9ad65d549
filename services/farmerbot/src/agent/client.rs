//! HTTP client for node agents.
//!
//! Every call is an envelope `{cmd, dst, data}` posted to the relay serving
//! the destination twin. The reply carries either `data` or an `error`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use farmerbot_id::TwinId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AgentError, NodeAgent, TwinCache};
use crate::models::NodeStatistics;

const CMD_SYSTEM_VERSION: &str = "zos.system.version";
const CMD_STATISTICS: &str = "zos.statistics.get";
const CMD_PUBLIC_CONFIG: &str = "zos.network.public_config_get";
const CMD_LIST_WG_PORTS: &str = "zos.network.list_wg_ports";

#[derive(Debug, Serialize)]
struct RmbRequest<'a> {
    cmd: &'a str,
    dst: TwinId,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RmbResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RmbErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RmbErrorBody {
    #[serde(default)]
    code: u32,
    message: String,
}

/// Node agent client speaking the relay envelope over HTTP.
pub struct RmbNodeAgent {
    client: reqwest::Client,
    twins: Arc<TwinCache>,
}

impl RmbNodeAgent {
    /// Create a client; `timeout` bounds every call.
    pub fn new(twins: Arc<TwinCache>, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, twins })
    }

    /// Send `cmd` and return the raw `data` of the reply, if any.
    async fn call(&self, twin: TwinId, cmd: &str) -> Result<Option<serde_json::Value>, AgentError> {
        let endpoint = self.twins.get(twin).await?;
        let url = format!("{}/api/v1/rmb", endpoint.relay_url.trim_end_matches('/'));
        debug!(twin_id = %twin, cmd, url = %url, "Calling node agent");

        let response = self
            .client
            .post(&url)
            .json(&RmbRequest {
                cmd,
                dst: twin,
                data: serde_json::Value::Null,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status { status, body });
        }

        let reply: RmbResponse = response.json().await?;
        if let Some(error) = reply.error {
            return Err(AgentError::Remote {
                cmd: cmd.to_string(),
                message: format!("{} (code {})", error.message, error.code),
            });
        }
        Ok(reply.data)
    }

    async fn call_for<T: DeserializeOwned>(&self, twin: TwinId, cmd: &str) -> Result<T, AgentError> {
        let data = self
            .call(twin, cmd)
            .await?
            .filter(|v| !v.is_null())
            .ok_or_else(|| AgentError::EmptyResponse {
                cmd: cmd.to_string(),
            })?;
        serde_json::from_value(data).map_err(|e| AgentError::Remote {
            cmd: cmd.to_string(),
            message: format!("malformed reply: {e}"),
        })
    }
}

#[async_trait]
impl NodeAgent for RmbNodeAgent {
    async fn system_version(&self, twin: TwinId) -> Result<(), AgentError> {
        self.call(twin, CMD_SYSTEM_VERSION).await.map(|_| ())
    }

    async fn statistics(&self, twin: TwinId) -> Result<NodeStatistics, AgentError> {
        self.call_for(twin, CMD_STATISTICS).await
    }

    async fn has_public_config(&self, twin: TwinId) -> Result<bool, AgentError> {
        // The agent reports an error when no public config is set.
        match self.call(twin, CMD_PUBLIC_CONFIG).await {
            Ok(_) => Ok(true),
            Err(AgentError::Remote { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_wg_ports(&self, twin: TwinId) -> Result<Vec<u16>, AgentError> {
        match self.call_for(twin, CMD_LIST_WG_PORTS).await {
            Err(AgentError::EmptyResponse { .. }) => Ok(Vec::new()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{TwinDirectory, TwinEndpoint};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedDirectory(String);

    #[async_trait]
    impl TwinDirectory for FixedDirectory {
        async fn resolve_twin(&self, twin: TwinId) -> Result<TwinEndpoint, AgentError> {
            Ok(TwinEndpoint {
                twin_id: twin,
                relay_url: self.0.clone(),
                public_key: None,
            })
        }
    }

    fn agent(server: &MockServer) -> RmbNodeAgent {
        let twins = Arc::new(TwinCache::new(Arc::new(FixedDirectory(server.uri()))));
        RmbNodeAgent::new(twins, Duration::from_secs(2)).unwrap()
    }

    fn twin() -> TwinId {
        TwinId::new(42).unwrap()
    }

    #[tokio::test]
    async fn test_system_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rmb"))
            .and(body_partial_json(serde_json::json!({
                "cmd": "zos.system.version",
                "dst": 42
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"zos": "3.10", "zinit": "0.2"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        agent(&server).system_version(twin()).await.unwrap();
    }

    #[tokio::test]
    async fn test_statistics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"cmd": "zos.statistics.get"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "total": {"CRU": 8, "MRU": 16, "SRU": 100, "HRU": 1000, "ipv4": 0},
                    "used": {"CRU": 2, "MRU": 4, "SRU": 10, "HRU": 0, "ipv4": 1}
                }
            })))
            .mount(&server)
            .await;

        let stats = agent(&server).statistics(twin()).await.unwrap();
        assert_eq!(stats.total.cru, 8);
        assert_eq!(stats.used.mru, 4);
        assert_eq!(stats.used.ipv4, 1);
    }

    #[tokio::test]
    async fn test_public_config_error_means_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"cmd": "zos.network.public_config_get"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"code": 1, "message": "no public config"}
            })))
            .mount(&server)
            .await;

        assert!(!agent(&server).has_public_config(twin()).await.unwrap());
    }

    #[tokio::test]
    async fn test_wg_ports_null_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"cmd": "zos.network.list_wg_ports"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
            .mount(&server)
            .await;

        assert!(agent(&server).list_wg_ports(twin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("relay down"))
            .mount(&server)
            .await;

        let err = agent(&server).system_version(twin()).await.unwrap_err();
        assert!(matches!(err, AgentError::Status { status: 503, .. }));
        let err = agent(&server).has_public_config(twin()).await.unwrap_err();
        assert!(matches!(err, AgentError::Status { status: 503, .. }));
    }
}
