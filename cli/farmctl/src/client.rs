//! HTTP client for the farmerbot API.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CliError;

/// Client for the farmerbot control API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.get(self.url(path)).send().await?;
        self.handle_response(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        self.handle_response(response).await
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).send().await?;
        self.handle_response(response).await
    }

    /// POST a document read from disk as is; the server validates it.
    pub async fn post_raw<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Vec<u8>,
    ) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).body(body).send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CliError> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse response: {}", e)))
        } else {
            self.handle_error(response).await
        }
    }

    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, CliError> {
        let status = response.status().as_u16();

        let problem: Problem = response.json().await.unwrap_or_else(|_| Problem {
            code: "unknown".to_string(),
            detail: "Unknown error".to_string(),
            retry_after_seconds: 0,
        });

        let retry_after = (problem.retry_after_seconds > 0).then_some(problem.retry_after_seconds);
        Err(CliError::api(status, problem.code, problem.detail, retry_after))
    }
}

/// Problem details returned by the API on failure.
#[derive(Debug, Deserialize)]
struct Problem {
    code: String,
    detail: String,
    #[serde(default)]
    retry_after_seconds: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_building() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(
            client.url("/v1/nodemanager/nodes"),
            "http://localhost:8080/v1/nodemanager/nodes"
        );
    }

    #[tokio::test]
    async fn test_problem_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/powermanager/poweron/3"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "type": "https://farmerbot.dev/problems/node_busy",
                "title": "Conflict",
                "status": 409,
                "detail": "node-3 is shutting down, try again once the transition settles",
                "code": "node_busy",
                "retryable": true,
                "retry_after_seconds": 300
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client
            .post_empty::<serde_json::Value>("/v1/powermanager/poweron/3")
            .await
            .unwrap_err();

        match err {
            CliError::Api {
                status,
                code,
                retry_after_seconds,
                ..
            } => {
                assert_eq!(status, 409);
                assert_eq!(code, "node_busy");
                assert_eq!(retry_after_seconds, Some(300));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client
            .get::<serde_json::Value>("/v1/farmmanager/farm")
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Api { status: 502, ref code, .. } if code == "unknown"));
    }
}
