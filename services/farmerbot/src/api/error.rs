use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::{FarmerbotError, NODE_BUSY_RETRY_AFTER};

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub retryable: bool,
    pub retry_after_seconds: u32,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://farmerbot.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            retryable: false,
            retry_after_seconds: 0,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_GATEWAY, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn with_retry_after_seconds(mut self, seconds: u32) -> Self {
        self.problem.retry_after_seconds = seconds;
        if seconds > 0 {
            self.problem.retryable = true;
        }
        self
    }

    pub fn retryable(mut self) -> Self {
        self.problem.retryable = true;
        self
    }
}

impl From<FarmerbotError> for ApiError {
    fn from(err: FarmerbotError) -> Self {
        let message = err.to_string();
        match err {
            FarmerbotError::Validation(_) => Self::bad_request("invalid_request", message),
            FarmerbotError::NotFound { kind, .. } => {
                Self::not_found(format!("{kind}_not_found"), message)
            }
            FarmerbotError::NoSuitableNode => Self::conflict("no_suitable_node", message),
            FarmerbotError::InsufficientPublicIps { .. } => {
                Self::conflict("insufficient_public_ips", message)
            }
            FarmerbotError::NodeBusy { .. } => Self::conflict("node_busy", message)
                .with_retry_after_seconds(NODE_BUSY_RETRY_AFTER.as_secs() as u32),
            FarmerbotError::LastOnlineNode { .. } => Self::conflict("last_online_node", message),
            FarmerbotError::RemoteUnavailable { .. } => {
                Self::bad_gateway("remote_unavailable", message).retryable()
            }
            FarmerbotError::Storage(e) => {
                error!(error = %e, "Storage failure");
                Self::internal("storage_failure", "storage failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
