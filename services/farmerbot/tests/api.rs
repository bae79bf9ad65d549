//! HTTP API integration tests.
//!
//! Requests go through the full router, middleware included, without
//! binding a socket.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::{node, node_id, off, small, Harness};
use farmerbot::{api, models::PowerState, state::AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    let state = AppState::new(&h.fleet, h.farms.clone(), h.nodes.clone(), h.power.clone());
    api::create_router(state)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = Harness::new(0, vec![]).await;

    let (status, body) = send(router(&h), "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "farmerbot");

    let (status, _) = send(router(&h), "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_define_and_read_farm() {
    let h = Harness::new(0, vec![]).await;

    let (status, body) = send(
        router(&h),
        "POST",
        "/v1/farmmanager/define",
        Some(json!({"id": 7, "description": "lab", "publicIPs": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 7);

    let (status, body) = send(router(&h), "GET", "/v1/farmmanager/farm", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publicIPs"], 3);
}

#[tokio::test]
async fn test_define_node_validation_problem() {
    let h = Harness::new(0, vec![]).await;

    let (status, body) = send(
        router(&h),
        "POST",
        "/v1/nodemanager/define",
        Some(json!({"id": 5, "twinID": 105, "resources": {"total": {"CRU": 2}}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["code"], "invalid_request");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("total SRU is required for node 5"));
}

#[tokio::test]
async fn test_define_list_and_get_node() {
    let h = Harness::new(0, vec![]).await;

    let (status, _) = send(
        router(&h),
        "POST",
        "/v1/nodemanager/define",
        Some(json!({
            "id": 5,
            "twinID": 105,
            "certified": true,
            "resources": {"total": {"CRU": 2, "MRU": 4, "SRU": 8, "HRU": 16}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router(&h), "GET", "/v1/nodemanager/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    for uri in ["/v1/nodemanager/nodes/5", "/v1/nodemanager/nodes/node-5"] {
        let (status, body) = send(router(&h), "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["twinID"], 105);
        assert_eq!(body["certified"], true);
        assert_eq!(body["powerState"], "on");
    }

    let (status, body) = send(router(&h), "GET", "/v1/nodemanager/nodes/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, _) = send(router(&h), "GET", "/v1/nodemanager/nodes/twin-5", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_find_node() {
    let h = Harness::new(1, vec![off(node(1, small())), node(2, small())]).await;

    let (status, body) = send(router(&h), "POST", "/v1/nodemanager/findnode", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 2);

    let (status, body) = send(
        router(&h),
        "POST",
        "/v1/nodemanager/findnode",
        Some(json!({"publicIPs": 1, "capacity": {"CRU": 1}, "exclude": [2]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["powerState"], "wakingUp");

    let (status, body) = send(
        router(&h),
        "POST",
        "/v1/nodemanager/findnode",
        Some(json!({"publicIPs": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_public_ips");
}

#[tokio::test]
async fn test_power_endpoints() {
    let h = Harness::new(0, vec![node(1, small()), off(node(2, small()))]).await;

    let (status, body) = send(
        router(&h),
        "POST",
        "/v1/powermanager/configure",
        Some(json!({"wakeUpThreshold": 120, "periodicWakeUp": "09:15AM"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wakeUpThreshold"], 80);
    assert_eq!(body["periodicWakeUp"], "09:15AM");
    assert_eq!(body["nextPeriodicWakeUp"], "2024-03-02T09:15:00Z");

    let (status, body) = send(router(&h), "POST", "/v1/powermanager/poweron/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["powerState"], "wakingUp");
    assert_eq!(h.stored(2).await.power_state, PowerState::WakingUp);

    let (status, body) = send(router(&h), "POST", "/v1/powermanager/poweroff/2", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "last_online_node");

    let (status, body) = send(router(&h), "POST", "/v1/powermanager/powermanagement", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "deferred");
    assert_eq!(body["transitioning"], json!([2]));

    let (status, body) = send(router(&h), "POST", "/v1/powermanager/periodicwakeup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "nothing_to_wake");

    assert_eq!(h.chain.power_calls(), vec![(node_id(2), true)]);
}

#[tokio::test]
async fn test_node_busy_carries_retry_hint() {
    let h = Harness::new(0, vec![node(1, small()), node(2, small()), node(3, small())]).await;
    h.power.power_off(node_id(3)).await.unwrap();

    let (status, body) = send(router(&h), "POST", "/v1/powermanager/poweron/3", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "node_busy");
    assert_eq!(body["retryable"], true);
    assert_eq!(body["retry_after_seconds"], 300);
}

#[tokio::test]
async fn test_chain_failure_is_bad_gateway() {
    let h = Harness::new(0, vec![node(1, small()), off(node(2, small()))]).await;
    h.chain.fail_power_calls(true);

    let (status, body) = send(router(&h), "POST", "/v1/powermanager/poweron/2", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["retryable"], true);
}
