use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use super::{parse_node_id, validation};
use crate::api::error::ApiError;
use crate::document::parse_power;
use crate::managers::{PowerDecision, WakeupOutcome};
use crate::models::{Node, PowerStatus};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/configure", post(configure))
        .route("/power", get(get_power))
        .route("/poweron/{node_id}", post(power_on))
        .route("/poweroff/{node_id}", post(power_off))
        .route("/periodicwakeup", post(periodic_wakeup))
        .route("/powermanagement", post(power_management))
}

async fn configure(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PowerStatus>, ApiError> {
    let power = parse_power(&body).map_err(validation)?;
    state.power().configure(power).await?;
    Ok(Json(state.power().get_power().await?))
}

async fn get_power(State(state): State<AppState>) -> Result<Json<PowerStatus>, ApiError> {
    Ok(Json(state.power().get_power().await?))
}

async fn power_on(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let node_id = parse_node_id(&node_id)?;
    Ok(Json(state.power().power_on(node_id).await?))
}

async fn power_off(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let node_id = parse_node_id(&node_id)?;
    Ok(Json(state.power().power_off(node_id).await?))
}

async fn periodic_wakeup(State(state): State<AppState>) -> Result<Json<WakeupOutcome>, ApiError> {
    Ok(Json(state.power().periodic_wakeup().await?))
}

async fn power_management(
    State(state): State<AppState>,
) -> Result<Json<PowerDecision>, ApiError> {
    Ok(Json(state.power().power_management().await?))
}
