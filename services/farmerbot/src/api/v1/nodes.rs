use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use super::{parse_node_id, validation};
use crate::api::error::ApiError;
use crate::document::{parse_find_node_request, parse_node};
use crate::models::Node;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/define", post(define_node))
        .route("/nodes", get(list_nodes))
        .route("/nodes/{node_id}", get(get_node))
        .route("/findnode", post(find_node))
}

async fn define_node(State(state): State<AppState>, body: Bytes) -> Result<Json<Node>, ApiError> {
    let node = parse_node(&body).map_err(validation)?;
    Ok(Json(state.nodes().define(node).await?))
}

async fn list_nodes(State(state): State<AppState>) -> Result<Json<Vec<Node>>, ApiError> {
    Ok(Json(state.nodes().list_nodes().await?))
}

async fn get_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let node_id = parse_node_id(&node_id)?;
    Ok(Json(state.nodes().get_node(node_id).await?))
}

/// Allocate a node. An empty body asks for any node.
async fn find_node(State(state): State<AppState>, body: Bytes) -> Result<Json<Node>, ApiError> {
    let request = if body.is_empty() {
        Default::default()
    } else {
        parse_find_node_request(&body).map_err(validation)?
    };
    let node = state
        .nodes()
        .find_node(&request.options, &request.exclude)
        .await?;
    Ok(Json(node))
}
