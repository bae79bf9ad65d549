//! API v1 routes, namespaced by manager.

mod farms;
mod nodes;
mod power;

use axum::Router;
use farmerbot_id::NodeId;

use crate::api::error::ApiError;
use crate::error::FarmerbotError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/farmmanager", farms::routes())
        .nest("/nodemanager", nodes::routes())
        .nest("/powermanager", power::routes())
}

fn parse_node_id(raw: &str) -> Result<NodeId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_request("invalid_node_id", format!("invalid node id {raw:?}: {e}")))
}

fn validation(err: crate::document::DocumentError) -> ApiError {
    FarmerbotError::Validation(err).into()
}
