use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};

use super::validation;
use crate::api::error::ApiError;
use crate::document::parse_farm;
use crate::models::Farm;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/define", post(define_farm))
        .route("/farm", get(get_farm))
}

async fn define_farm(State(state): State<AppState>, body: Bytes) -> Result<Json<Farm>, ApiError> {
    let farm = parse_farm(&body).map_err(validation)?;
    Ok(Json(state.farms().define(farm).await?))
}

async fn get_farm(State(state): State<AppState>) -> Result<Json<Farm>, ApiError> {
    Ok(Json(state.farms().get().await?))
}
