use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::error;

use crate::server::app::AppState;

/// Latest recorded batch per provider, straight from scan history.
pub async fn latest_assets(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let assets = state.history.latest_assets().await.map_err(|e| {
        error!("failed to load latest assets: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "assets": assets })))
}
