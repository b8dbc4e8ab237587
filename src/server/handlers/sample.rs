use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::error;

use crate::database::sample_data;
use crate::server::app::AppState;

pub async fn load_sample_data(
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    let loaded = sample_data::load_sample_data(&state.db).await.map_err(|e| {
        error!("failed to load sample data: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "loaded": loaded })))
}
