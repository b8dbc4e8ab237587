use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{assets, health, sample, scans, trends};
use crate::config::Settings;
use crate::services::{ScanHistory, ScanService, TrendService};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub settings: Arc<Settings>,
    pub scans: Arc<ScanService>,
    pub trends: Arc<TrendService>,
    pub history: ScanHistory,
}

pub async fn create_app(
    db: DatabaseConnection,
    settings: Arc<Settings>,
    scans: Arc<ScanService>,
    trends: Arc<TrendService>,
) -> Result<Router> {
    let state = AppState {
        history: ScanHistory::new(db.clone()),
        db,
        settings: settings.clone(),
        scans,
        trends,
    };

    let cors = match settings.cors_origin.as_deref() {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state);

    Ok(app)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/scans", post(scans::scan_all))
        .route("/scans/:provider", post(scans::scan_provider))
        .route("/assets", get(assets::latest_assets))
        .route("/trends", get(trends::get_trends))
        .route("/sample-data", post(sample::load_sample_data))
}
