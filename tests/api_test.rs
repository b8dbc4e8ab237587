//! REST API integration tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use axum_test::TestServer;
use sea_orm::Database;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use cloudscope::config::Settings;
use cloudscope::database::connection::setup_database;
use cloudscope::server::app::create_app;
use cloudscope::services::{ScanService, TrendService};

/// Create a test server backed by a throwaway sqlite file. No provider
/// credentials are configured.
async fn setup_test_server() -> Result<(TestServer, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());

    let db = Database::connect(&db_url).await?;
    setup_database(&db).await?;

    let settings = Arc::new(Settings::default());
    let scans = Arc::new(ScanService::new(db.clone()));
    let trends = Arc::new(TrendService::new(db.clone(), Duration::from_secs(0)));

    let app = create_app(db, settings, scans, trends).await?;
    let server = TestServer::new(app)?;

    Ok((server, temp_file))
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let (server, _guard) = setup_test_server().await?;

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["service"], "cloudscope");
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_sample_data_and_assets_flow() -> Result<()> {
    let (server, _guard) = setup_test_server().await?;

    // Nothing scanned yet.
    let response = server.get("/api/v1/assets").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["assets"].as_array().unwrap().len(), 0);

    // Load the demo fleet.
    let response = server.post("/api/v1/sample-data").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["loaded"], 6);

    // Loading again is a no-op.
    let response = server.post("/api/v1/sample-data").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["loaded"], 0);

    // The fleet shows up in the inventory, labeled as sample data.
    let response = server.get("/api/v1/assets").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let assets = body["assets"].as_array().unwrap();
    assert_eq!(assets.len(), 6);
    assert!(assets
        .iter()
        .all(|a| a["provider"] == "manual" && a["scan_type"] == "sample"));

    Ok(())
}

#[tokio::test]
async fn test_scan_without_configured_providers_is_rejected() -> Result<()> {
    let (server, _guard) = setup_test_server().await?;

    let response = server.post("/api/v1/scans").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("no providers"));

    Ok(())
}

#[tokio::test]
async fn test_scan_provider_rejects_bad_input() -> Result<()> {
    let (server, _guard) = setup_test_server().await?;

    // Unknown provider name.
    let response = server
        .post("/api/v1/scans/oracle")
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // Manual assets are not scannable.
    let response = server
        .post("/api/v1/scans/manual")
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // Known provider, incomplete credentials.
    let response = server
        .post("/api/v1/scans/aws")
        .json(&json!({ "access_key_id": "AKIA123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_trends_endpoint_validates_parameters() -> Result<()> {
    let (server, _guard) = setup_test_server().await?;

    let response = server.get("/api/v1/trends").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["trends"].as_array().unwrap().len(), 0);

    let response = server
        .get("/api/v1/trends")
        .add_query_param("months", "soon")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/trends")
        .add_query_param("provider", "oracle")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/trends")
        .add_query_param("order", "asc")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    Ok(())
}
