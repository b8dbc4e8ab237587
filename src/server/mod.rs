pub mod app;
pub mod handlers;

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use sea_orm_migration::prelude::*;
use tracing::info;

use crate::config::Settings;
use crate::database::{connection::*, migrations::Migrator};
use crate::services::{spawn_scheduled_scans, ScanService, TrendService};

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

pub async fn start_server(settings: Settings) -> Result<()> {
    let db = establish_connection(&settings.database_url).await?;

    Migrator::up(&db, None).await?;
    info!("Database migrations completed");

    let settings = Arc::new(settings);
    let scans = Arc::new(ScanService::new(db.clone()));
    spawn_scheduled_scans(scans.clone(), settings.clone());

    let trends = Arc::new(TrendService::new(
        db.clone(),
        std::time::Duration::from_secs(settings.cache_ttl_secs),
    ));

    let port = settings.port;
    let app = app::create_app(db, settings, scans, trends).await?;

    log_routes();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

fn log_routes() {
    info!("API Endpoints:");
    info!("  GET  /health                     - Health check");
    info!("  POST /api/v1/scans               - Scan all configured providers");
    info!("  POST /api/v1/scans/:provider     - Scan one provider with supplied credentials");
    info!("  GET  /api/v1/assets              - Latest recorded inventory");
    info!("  GET  /api/v1/trends              - Monthly cost trends");
    info!("  POST /api/v1/sample-data         - Load the demo fleet");
}

pub async fn migrate_database(database_url: &str, direction: MigrateDirection) -> Result<()> {
    let db = establish_connection(database_url).await?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}
