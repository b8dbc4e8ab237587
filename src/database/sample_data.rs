//! Demo fleet for evaluation without cloud credentials.
//!
//! Loading is an explicit action (CLI subcommand or API endpoint), never a
//! fallback: the rows are labeled `provider=manual`, `scan_type=sample` so
//! they can always be told apart from real scan output.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::info;

use crate::database::entities::scan_records;
use crate::model::{AssetRecord, AssetStatus, Provider, ScanType};
use crate::services::{attribution, ScanHistory};

/// Inserts the demo fleet once. A second call finds the existing sample rows
/// and inserts nothing. Returns how many rows were inserted.
pub async fn load_sample_data(db: &DatabaseConnection) -> anyhow::Result<u64> {
    let existing = scan_records::Entity::find()
        .filter(scan_records::Column::ScanType.eq(ScanType::Sample.as_str()))
        .count(db)
        .await?;
    if existing > 0 {
        info!("sample data already loaded ({existing} rows), skipping");
        return Ok(0);
    }

    let mut assets = sample_assets();
    let costs: BTreeMap<String, f64> = [
        ("compute".to_string(), 84.0),
        ("database".to_string(), 120.0),
        ("object-storage".to_string(), 36.0),
    ]
    .into();
    attribution::spread_service_costs(&mut assets, &costs);
    attribution::infer_connections(&mut assets);

    let now = Utc::now();
    for asset in &mut assets {
        asset.last_updated = now;
    }

    let history = ScanHistory::new(db.clone());
    let inserted = history
        .record(Provider::Manual, &assets, ScanType::Sample, now)
        .await?;
    info!("loaded {inserted} sample assets");
    Ok(inserted)
}

fn sample_assets() -> Vec<AssetRecord> {
    let asset = |resource_id: &str, service: &str, region: &str, tags: &[&str]| AssetRecord {
        resource_id: resource_id.to_string(),
        provider: Provider::Manual,
        service: service.to_string(),
        region: region.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        cost_this_month: 0.0,
        status: AssetStatus::Running,
        connected_assets: Default::default(),
        last_updated: Utc::now(),
    };

    vec![
        asset(
            "sample-web-1",
            "compute",
            "us-east-1",
            &["env:sample", "role:web"],
        ),
        asset(
            "sample-web-2",
            "compute",
            "us-east-1",
            &["env:sample", "role:web"],
        ),
        asset(
            "sample-worker-1",
            "compute",
            "eu-west-1",
            &["env:sample", "role:worker"],
        ),
        asset(
            "sample-orders-db",
            "database",
            "us-east-1",
            &["env:sample", "role:orders"],
        ),
        asset(
            "sample-analytics-db",
            "database",
            "eu-west-1",
            &["env:sample", "role:analytics"],
        ),
        asset(
            "sample-media-bucket",
            "object-storage",
            "us-east-1",
            &["env:sample", "role:media"],
        ),
    ]
}
