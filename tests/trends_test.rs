//! Trend aggregation against a real database, including cache behavior.

use std::time::Duration;

use anyhow::Result;
use chrono::{Months, Utc};
use sea_orm::Database;
use tempfile::NamedTempFile;

use cloudscope::database::connection::setup_database;
use cloudscope::model::{AssetRecord, AssetStatus, Provider, ScanType, TrendRow};
use cloudscope::services::{ScanHistory, TrendFilter, TrendService};

fn asset(resource_id: &str, provider: Provider, cost: f64) -> AssetRecord {
    AssetRecord {
        resource_id: resource_id.to_string(),
        provider,
        service: "compute".to_string(),
        region: "us-east-1".to_string(),
        tags: Vec::new(),
        cost_this_month: cost,
        status: AssetStatus::Running,
        connected_assets: Default::default(),
        last_updated: Utc::now(),
    }
}

async fn test_db() -> Result<(sea_orm::DatabaseConnection, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());
    let db = Database::connect(&db_url).await?;
    setup_database(&db).await?;
    Ok((db, temp_file))
}

/// One recorded batch per month: 100, 150, 120 month-to-date.
async fn seed_three_months(history: &ScanHistory) -> Result<()> {
    let now = Utc::now();
    for (months_ago, cost) in [(2u32, 100.0), (1, 150.0), (0, 120.0)] {
        let scanned_at = now
            .checked_sub_months(Months::new(months_ago))
            .unwrap_or(now);
        history
            .record(
                Provider::Aws,
                &[asset("i-1", Provider::Aws, cost)],
                ScanType::Scheduled,
                scanned_at,
            )
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn monthly_trend_reports_percent_change_against_the_prior_month() -> Result<()> {
    let (db, _guard) = test_db().await?;
    let history = ScanHistory::new(db.clone());
    seed_three_months(&history).await?;

    let service = TrendService::new(db, Duration::from_secs(0));
    let rows = service.get_trends(&TrendFilter::default()).await?;

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.provider == Provider::Aws));
    let costs: Vec<f64> = rows.iter().map(|r| r.total_cost).collect();
    assert_eq!(costs, vec![100.0, 150.0, 120.0]);
    let changes: Vec<f64> = rows.iter().map(|r| r.percent_change).collect();
    assert_eq!(changes, vec![0.0, 50.0, -20.0]);
    Ok(())
}

#[tokio::test]
async fn provider_filter_limits_the_series() -> Result<()> {
    let (db, _guard) = test_db().await?;
    let history = ScanHistory::new(db.clone());
    seed_three_months(&history).await?;
    history
        .record(
            Provider::Gcp,
            &[asset("vm-1", Provider::Gcp, 40.0)],
            ScanType::Scheduled,
            Utc::now(),
        )
        .await?;

    let service = TrendService::new(db, Duration::from_secs(0));

    let all = service.get_trends(&TrendFilter::default()).await?;
    assert_eq!(all.len(), 4);

    let gcp_only = service
        .get_trends(&TrendFilter {
            providers: Some(vec![Provider::Gcp]),
            ..Default::default()
        })
        .await?;
    assert_eq!(gcp_only.len(), 1);
    assert_eq!(gcp_only[0].provider, Provider::Gcp);
    assert_eq!(gcp_only[0].percent_change, 0.0);
    Ok(())
}

#[tokio::test]
async fn cached_results_are_served_until_the_ttl_expires() -> Result<()> {
    let (db, _guard) = test_db().await?;
    let history = ScanHistory::new(db.clone());
    seed_three_months(&history).await?;

    let service = TrendService::new(db.clone(), Duration::from_secs(60));
    let first: Vec<TrendRow> = service.get_trends(&TrendFilter::default()).await?;
    assert_eq!(first.len(), 3);

    // New data lands, but the cached series is still served.
    history
        .record(
            Provider::Azure,
            &[asset("vm-9", Provider::Azure, 75.0)],
            ScanType::Scheduled,
            Utc::now(),
        )
        .await?;
    let cached = service.get_trends(&TrendFilter::default()).await?;
    assert_eq!(cached, first);

    // A zero-TTL service sees the new row immediately.
    let uncached = TrendService::new(db, Duration::from_secs(0));
    let fresh = uncached.get_trends(&TrendFilter::default()).await?;
    assert_eq!(fresh.len(), 4);
    Ok(())
}
