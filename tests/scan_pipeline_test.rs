//! Scan pipeline integration tests: fan-out, partial failure, replay
//! dedupe, and the overlap guard.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{Database, EntityTrait, PaginatorTrait};
use tempfile::NamedTempFile;

use cloudscope::database::connection::setup_database;
use cloudscope::database::entities::scan_records;
use cloudscope::error::{ProviderScanError, ScanDispatchError};
use cloudscope::model::{
    AssetRecord, AssetStatus, Provider, ScanResult, ScanType, COST_EPSILON,
};
use cloudscope::providers::ProviderAdapter;
use cloudscope::services::ScanService;

struct FakeAdapter {
    provider: Provider,
    assets: Vec<AssetRecord>,
    cost_by_service: BTreeMap<String, f64>,
    scan_timestamp: DateTime<Utc>,
    fail_with: Option<String>,
    delay: Duration,
}

impl FakeAdapter {
    fn succeeding(provider: Provider, assets: Vec<AssetRecord>, cost: &[(&str, f64)]) -> Self {
        Self {
            provider,
            assets,
            cost_by_service: cost.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            scan_timestamp: "2026-08-30T12:00:00Z".parse().unwrap(),
            fail_with: None,
            delay: Duration::ZERO,
        }
    }

    fn failing(provider: Provider, message: &str) -> Self {
        Self {
            provider,
            assets: Vec::new(),
            cost_by_service: BTreeMap::new(),
            scan_timestamp: Utc::now(),
            fail_with: Some(message.to_string()),
            delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn scan(&self) -> Result<ScanResult, ProviderScanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(ProviderScanError {
                provider: self.provider,
                message: message.clone(),
            });
        }
        Ok(ScanResult {
            provider: self.provider,
            assets: self.assets.clone(),
            total_cost: self.cost_by_service.values().sum(),
            cost_by_service: self.cost_by_service.clone(),
            cost_by_region: BTreeMap::new(),
            scan_timestamp: self.scan_timestamp,
        })
    }
}

fn asset(resource_id: &str, provider: Provider, service: &str, cost: f64) -> AssetRecord {
    AssetRecord {
        resource_id: resource_id.to_string(),
        provider,
        service: service.to_string(),
        region: "us-east-1".to_string(),
        tags: vec!["env:test".to_string()],
        cost_this_month: cost,
        status: AssetStatus::Running,
        connected_assets: Default::default(),
        last_updated: Utc::now(),
    }
}

async fn test_service() -> Result<(ScanService, sea_orm::DatabaseConnection, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());
    let db = Database::connect(&db_url).await?;
    setup_database(&db).await?;
    Ok((ScanService::new(db.clone()), db, temp_file))
}

#[tokio::test]
async fn one_failing_provider_yields_a_partial_outcome() -> Result<()> {
    let (service, _db, _guard) = test_service().await?;

    let aws = FakeAdapter::succeeding(
        Provider::Aws,
        vec![
            asset("i-1", Provider::Aws, "compute", 30.0),
            asset("i-2", Provider::Aws, "compute", 30.0),
        ],
        &[("compute", 60.0)],
    );
    let gcp = FakeAdapter::failing(Provider::Gcp, "token expired");

    let outcome = service
        .scan_all(vec![Arc::new(aws), Arc::new(gcp)], ScanType::OnDemand)
        .await?;

    assert!(!outcome.success);
    assert_eq!(outcome.assets.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].provider, Provider::Gcp);
    assert!(outcome.errors[0].message.contains("token expired"));
    assert!((outcome.cost_summary.total_cost - 60.0).abs() < COST_EPSILON);
    assert!(outcome.persistence_error.is_none());
    Ok(())
}

#[tokio::test]
async fn all_providers_failing_yields_an_empty_outcome() -> Result<()> {
    let (service, _db, _guard) = test_service().await?;

    let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
        Arc::new(FakeAdapter::failing(Provider::Aws, "down")),
        Arc::new(FakeAdapter::failing(Provider::Azure, "down")),
        Arc::new(FakeAdapter::failing(Provider::Gcp, "down")),
    ];

    let outcome = service.scan_all(adapters, ScanType::OnDemand).await?;

    assert!(!outcome.success);
    assert!(outcome.assets.is_empty());
    assert_eq!(outcome.cost_summary.total_cost, 0.0);
    assert_eq!(outcome.errors.len(), 3);
    Ok(())
}

#[tokio::test]
async fn replaying_the_same_scan_inserts_nothing_new() -> Result<()> {
    let (service, db, _guard) = test_service().await?;

    let adapter = || {
        FakeAdapter::succeeding(
            Provider::Aws,
            vec![
                asset("i-1", Provider::Aws, "compute", 25.0),
                asset("i-2", Provider::Aws, "compute", 25.0),
            ],
            &[("compute", 50.0)],
        )
    };

    service
        .scan_all(vec![Arc::new(adapter())], ScanType::OnDemand)
        .await?;
    service
        .scan_all(vec![Arc::new(adapter())], ScanType::OnDemand)
        .await?;

    let rows = scan_records::Entity::find().count(&db).await?;
    assert_eq!(rows, 2);
    Ok(())
}

#[tokio::test]
async fn a_cancelled_scan_releases_the_guard() -> Result<()> {
    let (service, _db, _guard) = test_service().await?;
    let service = Arc::new(service);

    let slow = FakeAdapter::succeeding(
        Provider::Aws,
        vec![asset("i-1", Provider::Aws, "compute", 10.0)],
        &[("compute", 10.0)],
    )
    .slow(Duration::from_millis(200));

    // Cut the scan off mid-run, the way a disconnected client drops the
    // handler future.
    let cut_off = tokio::time::timeout(
        Duration::from_millis(50),
        service.scan_all(vec![Arc::new(slow)], ScanType::OnDemand),
    )
    .await;
    assert!(cut_off.is_err());

    let outcome = service
        .scan_all(
            vec![Arc::new(FakeAdapter::succeeding(
                Provider::Aws,
                Vec::new(),
                &[],
            ))],
            ScanType::OnDemand,
        )
        .await?;
    assert!(outcome.success);
    Ok(())
}

#[tokio::test]
async fn a_second_scan_of_the_same_providers_is_rejected_while_one_runs() -> Result<()> {
    let (service, _db, _guard) = test_service().await?;
    let service = Arc::new(service);

    let slow = FakeAdapter::succeeding(
        Provider::Aws,
        vec![asset("i-1", Provider::Aws, "compute", 10.0)],
        &[("compute", 10.0)],
    )
    .slow(Duration::from_millis(200));

    let background = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .scan_all(vec![Arc::new(slow)], ScanType::OnDemand)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = service
        .scan_all(
            vec![Arc::new(FakeAdapter::succeeding(
                Provider::Aws,
                Vec::new(),
                &[],
            ))],
            ScanType::OnDemand,
        )
        .await;
    assert!(matches!(second, Err(ScanDispatchError::AlreadyRunning(_))));

    let first = background.await??;
    assert!(first.success);

    // The guard is released once the first scan completes.
    let third = service
        .scan_all(
            vec![Arc::new(FakeAdapter::succeeding(
                Provider::Aws,
                Vec::new(),
                &[],
            ))],
            ScanType::OnDemand,
        )
        .await?;
    assert!(third.success);
    Ok(())
}
