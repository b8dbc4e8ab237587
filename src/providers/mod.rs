//! Provider adapters.
//!
//! Each adapter talks to one vendor's inventory and billing APIs and
//! normalizes both responses into the common [`ScanResult`] shape. Adapters
//! never write to storage and never retry: any vendor call failure fails the
//! whole `scan()` with a single [`ProviderScanError`]. Partial success is
//! handled one level up, by the scan service.

pub mod aws;
pub mod azure;
pub mod gcp;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::error::{ConfigError, ProviderScanError};
use crate::model::{AssetRecord, Provider, ScanResult};
use crate::services::attribution;

pub use aws::{AwsAdapter, AwsCredentials};
pub use azure::{AzureAdapter, AzureCredentials};
pub use gcp::{GcpAdapter, GcpCredentials};

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Lists resources, queries month-to-date cost, and returns the
    /// normalized result. No side effects beyond the outbound API calls.
    async fn scan(&self) -> Result<ScanResult, ProviderScanError>;
}

/// One grouped billing total with a vendor-native group key.
#[derive(Debug, Clone, PartialEq)]
pub struct CostGroup {
    pub key: String,
    pub amount: f64,
}

/// Month-to-date billing rows grouped two ways over the same underlying
/// data. The two dimensions need not sum to the same total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostBreakdown {
    pub by_service: Vec<CostGroup>,
    pub by_region: Vec<CostGroup>,
}

/// Builds an adapter for a one-off scan from caller-supplied credentials.
pub fn adapter_from_credentials(
    provider: Provider,
    credentials: serde_json::Value,
) -> Result<Arc<dyn ProviderAdapter>, ConfigError> {
    fn parse<T: serde::de::DeserializeOwned>(
        provider: Provider,
        credentials: serde_json::Value,
    ) -> Result<T, ConfigError> {
        serde_json::from_value(credentials).map_err(|e| ConfigError::InvalidCredentials {
            provider,
            reason: e.to_string(),
        })
    }

    match provider {
        Provider::Aws => Ok(Arc::new(aws::AwsAdapter::new(parse(provider, credentials)?)?)),
        Provider::Azure => Ok(Arc::new(azure::AzureAdapter::new(parse(
            provider,
            credentials,
        )?)?)),
        Provider::Gcp => Ok(Arc::new(gcp::GcpAdapter::new(parse(provider, credentials)?)?)),
        Provider::Manual => Err(ConfigError::InvalidCredentials {
            provider,
            reason: "manual assets are not scanned".to_string(),
        }),
    }
}

/// Folds grouped billing rows into a map, normalizing keys first. Keys that
/// normalize to the same value are summed.
pub(crate) fn cost_map(
    groups: Vec<CostGroup>,
    normalize: impl Fn(&str) -> String,
) -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    for group in groups {
        *map.entry(normalize(&group.key)).or_insert(0.0) += group.amount;
    }
    map
}

/// First day of the current month and today, both "YYYY-MM-DD".
pub(crate) fn month_to_date_range() -> (String, String) {
    let today = Utc::now().date_naive();
    let start = today.with_day(1).unwrap_or(today);
    (
        start.format("%Y-%m-%d").to_string(),
        today.format("%Y-%m-%d").to_string(),
    )
}

/// Shared tail of every adapter's `scan()`: spread service costs across the
/// discovered assets, infer the display-only connection graph, and stamp the
/// completion time.
pub(crate) fn assemble_scan_result(
    provider: Provider,
    mut assets: Vec<AssetRecord>,
    cost_by_service: BTreeMap<String, f64>,
    cost_by_region: BTreeMap<String, f64>,
) -> ScanResult {
    attribution::spread_service_costs(&mut assets, &cost_by_service);
    attribution::infer_connections(&mut assets);

    let completed = Utc::now();
    for asset in &mut assets {
        asset.last_updated = completed;
    }

    let total_cost = cost_by_service.values().sum();
    ScanResult {
        provider,
        assets,
        total_cost,
        cost_by_service,
        cost_by_region,
        scan_timestamp: completed,
    }
}
