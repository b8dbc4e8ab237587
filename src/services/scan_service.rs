//! Multi-provider scan aggregation.
//!
//! `scan_all` fans out to every requested adapter concurrently, waits for
//! all of them to settle, and merges whatever succeeded. A provider failure
//! becomes a partial-outcome entry, never an error: partial success is a
//! first-class result. Errors are only raised before dispatch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ScanDispatchError;
use crate::model::{AssetRecord, CostSummary, Provider, ScanResult, ScanType};
use crate::providers::ProviderAdapter;
use crate::services::history::ScanHistory;

#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub provider: Provider,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub scan_id: String,
    /// True iff every requested provider succeeded. A false value still
    /// carries all data from the providers that did succeed.
    pub success: bool,
    pub assets: Vec<AssetRecord>,
    pub cost_summary: CostSummary,
    pub errors: Vec<ScanFailure>,
    /// A successful scan whose persistence failed is still a successful
    /// scan; the write failure is reported here instead.
    pub persistence_error: Option<String>,
}

pub struct ScanService {
    history: ScanHistory,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ScanService {
    pub fn new(db: sea_orm::DatabaseConnection) -> Self {
        Self {
            history: ScanHistory::new(db),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Scans all requested providers concurrently and records the results.
    ///
    /// Only one scan per provider set runs at a time: a tick that outlives
    /// its schedule, or a second caller with the same set, is rejected with
    /// `AlreadyRunning` instead of overlapping writes.
    pub async fn scan_all(
        &self,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        scan_type: ScanType,
    ) -> Result<ScanOutcome, ScanDispatchError> {
        if adapters.is_empty() {
            return Err(ScanDispatchError::NoProviders);
        }

        let key = guard_key(&adapters);
        let Some(_guard) = InFlightGuard::acquire(self.in_flight.clone(), key.clone()) else {
            return Err(ScanDispatchError::AlreadyRunning(key));
        };

        Ok(self.run_scan(adapters, scan_type).await)
    }

    async fn run_scan(
        &self,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        scan_type: ScanType,
    ) -> ScanOutcome {
        let scan_id = Uuid::new_v4().to_string();
        info!(
            scan_id = %scan_id,
            "starting {scan_type} scan across {} providers",
            adapters.len()
        );

        let outcomes = join_all(adapters.iter().map(|adapter| {
            let adapter = adapter.clone();
            async move { (adapter.provider(), adapter.scan().await) }
        }))
        .await;

        let mut succeeded: Vec<ScanResult> = Vec::new();
        let mut failed: Vec<ScanFailure> = Vec::new();
        for (provider, result) in outcomes {
            match result {
                Ok(scan) => {
                    info!(
                        "{provider} scan found {} assets, {:.2} month-to-date",
                        scan.assets.len(),
                        scan.total_cost
                    );
                    succeeded.push(scan);
                }
                Err(e) => {
                    warn!("{e}");
                    failed.push(ScanFailure {
                        provider,
                        message: e.message,
                    });
                }
            }
        }

        let (assets, cost_summary) = merge_results(&succeeded);

        let mut persistence_error: Option<String> = None;
        for scan in &succeeded {
            if let Err(e) = self
                .history
                .record(scan.provider, &scan.assets, scan_type, scan.scan_timestamp)
                .await
            {
                error!("failed to persist {} scan: {e}", scan.provider);
                match &mut persistence_error {
                    Some(existing) => {
                        existing.push_str("; ");
                        existing.push_str(&e.to_string());
                    }
                    None => persistence_error = Some(e.to_string()),
                }
            }
        }

        ScanOutcome {
            scan_id,
            success: failed.is_empty(),
            assets,
            cost_summary,
            errors: failed,
            persistence_error,
        }
    }
}

/// Holds one key in the in-flight set. The key is released on drop, so a
/// scan future cancelled mid-run (a disconnected client drops the handler
/// future) never leaves its provider set permanently locked.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightGuard {
    fn acquire(in_flight: Arc<Mutex<HashSet<String>>>, key: String) -> Option<Self> {
        let inserted = lock_in_flight(&in_flight).insert(key.clone());
        inserted.then_some(Self { in_flight, key })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.key);
    }
}

fn lock_in_flight(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn guard_key(adapters: &[Arc<dyn ProviderAdapter>]) -> String {
    let mut names: Vec<&str> = adapters.iter().map(|a| a.provider().as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names.join(",")
}

/// Concatenates assets and folds the per-provider cost maps together.
/// Service and region keys that collide across providers are summed into
/// the same bucket on purpose.
pub fn merge_results(results: &[ScanResult]) -> (Vec<AssetRecord>, CostSummary) {
    let mut assets = Vec::new();
    let mut summary = CostSummary::default();
    for result in results {
        assets.extend(result.assets.iter().cloned());
        summary.total_cost += result.total_cost;
        *summary
            .cost_by_provider
            .entry(result.provider)
            .or_insert(0.0) += result.total_cost;
        for (service, cost) in &result.cost_by_service {
            *summary.cost_by_service.entry(service.clone()).or_insert(0.0) += cost;
        }
        for (region, cost) in &result.cost_by_region {
            *summary.cost_by_region.entry(region.clone()).or_insert(0.0) += cost;
        }
    }
    (assets, summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;

    fn result_with_costs(provider: Provider, by_service: &[(&str, f64)]) -> ScanResult {
        let cost_by_service: BTreeMap<String, f64> = by_service
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        ScanResult {
            provider,
            assets: Vec::new(),
            total_cost: cost_by_service.values().sum(),
            cost_by_service,
            cost_by_region: BTreeMap::new(),
            scan_timestamp: Utc::now(),
        }
    }

    #[test]
    fn merge_sums_colliding_service_keys() {
        let results = vec![
            result_with_costs(Provider::Aws, &[("object-storage", 10.0)]),
            result_with_costs(Provider::Gcp, &[("object-storage", 10.0)]),
        ];
        let (_, summary) = merge_results(&results);
        assert_eq!(summary.cost_by_service.get("object-storage"), Some(&20.0));
        assert_eq!(summary.total_cost, 20.0);
        assert_eq!(summary.cost_by_provider.get(&Provider::Aws), Some(&10.0));
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        let (assets, summary) = merge_results(&[]);
        assert!(assets.is_empty());
        assert_eq!(summary.total_cost, 0.0);
    }
}
