//! Month-over-month cost trends with a TTL cache.
//!
//! The cache is purely an optimization: results are identical with caching
//! disabled (ttl of zero), and a cache problem degrades to a direct query
//! rather than failing the read.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Months, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::database::entities::scan_records;
use crate::error::TrendQueryError;
use crate::model::{Provider, TrendRow};

pub const DEFAULT_TREND_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFilter {
    pub providers: Option<Vec<Provider>>,
    pub region: Option<String>,
    pub service: Option<String>,
    pub months: u32,
}

impl Default for TrendFilter {
    fn default() -> Self {
        Self {
            providers: None,
            region: None,
            service: None,
            months: DEFAULT_TREND_MONTHS,
        }
    }
}

impl TrendFilter {
    /// Cache key over the full filter tuple. The provider set is sorted so
    /// the key does not depend on request ordering.
    pub fn cache_key(&self) -> String {
        let providers = match &self.providers {
            Some(list) => {
                let mut names: Vec<&str> = list.iter().map(Provider::as_str).collect();
                names.sort_unstable();
                names.dedup();
                names.join("+")
            }
            None => "*".to_string(),
        };
        format!(
            "p={providers};r={};s={};m={}",
            self.region.as_deref().unwrap_or("*"),
            self.service.as_deref().unwrap_or("*"),
            self.months
        )
    }
}

struct CacheEntry {
    stored_at: Instant,
    rows: Vec<TrendRow>,
}

/// In-process TTL cache keyed by filter. Expired entries are evicted
/// opportunistically on write.
pub struct TrendCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TrendCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<TrendRow>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.rows.clone())
    }

    pub async fn put(&self, key: String, rows: Vec<TrendRow>) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                rows,
            },
        );
    }
}

pub struct TrendService {
    db: DatabaseConnection,
    cache: TrendCache,
}

#[derive(Debug, FromQueryResult)]
struct MonthlyCostRow {
    provider: String,
    month: String,
    total_cost: f64,
}

impl TrendService {
    pub fn new(db: DatabaseConnection, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache: TrendCache::new(cache_ttl),
        }
    }

    pub async fn get_trends(&self, filter: &TrendFilter) -> Result<Vec<TrendRow>, TrendQueryError> {
        let key = filter.cache_key();
        if let Some(rows) = self.cache.get(&key).await {
            debug!("trend cache hit for {key}");
            return Ok(rows);
        }

        let rows = self.query(filter).await?;
        self.cache.put(key, rows.clone()).await;
        Ok(rows)
    }

    /// Grouped aggregate over scan history: sum of asset costs per provider
    /// and calendar month. All filter values are bound parameters.
    async fn query(&self, filter: &TrendFilter) -> Result<Vec<TrendRow>, TrendQueryError> {
        let since = Utc::now()
            .checked_sub_months(Months::new(filter.months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut query = scan_records::Entity::find()
            .select_only()
            .column(scan_records::Column::Provider)
            .column_as(Expr::cust("strftime('%Y-%m', scanned_at)"), "month")
            .column_as(scan_records::Column::CostThisMonth.sum(), "total_cost")
            .filter(scan_records::Column::ScannedAt.gte(since))
            .group_by(scan_records::Column::Provider)
            .group_by(Expr::cust("strftime('%Y-%m', scanned_at)"))
            .order_by_asc(scan_records::Column::Provider)
            .order_by_asc(Expr::cust("month"));

        if let Some(providers) = &filter.providers {
            let names: Vec<String> = providers.iter().map(|p| p.as_str().to_string()).collect();
            query = query.filter(scan_records::Column::Provider.is_in(names));
        }
        if let Some(region) = &filter.region {
            query = query.filter(scan_records::Column::Region.eq(region.clone()));
        }
        if let Some(service) = &filter.service {
            query = query.filter(scan_records::Column::Service.eq(service.clone()));
        }

        let rows = query.into_model::<MonthlyCostRow>().all(&self.db).await?;
        compute_percent_changes(rows)
    }
}

/// Month-over-month change per provider. The first row of each provider's
/// series has no prior value, so its percent change is 0 by definition; a
/// zero-cost prior month also yields 0 rather than a division by zero.
fn compute_percent_changes(rows: Vec<MonthlyCostRow>) -> Result<Vec<TrendRow>, TrendQueryError> {
    let mut out = Vec::with_capacity(rows.len());
    let mut previous: Option<(String, f64)> = None;
    for row in rows {
        let percent_change = match &previous {
            Some((provider, prior)) if *provider == row.provider && *prior != 0.0 => {
                (row.total_cost - prior) / prior * 100.0
            }
            _ => 0.0,
        };
        previous = Some((row.provider.clone(), row.total_cost));
        out.push(TrendRow {
            provider: Provider::from_str(&row.provider)
                .map_err(TrendQueryError::InvalidRow)?,
            month: row.month,
            total_cost: row.total_cost,
            percent_change,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(provider: &str, month: &str, total_cost: f64) -> MonthlyCostRow {
        MonthlyCostRow {
            provider: provider.to_string(),
            month: month.to_string(),
            total_cost,
        }
    }

    #[test]
    fn percent_change_starts_at_zero_then_tracks_the_series() {
        let rows = vec![
            row("aws", "2026-06", 100.0),
            row("aws", "2026-07", 150.0),
            row("aws", "2026-08", 120.0),
        ];
        let trends = compute_percent_changes(rows).unwrap();
        let changes: Vec<f64> = trends.iter().map(|t| t.percent_change).collect();
        assert_eq!(changes, vec![0.0, 50.0, -20.0]);
    }

    #[test]
    fn percent_change_resets_between_providers() {
        let rows = vec![
            row("aws", "2026-07", 100.0),
            row("aws", "2026-08", 110.0),
            row("gcp", "2026-07", 50.0),
            row("gcp", "2026-08", 25.0),
        ];
        let trends = compute_percent_changes(rows).unwrap();
        assert_eq!(trends[2].percent_change, 0.0);
        assert_eq!(trends[3].percent_change, -50.0);
    }

    #[test]
    fn zero_cost_prior_month_yields_zero_change() {
        let rows = vec![row("aws", "2026-07", 0.0), row("aws", "2026-08", 10.0)];
        let trends = compute_percent_changes(rows).unwrap();
        assert_eq!(trends[1].percent_change, 0.0);
    }

    #[test]
    fn cache_key_ignores_provider_ordering() {
        let a = TrendFilter {
            providers: Some(vec![Provider::Gcp, Provider::Aws]),
            ..Default::default()
        };
        let b = TrendFilter {
            providers: Some(vec![Provider::Aws, Provider::Gcp]),
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_filters() {
        let base = TrendFilter::default();
        let narrowed = TrendFilter {
            service: Some("compute".to_string()),
            ..Default::default()
        };
        assert_ne!(base.cache_key(), narrowed.cache_key());
    }

    #[tokio::test]
    async fn cache_honors_its_ttl() {
        let cache = TrendCache::new(Duration::from_millis(40));
        cache.put("k".to_string(), Vec::new()).await;
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_disables_the_cache() {
        let cache = TrendCache::new(Duration::ZERO);
        cache.put("k".to_string(), Vec::new()).await;
        assert!(cache.get("k").await.is_none());
    }
}
