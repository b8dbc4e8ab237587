//! Common shapes every provider adapter normalizes into.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking cost sums across grouping dimensions.
pub const COST_EPSILON: f64 = 1e-6;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
    /// Hand-entered assets; never scanned against a vendor API.
    Manual,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Aws,
        Provider::Azure,
        Provider::Gcp,
        Provider::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
            Provider::Manual => "manual",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "gcp" => Ok(Provider::Gcp),
            "manual" => Ok(Provider::Manual),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Running,
    Stopped,
    Terminated,
    Unknown,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Running => "running",
            AssetStatus::Stopped => "stopped",
            AssetStatus::Terminated => "terminated",
            AssetStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanType {
    Scheduled,
    OnDemand,
    Sample,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Scheduled => "scheduled",
            ScanType::OnDemand => "on-demand",
            ScanType::Sample => "sample",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered cloud resource at scan time. Produced fresh on every scan
/// and never mutated after the scan completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Provider-native identifier; not globally unique across providers.
    pub resource_id: String,
    pub provider: Provider,
    /// Normalized service category, e.g. "compute", "object-storage".
    pub service: String,
    /// Provider-specific region naming, retained as-is.
    pub region: String,
    /// "key:value" pairs; insertion order carries no meaning.
    pub tags: Vec<String>,
    /// Even-split share of this service's month-to-date cost.
    pub cost_this_month: f64,
    pub status: AssetStatus,
    /// Weak references to other resource ids; best-effort display graph,
    /// never an ownership relation and never the record's own id.
    pub connected_assets: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

/// Output of one provider adapter invocation.
///
/// `total_cost` matches the sum of `cost_by_service` within tolerance. The
/// service and region maps group the same billing rows along different
/// dimensions, so their sums are not required to agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub provider: Provider,
    pub assets: Vec<AssetRecord>,
    pub total_cost: f64,
    pub cost_by_service: BTreeMap<String, f64>,
    pub cost_by_region: BTreeMap<String, f64>,
    pub scan_timestamp: DateTime<Utc>,
}

/// Aggregate cost view across providers. Service and region keys that
/// collide across providers are summed into the same bucket on purpose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub cost_by_provider: BTreeMap<Provider, f64>,
    pub cost_by_service: BTreeMap<String, f64>,
    pub cost_by_region: BTreeMap<String, f64>,
    pub monthly_trend: Vec<MonthlyCost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCost {
    /// Calendar month, "YYYY-MM".
    pub month: String,
    pub cost: f64,
}

/// One month of one provider's cost history. `percent_change` is relative to
/// the immediately preceding month for the same provider; the first row per
/// provider is exactly 0 since there is no prior value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub provider: Provider,
    pub month: String,
    pub total_cost: f64,
    pub percent_change: f64,
}
