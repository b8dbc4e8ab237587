//! Google Cloud adapter.
//!
//! Inventory comes from the Cloud Asset API. Google exposes no month-to-date
//! spend endpoint, so cost comes from the standard billing export table in
//! BigQuery when one is configured; without it the scan reports an empty
//! breakdown.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ConfigError, ProviderScanError};
use crate::model::{AssetRecord, AssetStatus, Provider, ScanResult};
use crate::providers::{
    assemble_scan_result, cost_map, CostBreakdown, CostGroup, ProviderAdapter,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct GcpCredentials {
    pub project_id: String,
    pub access_token: String,
    /// Fully-qualified billing export table, e.g.
    /// `my-project.billing.gcp_billing_export_v1_XXXX`.
    #[serde(default)]
    pub billing_export_table: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl GcpCredentials {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.is_empty() {
            return Err(ConfigError::IncompleteCredentials {
                provider: Provider::Gcp,
                detail: "project_id is empty",
            });
        }
        if self.access_token.is_empty() {
            return Err(ConfigError::IncompleteCredentials {
                provider: Provider::Gcp,
                detail: "access_token is empty",
            });
        }
        // The table name is spliced into the query text (BigQuery cannot
        // parameterize table references), so restrict its alphabet.
        if let Some(table) = &self.billing_export_table {
            if !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            {
                return Err(ConfigError::InvalidCredentials {
                    provider: Provider::Gcp,
                    reason: format!("billing_export_table {table:?} contains invalid characters"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAsset {
    pub name: String,
    pub asset_type: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[async_trait]
pub trait GcpApi: Send + Sync {
    async fn list_resources(&self) -> anyhow::Result<Vec<RawAsset>>;
    async fn month_to_date_cost(&self) -> anyhow::Result<CostBreakdown>;
}

pub struct GcpRestApi {
    http: reqwest::Client,
    credentials: GcpCredentials,
}

impl GcpRestApi {
    pub fn new(credentials: GcpCredentials) -> Result<Self, ConfigError> {
        credentials.validate()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http, credentials })
    }

    fn endpoint(&self, default_host: &str) -> String {
        self.credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{default_host}"))
    }

    async fn billing_query(
        &self,
        table: &str,
        group_expr: &str,
    ) -> anyhow::Result<Vec<CostGroup>> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.endpoint("bigquery.googleapis.com"),
            self.credentials.project_id
        );
        let query = format!(
            "SELECT {group_expr} AS grp, SUM(cost) AS amount FROM `{table}` \
             WHERE invoice.month = @month GROUP BY grp"
        );
        let body = json!({
            "query": query,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": [{
                "name": "month",
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": Utc::now().format("%Y%m").to_string() },
            }],
        });
        let response: Value = self
            .http
            .post(&url)
            .bearer_auth(&self.credentials.access_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut groups = Vec::new();
        for row in response["rows"].as_array().unwrap_or(&Vec::new()) {
            let fields = row["f"].as_array().cloned().unwrap_or_default();
            let key = fields
                .first()
                .and_then(|f| f["v"].as_str())
                .unwrap_or_default()
                .to_string();
            let amount = fields
                .get(1)
                .and_then(|f| f["v"].as_str())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0);
            groups.push(CostGroup { key, amount });
        }
        Ok(groups)
    }
}

#[async_trait]
impl GcpApi for GcpRestApi {
    async fn list_resources(&self) -> anyhow::Result<Vec<RawAsset>> {
        let base = format!(
            "{}/v1/projects/{}/assets?contentType=RESOURCE&pageSize=500",
            self.endpoint("cloudasset.googleapis.com"),
            self.credentials.project_id
        );
        let mut assets = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = match &page_token {
                Some(token) => format!("{base}&pageToken={token}"),
                None => base.clone(),
            };
            let response: ListAssetsResponse = self
                .http
                .get(&url)
                .bearer_auth(&self.credentials.access_token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            for wire in response.assets {
                let resource = wire.resource.unwrap_or_default();
                let data = resource.data.unwrap_or(Value::Null);
                let labels = data["labels"]
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| {
                                v.as_str().map(|v| (k.clone(), v.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                assets.push(RawAsset {
                    name: wire.name,
                    asset_type: wire.asset_type,
                    location: resource.location,
                    status: data["status"].as_str().map(str::to_string),
                    labels,
                });
            }
            match response.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(assets)
    }

    async fn month_to_date_cost(&self) -> anyhow::Result<CostBreakdown> {
        let Some(table) = self.credentials.billing_export_table.clone() else {
            warn!("gcp billing export table not configured, reporting zero cost");
            return Ok(CostBreakdown::default());
        };
        let by_service = self.billing_query(&table, "service.description").await?;
        let by_region = self.billing_query(&table, "location.location").await?;
        Ok(CostBreakdown {
            by_service,
            by_region,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListAssetsResponse {
    #[serde(default)]
    assets: Vec<WireAsset>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    name: String,
    #[serde(rename = "assetType")]
    asset_type: String,
    #[serde(default)]
    resource: Option<WireResource>,
}

#[derive(Debug, Default, Deserialize)]
struct WireResource {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

pub struct GcpAdapter {
    api: Arc<dyn GcpApi>,
    project_id: String,
}

impl GcpAdapter {
    pub fn new(credentials: GcpCredentials) -> Result<Self, ConfigError> {
        let project_id = credentials.project_id.clone();
        Ok(Self {
            api: Arc::new(GcpRestApi::new(credentials)?),
            project_id,
        })
    }

    pub fn with_api(api: Arc<dyn GcpApi>, project_id: impl Into<String>) -> Self {
        Self {
            api,
            project_id: project_id.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GcpAdapter {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    async fn scan(&self) -> Result<ScanResult, ProviderScanError> {
        let resources = self
            .api
            .list_resources()
            .await
            .map_err(|e| ProviderScanError::new(Provider::Gcp, e))?;
        let costs = self
            .api
            .month_to_date_cost()
            .await
            .map_err(|e| ProviderScanError::new(Provider::Gcp, e))?;

        let assets = resources
            .into_iter()
            .map(|raw| normalize_resource(raw, &self.project_id))
            .collect();
        let by_service = cost_map(costs.by_service, normalize_service);
        let by_region = cost_map(costs.by_region, |r| r.to_ascii_lowercase());
        Ok(assemble_scan_result(
            Provider::Gcp,
            assets,
            by_service,
            by_region,
        ))
    }
}

fn normalize_resource(raw: RawAsset, project_id: &str) -> AssetRecord {
    let mut tags: Vec<String> = raw
        .labels
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect();
    // The project scopes connection inference within a region.
    tags.push(format!("project:{project_id}"));
    let status = raw
        .status
        .as_deref()
        .map(normalize_status)
        .unwrap_or(AssetStatus::Unknown);
    AssetRecord {
        resource_id: raw.name,
        provider: Provider::Gcp,
        service: normalize_service(&raw.asset_type),
        region: raw.location.unwrap_or_else(|| "global".to_string()),
        tags,
        cost_this_month: 0.0,
        status,
        connected_assets: BTreeSet::new(),
        last_updated: Utc::now(),
    }
}

/// Maps asset types and billing service descriptions onto the dashboard's
/// categories. Unknown values keep the vendor name, lowercased.
fn normalize_service(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compute.googleapis.com/instance" | "compute engine" => "compute",
        "compute.googleapis.com/disk" => "block-storage",
        "storage.googleapis.com/bucket" | "cloud storage" => "object-storage",
        "sqladmin.googleapis.com/instance" | "cloud sql" => "database",
        "bigtableadmin.googleapis.com/instance" | "cloud bigtable" => "database",
        "run.googleapis.com/service" | "cloud run" => "serverless",
        "cloudfunctions.googleapis.com/function" | "cloud functions" => "serverless",
        "redis.googleapis.com/instance" | "memorystore for redis" => "cache",
        other => return other.to_string(),
    }
    .to_string()
}

/// GCP reports stopped instances as TERMINATED; a deleted resource never
/// appears in the asset inventory at all.
fn normalize_status(status: &str) -> AssetStatus {
    match status.to_ascii_uppercase().as_str() {
        "RUNNING" | "READY" => AssetStatus::Running,
        "TERMINATED" | "SUSPENDED" | "STOPPING" | "SUSPENDING" => AssetStatus::Stopped,
        _ => AssetStatus::Unknown,
    }
}
