//! Microsoft Azure adapter.
//!
//! Inventory comes from Azure Resource Graph, month-to-date spend from the
//! Cost Management query API. Both use a caller-supplied bearer token; token
//! acquisition is outside this crate's scope.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ConfigError, ProviderScanError};
use crate::model::{AssetRecord, AssetStatus, Provider, ScanResult};
use crate::providers::{
    assemble_scan_result, cost_map, CostBreakdown, CostGroup, ProviderAdapter,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RESOURCE_GRAPH_QUERY: &str = "Resources | project id, type, location, tags, \
     powerState = properties.extended.instanceView.powerState.code";

#[derive(Debug, Clone, Deserialize)]
pub struct AzureCredentials {
    pub subscription_id: String,
    pub access_token: String,
    /// Endpoint override; defaults to the public management endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl AzureCredentials {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscription_id.is_empty() {
            return Err(ConfigError::IncompleteCredentials {
                provider: Provider::Azure,
                detail: "subscription_id is empty",
            });
        }
        if self.access_token.is_empty() {
            return Err(ConfigError::IncompleteCredentials {
                provider: Provider::Azure,
                detail: "access_token is empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(rename = "powerState", default)]
    pub power_state: Option<String>,
}

#[async_trait]
pub trait AzureApi: Send + Sync {
    async fn list_resources(&self) -> anyhow::Result<Vec<RawResource>>;
    async fn month_to_date_cost(&self) -> anyhow::Result<CostBreakdown>;
}

pub struct AzureRestApi {
    http: reqwest::Client,
    credentials: AzureCredentials,
}

impl AzureRestApi {
    pub fn new(credentials: AzureCredentials) -> Result<Self, ConfigError> {
        credentials.validate()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http, credentials })
    }

    fn endpoint(&self) -> String {
        self.credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://management.azure.com".to_string())
    }

    async fn cost_query(&self, group_by: &str) -> anyhow::Result<Vec<CostGroup>> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.CostManagement/query?api-version=2023-03-01",
            self.endpoint(),
            self.credentials.subscription_id
        );
        let body = json!({
            "type": "ActualCost",
            "timeframe": "MonthToDate",
            "dataset": {
                "granularity": "None",
                "aggregation": { "totalCost": { "name": "Cost", "function": "Sum" } },
                "grouping": [{ "type": "Dimension", "name": group_by }],
            },
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
        parse_cost_rows(&response, group_by)
    }
}

/// Cost Management returns positional rows described by a column list; pick
/// the cost and grouping columns out by name.
fn parse_cost_rows(response: &Value, group_column: &str) -> anyhow::Result<Vec<CostGroup>> {
    let properties = &response["properties"];
    let columns = properties["columns"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("cost response missing columns"))?;
    let index_of = |name: &str| {
        columns
            .iter()
            .position(|c| c["name"].as_str() == Some(name))
    };
    let cost_idx = index_of("Cost")
        .ok_or_else(|| anyhow::anyhow!("cost response missing Cost column"))?;
    let group_idx = index_of(group_column)
        .ok_or_else(|| anyhow::anyhow!("cost response missing {group_column} column"))?;

    let mut groups = Vec::new();
    for row in properties["rows"].as_array().unwrap_or(&Vec::new()) {
        let key = row
            .get(group_idx)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let amount = row.get(cost_idx).and_then(Value::as_f64).unwrap_or(0.0);
        groups.push(CostGroup { key, amount });
    }
    Ok(groups)
}

#[async_trait]
impl AzureApi for AzureRestApi {
    async fn list_resources(&self) -> anyhow::Result<Vec<RawResource>> {
        let url = format!(
            "{}/providers/Microsoft.ResourceGraph/resources?api-version=2022-10-01",
            self.endpoint()
        );
        let mut resources = Vec::new();
        let mut skip_token: Option<String> = None;
        loop {
            let mut options = json!({ "resultFormat": "objectArray" });
            if let Some(token) = &skip_token {
                options["$skipToken"] = json!(token);
            }
            let body = json!({
                "subscriptions": [self.credentials.subscription_id],
                "query": RESOURCE_GRAPH_QUERY,
                "options": options,
            });
            let response: ResourceGraphResponse = self
                .http
                .post(&url)
                .bearer_auth(&self.credentials.access_token)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            resources.extend(response.data);
            match response.skip_token.filter(|t| !t.is_empty()) {
                Some(token) => skip_token = Some(token),
                None => break,
            }
        }
        Ok(resources)
    }

    async fn month_to_date_cost(&self) -> anyhow::Result<CostBreakdown> {
        let by_service = self.cost_query("ServiceName").await?;
        let by_region = self.cost_query("ResourceLocation").await?;
        Ok(CostBreakdown {
            by_service,
            by_region,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResourceGraphResponse {
    #[serde(default)]
    data: Vec<RawResource>,
    #[serde(rename = "$skipToken", default)]
    skip_token: Option<String>,
}

pub struct AzureAdapter {
    api: Arc<dyn AzureApi>,
}

impl AzureAdapter {
    pub fn new(credentials: AzureCredentials) -> Result<Self, ConfigError> {
        Ok(Self {
            api: Arc::new(AzureRestApi::new(credentials)?),
        })
    }

    pub fn with_api(api: Arc<dyn AzureApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProviderAdapter for AzureAdapter {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    async fn scan(&self) -> Result<ScanResult, ProviderScanError> {
        let resources = self
            .api
            .list_resources()
            .await
            .map_err(|e| ProviderScanError::new(Provider::Azure, e))?;
        let costs = self
            .api
            .month_to_date_cost()
            .await
            .map_err(|e| ProviderScanError::new(Provider::Azure, e))?;

        let assets = resources.into_iter().map(normalize_resource).collect();
        let by_service = cost_map(costs.by_service, normalize_service);
        let by_region = cost_map(costs.by_region, |r| r.to_ascii_lowercase());
        Ok(assemble_scan_result(
            Provider::Azure,
            assets,
            by_service,
            by_region,
        ))
    }
}

fn normalize_resource(raw: RawResource) -> AssetRecord {
    let mut tags: Vec<String> = raw
        .tags
        .unwrap_or_default()
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect();
    // The resource group scopes connection inference within a region.
    if let Some(group) = resource_group(&raw.id) {
        tags.push(format!("resource_group:{group}"));
    }
    let status = raw
        .power_state
        .as_deref()
        .map(normalize_power_state)
        .unwrap_or(AssetStatus::Unknown);
    AssetRecord {
        resource_id: raw.id,
        provider: Provider::Azure,
        service: normalize_service(&raw.resource_type),
        region: raw.location.unwrap_or_else(|| "global".to_string()),
        tags,
        cost_this_month: 0.0,
        status,
        connected_assets: BTreeSet::new(),
        last_updated: Utc::now(),
    }
}

fn resource_group(id: &str) -> Option<String> {
    let mut parts = id.split('/');
    parts
        .by_ref()
        .find(|part| part.eq_ignore_ascii_case("resourcegroups"))?;
    parts.next().map(|s| s.to_ascii_lowercase())
}

/// Maps resource types and Cost Management service names onto the
/// dashboard's categories. Unknown values keep the vendor name, lowercased.
fn normalize_service(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let category = if lowered.starts_with("microsoft.compute/disks") {
        "block-storage"
    } else if lowered.starts_with("microsoft.compute") {
        "compute"
    } else if lowered.starts_with("microsoft.storage") {
        "object-storage"
    } else if lowered.starts_with("microsoft.sql") || lowered.starts_with("microsoft.dbfor") {
        "database"
    } else if lowered.starts_with("microsoft.cache") {
        "cache"
    } else if lowered.starts_with("microsoft.web") {
        "app-service"
    } else {
        match lowered.as_str() {
            "virtual machines" => "compute",
            "storage" => "object-storage",
            "sql database" | "azure database for postgresql" | "azure database for mysql" => {
                "database"
            }
            "azure app service" => "app-service",
            "azure cache for redis" => "cache",
            _ => return lowered,
        }
    };
    category.to_string()
}

fn normalize_power_state(state: &str) -> AssetStatus {
    match state.trim_start_matches("PowerState/") {
        "running" | "starting" => AssetStatus::Running,
        "stopped" | "stopping" | "deallocated" | "deallocating" => AssetStatus::Stopped,
        _ => AssetStatus::Unknown,
    }
}
