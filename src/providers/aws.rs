//! Amazon Web Services adapter.
//!
//! Inventory comes from the Resource Groups Tagging API, month-to-date spend
//! from Cost Explorer. Both calls go through the [`AwsApi`] seam so tests
//! can substitute canned responses.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ConfigError, ProviderScanError};
use crate::model::{AssetRecord, AssetStatus, Provider, ScanResult};
use crate::providers::{
    assemble_scan_result, cost_map, month_to_date_range, CostBreakdown, CostGroup,
    ProviderAdapter,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint override for emulators and request-signing proxies.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl AwsCredentials {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key_id.is_empty() {
            return Err(ConfigError::IncompleteCredentials {
                provider: Provider::Aws,
                detail: "access_key_id is empty",
            });
        }
        if self.secret_access_key.is_empty() {
            return Err(ConfigError::IncompleteCredentials {
                provider: Provider::Aws,
                detail: "secret_access_key is empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResource {
    #[serde(rename = "ResourceARN")]
    pub arn: String,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<RawTag>,
    #[serde(rename = "State", default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[async_trait]
pub trait AwsApi: Send + Sync {
    async fn list_resources(&self) -> anyhow::Result<Vec<RawResource>>;
    async fn month_to_date_cost(&self) -> anyhow::Result<CostBreakdown>;
}

pub struct AwsRestApi {
    http: reqwest::Client,
    credentials: AwsCredentials,
}

impl AwsRestApi {
    pub fn new(credentials: AwsCredentials) -> Result<Self, ConfigError> {
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
            .unwrap_or_else(|| format!("https://{default_host}/"))
    }

    async fn cost_query(&self, url: &str, dimension: &str) -> anyhow::Result<Vec<CostGroup>> {
        let (start, end) = month_to_date_range();
        let body = json!({
            "TimePeriod": { "Start": start, "End": end },
            "Granularity": "MONTHLY",
            "Metrics": ["UnblendedCost"],
            "GroupBy": [{ "Type": "DIMENSION", "Key": dimension }],
        });
        let response: GetCostAndUsageResponse = self
            .http
            .post(url)
            .header("X-Amz-Target", "AWSInsightsIndexService.GetCostAndUsage")
            .header("Content-Type", "application/x-amz-json-1.1")
            .basic_auth(
                &self.credentials.access_key_id,
                Some(&self.credentials.secret_access_key),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut groups = Vec::new();
        for period in response.results_by_time {
            for group in period.groups {
                let key = group.keys.into_iter().next().unwrap_or_default();
                let amount = group
                    .metrics
                    .get("UnblendedCost")
                    .and_then(|m| m.amount.parse().ok())
                    .unwrap_or(0.0);
                groups.push(CostGroup { key, amount });
            }
        }
        Ok(groups)
    }
}

#[async_trait]
impl AwsApi for AwsRestApi {
    async fn list_resources(&self) -> anyhow::Result<Vec<RawResource>> {
        let url = self.endpoint(&format!(
            "tagging.{}.amazonaws.com",
            self.credentials.region
        ));
        let mut resources = Vec::new();
        let mut pagination_token: Option<String> = None;
        loop {
            let mut body = json!({ "ResourcesPerPage": 100 });
            if let Some(token) = &pagination_token {
                body["PaginationToken"] = json!(token);
            }
            let response: GetResourcesResponse = self
                .http
                .post(&url)
                .header(
                    "X-Amz-Target",
                    "ResourceGroupsTaggingAPI_20170126.GetResources",
                )
                .header("Content-Type", "application/x-amz-json-1.1")
                .basic_auth(
                    &self.credentials.access_key_id,
                    Some(&self.credentials.secret_access_key),
                )
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            resources.extend(response.resource_tag_mapping_list);
            match response.pagination_token.filter(|t| !t.is_empty()) {
                Some(token) => pagination_token = Some(token),
                None => break,
            }
        }
        Ok(resources)
    }

    async fn month_to_date_cost(&self) -> anyhow::Result<CostBreakdown> {
        let url = self.endpoint("ce.us-east-1.amazonaws.com");
        let by_service = self.cost_query(&url, "SERVICE").await?;
        let by_region = self.cost_query(&url, "REGION").await?;
        Ok(CostBreakdown {
            by_service,
            by_region,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GetResourcesResponse {
    #[serde(rename = "ResourceTagMappingList", default)]
    resource_tag_mapping_list: Vec<RawResource>,
    #[serde(rename = "PaginationToken", default)]
    pagination_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetCostAndUsageResponse {
    #[serde(rename = "ResultsByTime", default)]
    results_by_time: Vec<ResultByTime>,
}

#[derive(Debug, Deserialize)]
struct ResultByTime {
    #[serde(rename = "Groups", default)]
    groups: Vec<CostGroupWire>,
}

#[derive(Debug, Deserialize)]
struct CostGroupWire {
    #[serde(rename = "Keys", default)]
    keys: Vec<String>,
    #[serde(rename = "Metrics", default)]
    metrics: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    #[serde(rename = "Amount")]
    amount: String,
}

pub struct AwsAdapter {
    api: Arc<dyn AwsApi>,
}

impl AwsAdapter {
    pub fn new(credentials: AwsCredentials) -> Result<Self, ConfigError> {
        Ok(Self {
            api: Arc::new(AwsRestApi::new(credentials)?),
        })
    }

    pub fn with_api(api: Arc<dyn AwsApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProviderAdapter for AwsAdapter {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    async fn scan(&self) -> Result<ScanResult, ProviderScanError> {
        let resources = self
            .api
            .list_resources()
            .await
            .map_err(|e| ProviderScanError::new(Provider::Aws, e))?;
        let costs = self
            .api
            .month_to_date_cost()
            .await
            .map_err(|e| ProviderScanError::new(Provider::Aws, e))?;

        let assets = resources.into_iter().map(normalize_resource).collect();
        let by_service = cost_map(costs.by_service, normalize_service);
        let by_region = cost_map(costs.by_region, |r| r.to_string());
        Ok(assemble_scan_result(Provider::Aws, assets, by_service, by_region))
    }
}

fn normalize_resource(raw: RawResource) -> AssetRecord {
    let (service, region) = parse_arn(&raw.arn);
    let status = raw
        .state
        .as_deref()
        .map(normalize_state)
        .unwrap_or(AssetStatus::Unknown);
    AssetRecord {
        resource_id: raw.arn,
        provider: Provider::Aws,
        service,
        region,
        tags: raw
            .tags
            .iter()
            .map(|t| format!("{}:{}", t.key, t.value))
            .collect(),
        cost_this_month: 0.0,
        status,
        connected_assets: BTreeSet::new(),
        last_updated: Utc::now(),
    }
}

/// `arn:aws:ec2:us-east-1:123456789012:instance/i-0abc` -> service + region.
/// S3 ARNs carry no region; those fall into the "global" bucket. EC2 ARNs
/// cover several resource kinds, so the resource prefix decides between
/// compute and block storage.
fn parse_arn(arn: &str) -> (String, String) {
    let mut parts = arn.splitn(6, ':');
    let service = parts.nth(2).unwrap_or_default();
    let region = parts.next().unwrap_or_default();
    let _account = parts.next();
    let resource = parts.next().unwrap_or_default();

    let service = if service == "ec2" {
        match resource.split('/').next().unwrap_or_default() {
            "volume" | "snapshot" => "block-storage".to_string(),
            _ => "compute".to_string(),
        }
    } else {
        normalize_service(service)
    };
    let region = if region.is_empty() {
        "global".to_string()
    } else {
        region.to_string()
    };
    (service, region)
}

/// Maps both ARN service segments and Cost Explorer service names onto the
/// dashboard's categories. Unknown services keep the vendor name, lowercased.
fn normalize_service(raw: &str) -> String {
    match raw.trim() {
        "ec2" | "Amazon Elastic Compute Cloud - Compute" | "EC2 - Other" => "compute",
        "s3" | "Amazon Simple Storage Service" => "object-storage",
        "rds" | "Amazon Relational Database Service" => "database",
        "lambda" | "AWS Lambda" => "serverless",
        "elasticache" | "Amazon ElastiCache" => "cache",
        "dynamodb" | "Amazon DynamoDB" => "database",
        other => return other.to_ascii_lowercase(),
    }
    .to_string()
}

fn normalize_state(state: &str) -> AssetStatus {
    match state.to_ascii_lowercase().as_str() {
        "running" | "available" | "active" | "in-use" => AssetStatus::Running,
        "stopped" | "stopping" => AssetStatus::Stopped,
        "terminated" | "deleted" | "shutting-down" => AssetStatus::Terminated,
        _ => AssetStatus::Unknown,
    }
}
