//! Runtime settings, sourced from the environment.
//!
//! Parsing goes through [`Settings::from_lookup`] so tests can feed a map
//! instead of mutating process-wide environment variables. Credentials are
//! all-or-nothing per provider: a partially set credential pair is a
//! configuration error, not a silently skipped provider.

use std::sync::Arc;

use chrono::{NaiveTime, Weekday};

use crate::error::{ConfigError, ScanDispatchError};
use crate::model::Provider;
use crate::providers::{
    AwsAdapter, AwsCredentials, AzureAdapter, AzureCredentials, GcpAdapter, GcpCredentials,
    ProviderAdapter,
};
use crate::services::ScheduleConfig;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://cloudscope.db?mode=rwc";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    /// Allowed CORS origin; `None` means allow any origin.
    pub cors_origin: Option<String>,
    pub cache_ttl_secs: u64,
    pub schedule: ScheduleConfig,
    pub aws: Option<AwsCredentials>,
    pub azure: Option<AzureCredentials>,
    pub gcp: Option<GcpCredentials>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            cors_origin: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            schedule: ScheduleConfig::default(),
            aws: None,
            azure: None,
            gcp: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Settings {
            database_url: lookup("CLOUDSCOPE_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            ..Settings::default()
        };

        if let Some(port) = lookup("CLOUDSCOPE_PORT") {
            settings.port = port.parse().map_err(|_| ConfigError::InvalidVar {
                name: "CLOUDSCOPE_PORT",
                reason: format!("expected a port number, got {port:?}"),
            })?;
        }
        if let Some(ttl) = lookup("CLOUDSCOPE_CACHE_TTL_SECS") {
            settings.cache_ttl_secs = ttl.parse().map_err(|_| ConfigError::InvalidVar {
                name: "CLOUDSCOPE_CACHE_TTL_SECS",
                reason: format!("expected seconds, got {ttl:?}"),
            })?;
        }
        settings.cors_origin = lookup("CLOUDSCOPE_CORS_ORIGIN").filter(|v| !v.is_empty());

        if let Some(at) = lookup("CLOUDSCOPE_DAILY_SCAN_AT") {
            settings.schedule.daily_at = parse_time("CLOUDSCOPE_DAILY_SCAN_AT", &at)?;
        }
        if let Some(at) = lookup("CLOUDSCOPE_WEEKLY_SCAN_AT") {
            settings.schedule.weekly_at = parse_time("CLOUDSCOPE_WEEKLY_SCAN_AT", &at)?;
        }
        if let Some(day) = lookup("CLOUDSCOPE_WEEKLY_SCAN_DAY") {
            settings.schedule.weekly_day =
                day.parse::<Weekday>()
                    .map_err(|_| ConfigError::InvalidVar {
                        name: "CLOUDSCOPE_WEEKLY_SCAN_DAY",
                        reason: format!("expected a weekday name, got {day:?}"),
                    })?;
        }

        settings.aws = aws_from_lookup(&lookup)?;
        settings.azure = azure_from_lookup(&lookup)?;
        settings.gcp = gcp_from_lookup(&lookup)?;

        Ok(settings)
    }

    /// Providers with complete credentials, in a stable order.
    pub fn configured_providers(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.aws.is_some() {
            providers.push(Provider::Aws);
        }
        if self.azure.is_some() {
            providers.push(Provider::Azure);
        }
        if self.gcp.is_some() {
            providers.push(Provider::Gcp);
        }
        providers
    }

    pub fn adapter_for(
        &self,
        provider: Provider,
    ) -> Result<Arc<dyn ProviderAdapter>, ScanDispatchError> {
        match provider {
            Provider::Aws => {
                let creds = self
                    .aws
                    .clone()
                    .ok_or(ScanDispatchError::NotConfigured(provider))?;
                Ok(Arc::new(AwsAdapter::new(creds)?))
            }
            Provider::Azure => {
                let creds = self
                    .azure
                    .clone()
                    .ok_or(ScanDispatchError::NotConfigured(provider))?;
                Ok(Arc::new(AzureAdapter::new(creds)?))
            }
            Provider::Gcp => {
                let creds = self
                    .gcp
                    .clone()
                    .ok_or(ScanDispatchError::NotConfigured(provider))?;
                Ok(Arc::new(GcpAdapter::new(creds)?))
            }
            Provider::Manual => Err(ScanDispatchError::NotScannable(provider)),
        }
    }
}

fn parse_time(name: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::InvalidVar {
        name,
        reason: format!("expected HH:MM, got {value:?}"),
    })
}

fn aws_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<AwsCredentials>, ConfigError> {
    let access_key_id = lookup("AWS_ACCESS_KEY_ID");
    let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY");
    match (access_key_id, secret_access_key) {
        (None, None) => Ok(None),
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(AwsCredentials {
            access_key_id,
            secret_access_key,
            region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: lookup("CLOUDSCOPE_AWS_ENDPOINT"),
        })),
        _ => Err(ConfigError::IncompleteCredentials {
            provider: Provider::Aws,
            detail: "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must both be set",
        }),
    }
}

fn azure_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<AzureCredentials>, ConfigError> {
    let subscription_id = lookup("AZURE_SUBSCRIPTION_ID");
    let access_token = lookup("AZURE_ACCESS_TOKEN");
    match (subscription_id, access_token) {
        (None, None) => Ok(None),
        (Some(subscription_id), Some(access_token)) => Ok(Some(AzureCredentials {
            subscription_id,
            access_token,
            endpoint: lookup("CLOUDSCOPE_AZURE_ENDPOINT"),
        })),
        _ => Err(ConfigError::IncompleteCredentials {
            provider: Provider::Azure,
            detail: "AZURE_SUBSCRIPTION_ID and AZURE_ACCESS_TOKEN must both be set",
        }),
    }
}

fn gcp_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<GcpCredentials>, ConfigError> {
    let project_id = lookup("GCP_PROJECT_ID");
    let access_token = lookup("GCP_ACCESS_TOKEN");
    match (project_id, access_token) {
        (None, None) => Ok(None),
        (Some(project_id), Some(access_token)) => Ok(Some(GcpCredentials {
            project_id,
            access_token,
            billing_export_table: lookup("GCP_BILLING_EXPORT_TABLE"),
            endpoint: lookup("CLOUDSCOPE_GCP_ENDPOINT"),
        })),
        _ => Err(ConfigError::IncompleteCredentials {
            provider: Provider::Gcp,
            detail: "GCP_PROJECT_ID and GCP_ACCESS_TOKEN must both be set",
        }),
    }
}
