use sea_orm::DbErr;
use thiserror::Error;

use crate::model::Provider;

/// A single provider's scan failed. One adapter failure never fails the
/// whole aggregation; the scan service downgrades this into a partial
/// outcome entry.
#[derive(Debug, Error)]
#[error("{provider} scan failed: {message}")]
pub struct ProviderScanError {
    pub provider: Provider,
    pub message: String,
}

impl ProviderScanError {
    pub fn new(provider: Provider, source: anyhow::Error) -> Self {
        Self {
            provider,
            message: format!("{source:#}"),
        }
    }
}

/// Scan history write failures. Reported separately from scan failures so a
/// successful scan whose persistence failed is never presented as a failed
/// scan.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("scan history write failed: {0}")]
    Database(#[from] DbErr),
    #[error("failed to encode scan record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TrendQueryError {
    #[error("trend query failed: {0}")]
    Query(#[from] DbErr),
    #[error("invalid provider value in scan history: {0}")]
    InvalidRow(String),
}

/// Raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
    #[error("incomplete credentials for {provider}: {detail}")]
    IncompleteCredentials {
        provider: Provider,
        detail: &'static str,
    },
    #[error("invalid credentials for {provider}: {reason}")]
    InvalidCredentials { provider: Provider, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Failures that occur before the per-provider fan-out is dispatched. Once
/// the fan-out starts, provider failures become partial-outcome entries
/// instead of errors.
#[derive(Debug, Error)]
pub enum ScanDispatchError {
    #[error("no providers requested and none configured")]
    NoProviders,
    #[error("provider {0} cannot be scanned")]
    NotScannable(Provider),
    #[error("provider {0} has no credentials configured")]
    NotConfigured(Provider),
    #[error("a scan for [{0}] is already in progress")]
    AlreadyRunning(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
