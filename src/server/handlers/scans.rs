use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ScanDispatchError;
use crate::model::{MonthlyCost, Provider, ScanType};
use crate::providers::adapter_from_credentials;
use crate::server::app::AppState;
use crate::services::scan_service::ScanOutcome;
use crate::services::TrendFilter;

#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    /// Subset of providers to scan; omitted means every configured provider.
    pub providers: Option<Vec<Provider>>,
}

pub async fn scan_all(
    State(state): State<AppState>,
    body: Option<Json<ScanRequest>>,
) -> Result<Json<ScanOutcome>, (StatusCode, Json<Value>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let providers: Vec<Provider> = match request.providers {
        Some(list) => list.into_iter().collect::<BTreeSet<_>>().into_iter().collect(),
        None => state.settings.configured_providers(),
    };

    let mut adapters = Vec::with_capacity(providers.len());
    for provider in &providers {
        let adapter = state
            .settings
            .adapter_for(*provider)
            .map_err(dispatch_error)?;
        adapters.push(adapter);
    }

    let mut outcome = state
        .scans
        .scan_all(adapters, ScanType::OnDemand)
        .await
        .map_err(dispatch_error)?;

    attach_monthly_trend(&state, &providers, &mut outcome).await;
    Ok(Json(outcome))
}

pub async fn scan_provider(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(credentials): Json<Value>,
) -> Result<Json<ScanOutcome>, (StatusCode, Json<Value>)> {
    let provider = Provider::from_str(&provider)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))))?;

    let adapter = adapter_from_credentials(provider, credentials)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;

    let mut outcome = state
        .scans
        .scan_all(vec![adapter], ScanType::OnDemand)
        .await
        .map_err(dispatch_error)?;

    attach_monthly_trend(&state, &[provider], &mut outcome).await;
    Ok(Json(outcome))
}

/// Fills `cost_summary.monthly_trend` from scan history. Best effort: a
/// trend query failure degrades to an empty trend, never a failed scan.
async fn attach_monthly_trend(state: &AppState, providers: &[Provider], outcome: &mut ScanOutcome) {
    let filter = TrendFilter {
        providers: Some(providers.to_vec()),
        ..TrendFilter::default()
    };
    match state.trends.get_trends(&filter).await {
        Ok(rows) => {
            let mut by_month: BTreeMap<String, f64> = BTreeMap::new();
            for row in rows {
                *by_month.entry(row.month).or_insert(0.0) += row.total_cost;
            }
            outcome.cost_summary.monthly_trend = by_month
                .into_iter()
                .map(|(month, cost)| MonthlyCost { month, cost })
                .collect();
        }
        Err(e) => warn!("could not load monthly trend for scan response: {e}"),
    }
}

fn dispatch_error(err: ScanDispatchError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ScanDispatchError::AlreadyRunning(_) => StatusCode::CONFLICT,
        ScanDispatchError::NoProviders
        | ScanDispatchError::NotScannable(_)
        | ScanDispatchError::NotConfigured(_)
        | ScanDispatchError::Config(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "error": err.to_string() })))
}
