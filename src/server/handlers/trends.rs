use std::str::FromStr;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::error;

use crate::model::Provider;
use crate::server::app::AppState;
use crate::services::TrendFilter;

/// GET /api/v1/trends?provider=aws&provider=gcp&region=..&service=..&months=..
///
/// `provider` repeats; the other parameters take a single value, last one
/// wins.
pub async fn get_trends(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let filter = filter_from_params(&params)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))))?;

    let rows = state.trends.get_trends(&filter).await.map_err(|e| {
        error!("trend query failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(Json(json!({ "trends": rows })))
}

fn filter_from_params(params: &[(String, String)]) -> Result<TrendFilter, String> {
    let mut filter = TrendFilter::default();
    let mut providers: Vec<Provider> = Vec::new();

    for (name, value) in params {
        match name.as_str() {
            "provider" => providers.push(Provider::from_str(value)?),
            "region" => filter.region = Some(value.clone()),
            "service" => filter.service = Some(value.clone()),
            "months" => {
                filter.months = value
                    .parse()
                    .map_err(|_| format!("invalid months value: {value:?}"))?;
            }
            other => return Err(format!("unknown query parameter: {other:?}")),
        }
    }

    if !providers.is_empty() {
        filter.providers = Some(providers);
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn repeated_provider_params_accumulate() {
        let filter =
            filter_from_params(&params(&[("provider", "aws"), ("provider", "gcp")])).unwrap();
        assert_eq!(
            filter.providers,
            Some(vec![Provider::Aws, Provider::Gcp])
        );
        assert_eq!(filter.months, crate::services::DEFAULT_TREND_MONTHS);
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        assert!(filter_from_params(&params(&[("order", "asc")])).is_err());
        assert!(filter_from_params(&params(&[("months", "soon")])).is_err());
        assert!(filter_from_params(&params(&[("provider", "oracle")])).is_err());
    }
}
