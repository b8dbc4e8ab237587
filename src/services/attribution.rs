//! Cost attribution and connection inference.
//!
//! Billing APIs report cost per service, not per resource, so each service's
//! month-to-date total is split evenly across the assets discovered for that
//! service. This is a documented approximation, not per-resource billing.

use std::collections::HashMap;

use crate::model::AssetRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCategory {
    Compute,
    Storage,
    Other,
}

pub fn service_category(service: &str) -> ServiceCategory {
    match service {
        "compute" | "serverless" | "container" | "app-service" => ServiceCategory::Compute,
        "database" | "cache" => ServiceCategory::Storage,
        s if s.contains("storage") => ServiceCategory::Storage,
        _ => ServiceCategory::Other,
    }
}

/// Assigns each asset an even share of its service's cost, or 0 when the
/// service has no billing entry. Shares are clamped at zero so billing
/// credits never produce a negative asset cost.
pub fn spread_service_costs(
    assets: &mut [AssetRecord],
    cost_by_service: &std::collections::BTreeMap<String, f64>,
) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for asset in assets.iter() {
        *counts.entry(asset.service.clone()).or_insert(0) += 1;
    }

    for asset in assets.iter_mut() {
        let share = match (cost_by_service.get(&asset.service), counts.get(&asset.service)) {
            (Some(total), Some(count)) if *count > 0 => total / *count as f64,
            _ => 0.0,
        };
        asset.cost_this_month = share.max(0.0);
    }
}

/// Links compute-category assets to storage-category assets in the same
/// region, narrowed to the same resource group or project when both sides
/// carry one. The result is a display-only graph inferred from placement,
/// not from real network or dependency metadata.
pub fn infer_connections(assets: &mut [AssetRecord]) {
    let targets: Vec<(String, String, Option<String>)> = assets
        .iter()
        .filter(|a| service_category(&a.service) == ServiceCategory::Storage)
        .map(|a| (a.resource_id.clone(), a.region.clone(), scope_of(a)))
        .collect();

    for asset in assets.iter_mut() {
        if service_category(&asset.service) != ServiceCategory::Compute {
            continue;
        }
        let scope = scope_of(asset);
        for (id, region, target_scope) in &targets {
            if *id == asset.resource_id {
                continue;
            }
            let linked = match (&scope, target_scope) {
                (Some(a), Some(b)) => a == b && *region == asset.region,
                _ => *region == asset.region,
            };
            if linked {
                asset.connected_assets.insert(id.clone());
            }
        }
    }
}

fn scope_of(asset: &AssetRecord) -> Option<String> {
    asset.tags.iter().find_map(|tag| {
        tag.strip_prefix("resource_group:")
            .or_else(|| tag.strip_prefix("project:"))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::Utc;

    use super::*;
    use crate::model::{AssetStatus, Provider};

    fn asset(id: &str, service: &str, region: &str, tags: &[&str]) -> AssetRecord {
        AssetRecord {
            resource_id: id.to_string(),
            provider: Provider::Aws,
            service: service.to_string(),
            region: region.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            cost_this_month: 0.0,
            status: AssetStatus::Running,
            connected_assets: BTreeSet::new(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn splits_service_cost_evenly() {
        let mut assets = vec![
            asset("a", "compute", "us-east-1", &[]),
            asset("b", "compute", "us-east-1", &[]),
            asset("c", "compute", "us-east-1", &[]),
            asset("d", "compute", "us-east-1", &[]),
        ];
        let costs = BTreeMap::from([("compute".to_string(), 100.0)]);
        spread_service_costs(&mut assets, &costs);
        for a in &assets {
            assert_eq!(a.cost_this_month, 25.0);
        }
    }

    #[test]
    fn services_without_billing_entries_cost_zero() {
        let mut assets = vec![asset("a", "dns", "global", &[])];
        spread_service_costs(&mut assets, &BTreeMap::new());
        assert_eq!(assets[0].cost_this_month, 0.0);
    }

    #[test]
    fn billing_credits_never_go_negative() {
        let mut assets = vec![asset("a", "compute", "us-east-1", &[])];
        let costs = BTreeMap::from([("compute".to_string(), -12.0)]);
        spread_service_costs(&mut assets, &costs);
        assert_eq!(assets[0].cost_this_month, 0.0);
    }

    #[test]
    fn links_by_region_and_never_to_itself() {
        let mut assets = vec![
            asset("web", "compute", "us-east-1", &[]),
            asset("bucket", "object-storage", "us-east-1", &[]),
            asset("far-bucket", "object-storage", "eu-west-1", &[]),
        ];
        infer_connections(&mut assets);
        let web = &assets[0];
        assert!(web.connected_assets.contains("bucket"));
        assert!(!web.connected_assets.contains("far-bucket"));
        for a in &assets {
            assert!(!a.connected_assets.contains(&a.resource_id));
        }
    }

    #[test]
    fn scoping_tags_narrow_region_matches() {
        let mut assets = vec![
            asset("web", "compute", "us-east-1", &["resource_group:app"]),
            asset("near", "object-storage", "us-east-1", &["resource_group:app"]),
            asset("other", "object-storage", "us-east-1", &["resource_group:ops"]),
        ];
        infer_connections(&mut assets);
        let web = &assets[0];
        assert!(web.connected_assets.contains("near"));
        assert!(!web.connected_assets.contains("other"));
    }

    #[test]
    fn storage_never_links_to_storage() {
        let mut assets = vec![
            asset("bucket-a", "object-storage", "us-east-1", &[]),
            asset("bucket-b", "object-storage", "us-east-1", &[]),
        ];
        infer_connections(&mut assets);
        assert!(assets.iter().all(|a| a.connected_assets.is_empty()));
    }
}
