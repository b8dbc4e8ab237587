//! Scan history persistence.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::debug;

use crate::database::entities::scan_records;
use crate::error::PersistenceError;
use crate::model::{AssetRecord, Provider, ScanType};

/// Appends normalized assets to the scan-history table. Rows are keyed by
/// (provider, resource, scan type, hour bucket); replaying an identical
/// batch inserts nothing, which makes concurrent callers safe without any
/// application-level locking.
#[derive(Clone)]
pub struct ScanHistory {
    db: DatabaseConnection,
}

impl ScanHistory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Appends one row per asset, skipping rows that collide on the
    /// uniqueness key. Returns how many rows were actually inserted.
    pub async fn record(
        &self,
        provider: Provider,
        assets: &[AssetRecord],
        scan_type: ScanType,
        scanned_at: DateTime<Utc>,
    ) -> Result<u64, PersistenceError> {
        if assets.is_empty() {
            return Ok(0);
        }

        let bucket = bucket_for(scanned_at);
        let mut rows = Vec::with_capacity(assets.len());
        for asset in assets {
            rows.push(scan_records::ActiveModel {
                provider: Set(provider.as_str().to_string()),
                resource_id: Set(asset.resource_id.clone()),
                service: Set(asset.service.clone()),
                region: Set(asset.region.clone()),
                status: Set(asset.status.as_str().to_string()),
                tags: Set(serde_json::to_string(&asset.tags)?),
                connected_assets: Set(serde_json::to_string(&asset.connected_assets)?),
                cost_this_month: Set(asset.cost_this_month),
                scan_type: Set(scan_type.as_str().to_string()),
                bucket: Set(bucket.clone()),
                scanned_at: Set(scanned_at),
                ..Default::default()
            });
        }

        let inserted = scan_records::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    scan_records::Column::Provider,
                    scan_records::Column::ResourceId,
                    scan_records::Column::ScanType,
                    scan_records::Column::Bucket,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(
            "recorded {inserted} of {} {provider} assets into bucket {bucket}",
            assets.len()
        );
        Ok(inserted)
    }

    /// Most recent batch per provider, for the dashboard inventory view.
    pub async fn latest_assets(&self) -> Result<Vec<scan_records::Model>, PersistenceError> {
        let mut out = Vec::new();
        for provider in Provider::ALL {
            let newest = scan_records::Entity::find()
                .filter(scan_records::Column::Provider.eq(provider.as_str()))
                .order_by_desc(scan_records::Column::ScannedAt)
                .one(&self.db)
                .await?;
            if let Some(row) = newest {
                let batch = scan_records::Entity::find()
                    .filter(scan_records::Column::Provider.eq(provider.as_str()))
                    .filter(scan_records::Column::Bucket.eq(row.bucket.clone()))
                    .all(&self.db)
                    .await?;
                out.extend(batch);
            }
        }
        Ok(out)
    }
}

fn bucket_for(scanned_at: DateTime<Utc>) -> String {
    scanned_at.format("%Y-%m-%dT%H").to_string()
}
