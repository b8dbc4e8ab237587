use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only scan history. Rows are never updated in place; replays into
/// the same (provider, resource, scan type, hour bucket) are skipped by the
/// unique index.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scan_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub provider: String,
    pub resource_id: String,
    pub service: String,
    pub region: String,
    pub status: String,
    /// JSON array of "key:value" strings.
    pub tags: String,
    /// JSON array of connected resource ids.
    pub connected_assets: String,
    pub cost_this_month: f64,
    pub scan_type: String,
    /// Scan timestamp truncated to the hour, "YYYY-MM-DDTHH".
    pub bucket: String,
    pub scanned_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
