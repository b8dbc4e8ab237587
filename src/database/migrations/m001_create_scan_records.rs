use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScanRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScanRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScanRecords::Provider).string().not_null())
                    .col(ColumnDef::new(ScanRecords::ResourceId).string().not_null())
                    .col(ColumnDef::new(ScanRecords::Service).string().not_null())
                    .col(ColumnDef::new(ScanRecords::Region).string().not_null())
                    .col(ColumnDef::new(ScanRecords::Status).string().not_null())
                    .col(ColumnDef::new(ScanRecords::Tags).text().not_null())
                    .col(
                        ColumnDef::new(ScanRecords::ConnectedAssets)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScanRecords::CostThisMonth)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(ScanRecords::ScanType).string().not_null())
                    .col(ColumnDef::new(ScanRecords::Bucket).string().not_null())
                    .col(ColumnDef::new(ScanRecords::ScannedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Idempotent replay: repeated writes for the same resource in the
        // same hour bucket collide here and are skipped.
        manager
            .create_index(
                Index::create()
                    .name("idx_scan_records_dedup")
                    .table(ScanRecords::Table)
                    .col(ScanRecords::Provider)
                    .col(ScanRecords::ResourceId)
                    .col(ScanRecords::ScanType)
                    .col(ScanRecords::Bucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scan_records_scanned_at")
                    .table(ScanRecords::Table)
                    .col(ScanRecords::ScannedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScanRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScanRecords {
    Table,
    Id,
    Provider,
    ResourceId,
    Service,
    Region,
    Status,
    Tags,
    ConnectedAssets,
    CostThisMonth,
    ScanType,
    Bucket,
    ScannedAt,
}
