use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_master_tables::Migration),
            Box::new(m20240101_000002_create_stock_balances_table::Migration),
            Box::new(m20240101_000003_create_stock_ledger_entries_table::Migration),
            Box::new(m20240101_000004_create_stock_movements_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_stock_master_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_master_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Matches entities/stock_item.rs
            manager
                .create_table(
                    Table::create()
                        .table(StockItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockItems::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockItems::ItemCode).string().not_null())
                        .col(ColumnDef::new(StockItems::Description).string().null())
                        .col(
                            ColumnDef::new(StockItems::TracksBatch)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockItems::TracksSerial)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockItems::AllowsNegativeStock)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockItems::ValuationMethod)
                                .string_len(16)
                                .not_null()
                                .default("FIFO"),
                        )
                        .col(
                            ColumnDef::new(StockItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(StockItems::TenantId)
                                .col(StockItems::ItemCode),
                        )
                        .to_owned(),
                )
                .await?;

            // Matches entities/stock_location.rs
            manager
                .create_table(
                    Table::create()
                        .table(StockLocations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockLocations::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLocations::LocationCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLocations::Name).string().null())
                        .col(
                            ColumnDef::new(StockLocations::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StockLocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLocations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(StockLocations::TenantId)
                                .col(StockLocations::LocationCode),
                        )
                        .to_owned(),
                )
                .await?;

            // Matches entities/stock_batch.rs
            manager
                .create_table(
                    Table::create()
                        .table(StockBatches::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockBatches::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockBatches::ItemCode).string().not_null())
                        .col(ColumnDef::new(StockBatches::BatchId).string().not_null())
                        .col(ColumnDef::new(StockBatches::ManufacturingDate).date().null())
                        .col(ColumnDef::new(StockBatches::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(StockBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(StockBatches::TenantId)
                                .col(StockBatches::ItemCode)
                                .col(StockBatches::BatchId),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockItems {
        Table,
        TenantId,
        ItemCode,
        Description,
        TracksBatch,
        TracksSerial,
        AllowsNegativeStock,
        ValuationMethod,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockLocations {
        Table,
        TenantId,
        LocationCode,
        Name,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockBatches {
        Table,
        TenantId,
        ItemCode,
        BatchId,
        ManufacturingDate,
        ExpiryDate,
        CreatedAt,
    }
}

mod m20240101_000002_create_stock_balances_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_balances_table"
        }
    }

    fn quantity(column: StockBalances) -> ColumnDef {
        ColumnDef::new(column)
            .decimal()
            .not_null()
            .default(0)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Matches entities/stock_balance.rs; the composite key keeps one row per key
            manager
                .create_table(
                    Table::create()
                        .table(StockBalances::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockBalances::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockBalances::ItemCode).string().not_null())
                        .col(
                            ColumnDef::new(StockBalances::LocationCode)
                                .string()
                                .not_null(),
                        )
                        .col(quantity(StockBalances::OnHand))
                        .col(quantity(StockBalances::Reserved))
                        .col(quantity(StockBalances::OnOrder))
                        .col(quantity(StockBalances::Planned))
                        .col(quantity(StockBalances::Available))
                        .col(quantity(StockBalances::Projected))
                        .col(quantity(StockBalances::ValuationRate))
                        .col(quantity(StockBalances::StockValue))
                        .col(
                            ColumnDef::new(StockBalances::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(StockBalances::TenantId)
                                .col(StockBalances::ItemCode)
                                .col(StockBalances::LocationCode),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_balances_location")
                        .table(StockBalances::Table)
                        .col(StockBalances::TenantId)
                        .col(StockBalances::LocationCode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBalances::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockBalances {
        Table,
        TenantId,
        ItemCode,
        LocationCode,
        OnHand,
        Reserved,
        OnOrder,
        Planned,
        Available,
        Projected,
        ValuationRate,
        StockValue,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_stock_ledger_entries_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_ledger_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Matches entities/stock_ledger_entry.rs; id is the insertion sequence
            manager
                .create_table(
                    Table::create()
                        .table(StockLedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLedgerEntries::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::ItemCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::LocationCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::PostingDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::PostingTime)
                                .time()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::QuantityDelta)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::BalanceAfter)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::IncomingRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::OutgoingRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::ValueDelta)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::ValueAfter)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::CausingDocumentType)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::CausingDocumentId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::LineId).uuid().null())
                        .col(ColumnDef::new(StockLedgerEntries::BatchRef).string().null())
                        .col(ColumnDef::new(StockLedgerEntries::SerialRefs).json().null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::Submitted)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::Cancelled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Chain order for one key
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_entries_key_posting")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::TenantId)
                        .col(StockLedgerEntries::ItemCode)
                        .col(StockLedgerEntries::LocationCode)
                        .col(StockLedgerEntries::PostingDate)
                        .col(StockLedgerEntries::PostingTime)
                        .col(StockLedgerEntries::Id)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_entries_causing_document")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::CausingDocumentType)
                        .col(StockLedgerEntries::CausingDocumentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLedgerEntries {
        Table,
        Id,
        TenantId,
        ItemCode,
        LocationCode,
        PostingDate,
        PostingTime,
        QuantityDelta,
        BalanceAfter,
        IncomingRate,
        OutgoingRate,
        ValueDelta,
        ValueAfter,
        CausingDocumentType,
        CausingDocumentId,
        LineId,
        BatchRef,
        SerialRefs,
        Submitted,
        Cancelled,
        CreatedAt,
    }
}

mod m20240101_000004_create_stock_movements_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_stock_movements_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Matches entities/stock_movement.rs
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::Kind).string_len(32).not_null())
                        .col(ColumnDef::new(StockMovements::PostingDate).date().not_null())
                        .col(ColumnDef::new(StockMovements::PostingTime).time().not_null())
                        .col(
                            ColumnDef::new(StockMovements::Status)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockMovements::Reference).string().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::SubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_tenant_status")
                        .table(StockMovements::Table)
                        .col(StockMovements::TenantId)
                        .col(StockMovements::Status)
                        .to_owned(),
                )
                .await?;

            // Matches entities/stock_movement_line.rs
            manager
                .create_table(
                    Table::create()
                        .table(StockMovementLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovementLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovementLines::MovementId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovementLines::LineNo)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovementLines::ItemCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovementLines::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovementLines::Rate).decimal().null())
                        .col(
                            ColumnDef::new(StockMovementLines::SourceLocation)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovementLines::TargetLocation)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovementLines::BatchRef).string().null())
                        .col(ColumnDef::new(StockMovementLines::SerialRefs).json().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movement_lines_movement_id")
                                .from(StockMovementLines::Table, StockMovementLines::MovementId)
                                .to(StockMovements::Table, StockMovements::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movement_lines_movement_id")
                        .table(StockMovementLines::Table)
                        .col(StockMovementLines::MovementId)
                        .col(StockMovementLines::LineNo)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovementLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        TenantId,
        Kind,
        PostingDate,
        PostingTime,
        Status,
        Reference,
        CreatedAt,
        UpdatedAt,
        SubmittedAt,
        CancelledAt,
    }

    #[derive(DeriveIden)]
    enum StockMovementLines {
        Table,
        Id,
        MovementId,
        LineNo,
        ItemCode,
        Quantity,
        Rate,
        SourceLocation,
        TargetLocation,
        BatchRef,
        SerialRefs,
    }
}
