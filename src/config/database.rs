//! Database configuration module for the voucher ledger.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`; the composite unique indexes that the
//! entity macros cannot express are created explicitly afterwards. Every
//! statement is `IF NOT EXISTS`, so opening an existing ledger file is safe.

use crate::entities::{
    AuditLog, Budget, BudgetAllocation, BudgetAllocationColumn, Earmark, EarmarkAllocation,
    EarmarkAllocationColumn, SequenceCounter, SequenceCounterColumn, Setting, Tag, Voucher,
    VoucherColumn, VoucherFile, VoucherTag,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

/// Default location of the ledger database when nothing else is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger.sqlite?mode=rwc";

/// Establishes a connection to the given database URL.
///
/// The connection is owned by the caller and handed to every core function;
/// nothing in the crate keeps a global handle.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to {database_url}");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all ledger tables and unique indexes.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // Parents before children so foreign keys resolve in declaration order
    let tables = [
        schema.create_table_from_entity(Setting),
        schema.create_table_from_entity(SequenceCounter),
        schema.create_table_from_entity(Budget),
        schema.create_table_from_entity(Earmark),
        schema.create_table_from_entity(Voucher),
        schema.create_table_from_entity(BudgetAllocation),
        schema.create_table_from_entity(EarmarkAllocation),
        schema.create_table_from_entity(Tag),
        schema.create_table_from_entity(VoucherTag),
        schema.create_table_from_entity(VoucherFile),
        schema.create_table_from_entity(AuditLog),
    ];

    for mut table in tables {
        table.if_not_exists();
        db.execute(builder.build(&table)).await?;
    }

    for index in unique_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Ledger schema is up to date");
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("ux_vouchers_year_sphere_seq")
            .table(Voucher)
            .col(VoucherColumn::FiscalYear)
            .col(VoucherColumn::Sphere)
            .col(VoucherColumn::SeqNo)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ux_sequence_counters_year_sphere")
            .table(SequenceCounter)
            .col(SequenceCounterColumn::FiscalYear)
            .col(SequenceCounterColumn::Sphere)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ux_budget_allocations_voucher_budget")
            .table(BudgetAllocation)
            .col(BudgetAllocationColumn::VoucherId)
            .col(BudgetAllocationColumn::BudgetId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ux_earmark_allocations_voucher_earmark")
            .table(EarmarkAllocation)
            .col(EarmarkAllocationColumn::VoucherId)
            .col(EarmarkAllocationColumn::EarmarkId)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

/// Quick read against every table, used after start-up.
pub async fn verify_tables(db: &DatabaseConnection) -> Result<()> {
    use sea_orm::QuerySelect;

    Voucher::find().limit(1).all(db).await?;
    BudgetAllocation::find().limit(1).all(db).await?;
    EarmarkAllocation::find().limit(1).all(db).await?;
    SequenceCounter::find().limit(1).all(db).await?;
    AuditLog::find().limit(1).all(db).await?;
    Setting::find().limit(1).all(db).await?;
    Ok(())
}
