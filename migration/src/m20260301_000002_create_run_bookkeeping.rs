// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 运行记录与加载台账迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExtractionRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExtractionRuns::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExtractionRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExtractionRuns::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ExtractionRuns::Outcome).string().null())
                    .col(
                        ColumnDef::new(ExtractionRuns::RequestCounts)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (competition, run) applied to the raw layer
        manager
            .create_table(
                Table::create()
                    .table(RawLoadLedger::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawLoadLedger::CompetitionCode)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RawLoadLedger::RunId).big_integer().not_null())
                    .col(ColumnDef::new(RawLoadLedger::Checksum).string().not_null())
                    .col(ColumnDef::new(RawLoadLedger::RowsRead).big_integer().not_null())
                    .col(
                        ColumnDef::new(RawLoadLedger::RowsInserted)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawLoadLedger::RowsUpdated)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawLoadLedger::RowsRejected)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawLoadLedger::RowsStale)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawLoadLedger::LoadedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(RawLoadLedger::CompetitionCode)
                            .col(RawLoadLedger::RunId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RawLoadLedger::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExtractionRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExtractionRuns {
    Table,
    Id,
    StartedAt,
    FinishedAt,
    Outcome,
    RequestCounts,
}

#[derive(DeriveIden)]
enum RawLoadLedger {
    Table,
    CompetitionCode,
    RunId,
    Checksum,
    RowsRead,
    RowsInserted,
    RowsUpdated,
    RowsRejected,
    RowsStale,
    LoadedAt,
}
