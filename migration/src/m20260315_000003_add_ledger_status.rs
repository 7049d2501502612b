// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 加载台账增加状态与错误列
///
/// 永久失败的落地文件以 `failed` 状态入账，后续运行不再重试。
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite only accepts one column per ALTER TABLE
        manager
            .alter_table(
                Table::alter()
                    .table(RawLoadLedger::Table)
                    .add_column(
                        ColumnDef::new(RawLoadLedger::Status)
                            .string()
                            .not_null()
                            .default("loaded"),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(RawLoadLedger::Table)
                    .add_column(ColumnDef::new(RawLoadLedger::Error).text().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(RawLoadLedger::Table)
                    .drop_column(RawLoadLedger::Error)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(RawLoadLedger::Table)
                    .drop_column(RawLoadLedger::Status)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum RawLoadLedger {
    Table,
    Status,
    Error,
}
