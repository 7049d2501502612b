// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 原始层（raw）数据表迁移
///
/// 创建比赛、球队、赛事三张原始表。表名前缀 `raw_` 对应分析库中的 raw 模式，
/// 使 PostgreSQL 与 SQLite 共享同一套迁移。
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Competitions (reference data)
        manager
            .create_table(
                Table::create()
                    .table(RawCompetitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawCompetitions::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RawCompetitions::Code).string().not_null())
                    .col(ColumnDef::new(RawCompetitions::Name).string().not_null())
                    .col(ColumnDef::new(RawCompetitions::Country).string().null())
                    .col(
                        ColumnDef::new(RawCompetitions::ExtractionRunId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawCompetitions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. Teams
        manager
            .create_table(
                Table::create()
                    .table(RawTeams::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawTeams::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RawTeams::Name).string().not_null())
                    .col(ColumnDef::new(RawTeams::ShortName).string().null())
                    .col(ColumnDef::new(RawTeams::Tla).string().null())
                    .col(ColumnDef::new(RawTeams::Country).string().null())
                    .col(
                        ColumnDef::new(RawTeams::ExtractionRunId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawTeams::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. Matches
        manager
            .create_table(
                Table::create()
                    .table(RawMatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawMatches::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RawMatches::CompetitionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawMatches::CompetitionCode)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RawMatches::Season).integer().null())
                    .col(ColumnDef::new(RawMatches::Matchday).integer().null())
                    .col(
                        ColumnDef::new(RawMatches::UtcDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RawMatches::Status).string().not_null())
                    .col(
                        ColumnDef::new(RawMatches::HomeTeamId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawMatches::AwayTeamId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RawMatches::HalfTimeHome).integer().null())
                    .col(ColumnDef::new(RawMatches::HalfTimeAway).integer().null())
                    .col(ColumnDef::new(RawMatches::FullTimeHome).integer().null())
                    .col(ColumnDef::new(RawMatches::FullTimeAway).integer().null())
                    .col(ColumnDef::new(RawMatches::Winner).string().null())
                    .col(
                        ColumnDef::new(RawMatches::ExtractionRunId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawMatches::ExtractedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawMatches::LoadedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raw_matches_competition_code")
                    .table(RawMatches::Table)
                    .col(RawMatches::CompetitionCode)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raw_matches_utc_date")
                    .table(RawMatches::Table)
                    .col(RawMatches::UtcDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RawMatches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RawTeams::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RawCompetitions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RawCompetitions {
    Table,
    Id,
    Code,
    Name,
    Country,
    ExtractionRunId,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RawTeams {
    Table,
    Id,
    Name,
    ShortName,
    Tla,
    Country,
    ExtractionRunId,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RawMatches {
    Table,
    Id,
    CompetitionId,
    CompetitionCode,
    Season,
    Matchday,
    UtcDate,
    Status,
    HomeTeamId,
    AwayTeamId,
    HalfTimeHome,
    HalfTimeAway,
    FullTimeHome,
    FullTimeAway,
    Winner,
    ExtractionRunId,
    ExtractedAt,
    LoadedAt,
}
