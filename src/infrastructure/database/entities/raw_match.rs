// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

/// 原始层比赛行，`extraction_run_id` 记录最后一次写入它的运行
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "raw_matches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub competition_id: i64,
    pub competition_code: String,
    pub season: Option<i32>,
    pub matchday: Option<i32>,
    pub utc_date: ChronoDateTimeUtc,
    pub status: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub half_time_home: Option<i32>,
    pub half_time_away: Option<i32>,
    pub full_time_home: Option<i32>,
    pub full_time_away: Option<i32>,
    pub winner: Option<String>,
    pub extraction_run_id: i64,
    pub extracted_at: ChronoDateTimeUtc,
    pub loaded_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
