// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "raw_load_ledger")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub competition_code: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub run_id: i64,
    pub checksum: String,
    pub rows_read: i64,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub rows_rejected: i64,
    pub rows_stale: i64,
    pub loaded_at: ChronoDateTimeUtc,
    /// `loaded` 或 `failed`
    pub status: String,
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
