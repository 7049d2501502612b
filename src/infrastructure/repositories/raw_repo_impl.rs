// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Alias, Expr, OnConflict},
    ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::competition::{Competition, Team};
use crate::domain::models::extraction_run::RunId;
use crate::domain::models::landing_artifact::{LandingArtifact, LoadRecord};
use crate::domain::models::load_stats::LoadStats;
use crate::domain::models::match_record::{Match, MatchStatus, ScorePair};
use crate::domain::repositories::raw_repository::RawRepository;
use crate::infrastructure::database::entities::{
    raw_competition, raw_load_ledger, raw_match, raw_team,
};
use crate::utils::errors::RepositoryError;

/// 每条批量语句的最大行数
const CHUNK_SIZE: usize = 500;

/// 台账状态
const LEDGER_LOADED: &str = "loaded";
const LEDGER_FAILED: &str = "failed";

/// 原始层仓库实现
///
/// 基于SeaORM实现，PostgreSQL与SQLite共用同一套语句。
#[derive(Clone)]
pub struct RawRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl RawRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn score_to_db(value: Option<u32>) -> Option<i32> {
    value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

fn score_from_db(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl From<&LoadRecord> for raw_match::ActiveModel {
    fn from(record: &LoadRecord) -> Self {
        let m = &record.record;
        Self {
            id: Set(m.id),
            competition_id: Set(m.competition_id),
            competition_code: Set(m.competition_code.clone()),
            season: Set(m.season),
            matchday: Set(m.matchday),
            utc_date: Set(m.utc_date),
            status: Set(m.status.to_string()),
            home_team_id: Set(m.home_team_id),
            away_team_id: Set(m.away_team_id),
            half_time_home: Set(score_to_db(m.half_time.home)),
            half_time_away: Set(score_to_db(m.half_time.away)),
            full_time_home: Set(score_to_db(m.full_time.home)),
            full_time_away: Set(score_to_db(m.full_time.away)),
            winner: Set(m.winner.clone()),
            extraction_run_id: Set(m.extraction_run_id.0),
            extracted_at: Set(m.extracted_at),
            loaded_at: Set(Utc::now()),
        }
    }
}

impl TryFrom<raw_match::Model> for Match {
    type Error = RepositoryError;

    fn try_from(model: raw_match::Model) -> Result<Self, Self::Error> {
        let status: MatchStatus = model.status.parse().map_err(|_| {
            RepositoryError::Serialization(format!("unknown stored status {}", model.status))
        })?;
        Ok(Self {
            id: model.id,
            competition_id: model.competition_id,
            competition_code: model.competition_code,
            season: model.season,
            matchday: model.matchday,
            home_team_id: model.home_team_id,
            away_team_id: model.away_team_id,
            utc_date: model.utc_date,
            status,
            half_time: ScorePair::new(
                score_from_db(model.half_time_home),
                score_from_db(model.half_time_away),
            ),
            full_time: ScorePair::new(
                score_from_db(model.full_time_home),
                score_from_db(model.full_time_away),
            ),
            winner: model.winner,
            extraction_run_id: RunId(model.extraction_run_id),
            extracted_at: model.extracted_at,
        })
    }
}

fn team_model(team: &Team, run_id: RunId) -> raw_team::ActiveModel {
    raw_team::ActiveModel {
        id: Set(team.id),
        name: Set(team.name.clone()),
        short_name: Set(team.short_name.clone()),
        tla: Set(team.tla.clone()),
        country: Set(team.country.clone()),
        extraction_run_id: Set(run_id.0),
        updated_at: Set(Utc::now()),
    }
}

fn competition_model(competition: &Competition, run_id: RunId) -> raw_competition::ActiveModel {
    raw_competition::ActiveModel {
        id: Set(competition.id),
        code: Set(competition.code.clone()),
        name: Set(competition.name.clone()),
        country: Set(competition.country.clone()),
        extraction_run_id: Set(run_id.0),
        updated_at: Set(Utc::now()),
    }
}

/// 仅当库中行的运行ID不大于新行时才更新
fn newer_wins<E, C>(entity: E, key: C, run_column: C, update: &[C]) -> OnConflict
where
    E: EntityTrait<Column = C>,
    C: ColumnTrait,
{
    let mut on_conflict = OnConflict::column(key);
    on_conflict
        .update_columns(update.iter().copied())
        .action_and_where(
            Expr::col((entity, run_column)).lte(Expr::col((Alias::new("excluded"), run_column))),
        );
    on_conflict
}

impl RawRepositoryImpl {
    async fn runs_with_status(
        &self,
        competition: &str,
        status: &str,
    ) -> Result<BTreeSet<RunId>, RepositoryError> {
        let runs: Vec<i64> = raw_load_ledger::Entity::find()
            .select_only()
            .column(raw_load_ledger::Column::RunId)
            .filter(raw_load_ledger::Column::CompetitionCode.eq(competition))
            .filter(raw_load_ledger::Column::Status.eq(status))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(runs.into_iter().map(RunId).collect())
    }

    /// 查询已存在的行及其运行ID
    async fn existing_runs(
        txn: &DatabaseTransaction,
        ids: &[i64],
    ) -> Result<HashMap<i64, i64>, RepositoryError> {
        let mut existing = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(CHUNK_SIZE) {
            let rows: Vec<(i64, i64)> = raw_match::Entity::find()
                .select_only()
                .column(raw_match::Column::Id)
                .column(raw_match::Column::ExtractionRunId)
                .filter(raw_match::Column::Id.is_in(chunk.to_vec()))
                .into_tuple()
                .all(txn)
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }

    async fn upsert_competitions(
        txn: &DatabaseTransaction,
        competitions: &BTreeMap<i64, &Competition>,
        run_id: RunId,
    ) -> Result<(), RepositoryError> {
        use raw_competition::Column as C;
        if competitions.is_empty() {
            return Ok(());
        }
        let models: Vec<_> = competitions
            .values()
            .map(|c| competition_model(c, run_id))
            .collect();
        for chunk in models.chunks(CHUNK_SIZE) {
            raw_competition::Entity::insert_many(chunk.to_vec())
                .on_conflict(newer_wins(
                    raw_competition::Entity,
                    C::Id,
                    C::ExtractionRunId,
                    &[
                        C::Code,
                        C::Name,
                        C::Country,
                        C::ExtractionRunId,
                        C::UpdatedAt,
                    ],
                ))
                .exec_without_returning(txn)
                .await?;
        }
        Ok(())
    }

    async fn upsert_teams(
        txn: &DatabaseTransaction,
        teams: &BTreeMap<i64, &Team>,
        run_id: RunId,
    ) -> Result<(), RepositoryError> {
        use raw_team::Column as C;
        if teams.is_empty() {
            return Ok(());
        }
        let models: Vec<_> = teams.values().map(|t| team_model(t, run_id)).collect();
        for chunk in models.chunks(CHUNK_SIZE) {
            raw_team::Entity::insert_many(chunk.to_vec())
                .on_conflict(newer_wins(
                    raw_team::Entity,
                    C::Id,
                    C::ExtractionRunId,
                    &[
                        C::Name,
                        C::ShortName,
                        C::Tla,
                        C::Country,
                        C::ExtractionRunId,
                        C::UpdatedAt,
                    ],
                ))
                .exec_without_returning(txn)
                .await?;
        }
        Ok(())
    }

    async fn upsert_matches(
        txn: &DatabaseTransaction,
        records: &[&LoadRecord],
    ) -> Result<(), RepositoryError> {
        use raw_match::Column as C;
        let models: Vec<raw_match::ActiveModel> = records.iter().map(|r| (*r).into()).collect();
        for chunk in models.chunks(CHUNK_SIZE) {
            raw_match::Entity::insert_many(chunk.to_vec())
                .on_conflict(newer_wins(
                    raw_match::Entity,
                    C::Id,
                    C::ExtractionRunId,
                    &[
                        C::CompetitionId,
                        C::CompetitionCode,
                        C::Season,
                        C::Matchday,
                        C::UtcDate,
                        C::Status,
                        C::HomeTeamId,
                        C::AwayTeamId,
                        C::HalfTimeHome,
                        C::HalfTimeAway,
                        C::FullTimeHome,
                        C::FullTimeAway,
                        C::Winner,
                        C::ExtractionRunId,
                        C::ExtractedAt,
                        C::LoadedAt,
                    ],
                ))
                .exec_without_returning(txn)
                .await?;
        }
        Ok(())
    }

    async fn record_ledger(
        txn: &DatabaseTransaction,
        artifact: &LandingArtifact,
        stats: &LoadStats,
    ) -> Result<(), RepositoryError> {
        use raw_load_ledger::Column as C;
        let entry = raw_load_ledger::ActiveModel {
            competition_code: Set(artifact.competition.clone()),
            run_id: Set(artifact.run_id.0),
            checksum: Set(artifact.checksum.clone()),
            rows_read: Set(stats.rows_read as i64),
            rows_inserted: Set(stats.rows_inserted as i64),
            rows_updated: Set(stats.rows_updated as i64),
            rows_rejected: Set(stats.rows_rejected as i64),
            rows_stale: Set(stats.rows_stale as i64),
            loaded_at: Set(Utc::now()),
            status: Set(LEDGER_LOADED.to_string()),
            error: Set(None),
        };
        raw_load_ledger::Entity::insert(entry)
            .on_conflict(
                OnConflict::columns([C::CompetitionCode, C::RunId])
                    .update_columns([
                        C::Checksum,
                        C::RowsRead,
                        C::RowsInserted,
                        C::RowsUpdated,
                        C::RowsRejected,
                        C::RowsStale,
                        C::LoadedAt,
                        C::Status,
                        C::Error,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RawRepository for RawRepositoryImpl {
    async fn apply_batch(
        &self,
        artifact: &LandingArtifact,
        records: &[LoadRecord],
        base: LoadStats,
    ) -> Result<LoadStats, RepositoryError> {
        let txn = self.db.begin().await?;
        let mut stats = base;

        let ids: Vec<i64> = records
            .iter()
            .map(|r| r.record.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let known = Self::existing_runs(&txn, &ids).await?;

        // 同一文件内重复的ID只保留最后一次出现，每个ID只计数一次
        let mut latest: BTreeMap<i64, &LoadRecord> = BTreeMap::new();
        for record in records {
            latest.insert(record.record.id, record);
        }

        let mut fresh: Vec<&LoadRecord> = Vec::with_capacity(latest.len());
        let mut competitions: BTreeMap<i64, &Competition> = BTreeMap::new();
        let mut teams: BTreeMap<i64, &Team> = BTreeMap::new();
        for record in latest.into_values() {
            let incoming = record.record.extraction_run_id.0;
            match known.get(&record.record.id).copied() {
                None => stats.rows_inserted += 1,
                Some(stored) if stored <= incoming => stats.rows_updated += 1,
                Some(_) => {
                    stats.rows_stale += 1;
                    continue;
                }
            }
            fresh.push(record);
            competitions.insert(record.competition.id, &record.competition);
            teams.insert(record.home.id, &record.home);
            teams.insert(record.away.id, &record.away);
        }

        Self::upsert_competitions(&txn, &competitions, artifact.run_id).await?;
        Self::upsert_teams(&txn, &teams, artifact.run_id).await?;
        if !fresh.is_empty() {
            Self::upsert_matches(&txn, &fresh).await?;
        }
        Self::record_ledger(&txn, artifact, &stats).await?;

        txn.commit().await?;
        debug!(
            competition = %artifact.competition,
            run_id = %artifact.run_id,
            inserted = stats.rows_inserted,
            updated = stats.rows_updated,
            stale = stats.rows_stale,
            "Raw batch committed"
        );
        Ok(stats)
    }

    async fn ledgered_runs(&self, competition: &str) -> Result<BTreeSet<RunId>, RepositoryError> {
        self.runs_with_status(competition, LEDGER_LOADED).await
    }

    async fn record_failure(
        &self,
        artifact: &LandingArtifact,
        error: &str,
    ) -> Result<(), RepositoryError> {
        use raw_load_ledger::Column as C;
        let entry = raw_load_ledger::ActiveModel {
            competition_code: Set(artifact.competition.clone()),
            run_id: Set(artifact.run_id.0),
            checksum: Set(artifact.checksum.clone()),
            rows_read: Set(0),
            rows_inserted: Set(0),
            rows_updated: Set(0),
            rows_rejected: Set(0),
            rows_stale: Set(0),
            loaded_at: Set(Utc::now()),
            status: Set(LEDGER_FAILED.to_string()),
            error: Set(Some(error.to_string())),
        };
        let result = raw_load_ledger::Entity::insert(entry)
            .on_conflict(
                OnConflict::columns([C::CompetitionCode, C::RunId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await;
        match result {
            Ok(_) | Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn failed_runs(&self, competition: &str) -> Result<BTreeSet<RunId>, RepositoryError> {
        self.runs_with_status(competition, LEDGER_FAILED).await
    }

    async fn ledger_entry(
        &self,
        competition: &str,
        run_id: RunId,
    ) -> Result<Option<LoadStats>, RepositoryError> {
        let entry = raw_load_ledger::Entity::find_by_id((competition.to_string(), run_id.0))
            .filter(raw_load_ledger::Column::Status.eq(LEDGER_LOADED))
            .one(self.db.as_ref())
            .await?;
        Ok(entry.map(|e| LoadStats {
            rows_read: e.rows_read.max(0) as u64,
            rows_inserted: e.rows_inserted.max(0) as u64,
            rows_updated: e.rows_updated.max(0) as u64,
            rows_rejected: e.rows_rejected.max(0) as u64,
            rows_stale: e.rows_stale.max(0) as u64,
        }))
    }

    async fn count_matches(&self, competition: Option<&str>) -> Result<u64, RepositoryError> {
        let mut query = raw_match::Entity::find();
        if let Some(code) = competition {
            query = query.filter(raw_match::Column::CompetitionCode.eq(code));
        }
        Ok(query.count(self.db.as_ref()).await?)
    }

    async fn find_match(&self, id: i64) -> Result<Option<Match>, RepositoryError> {
        raw_match::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(Match::try_from)
            .transpose()
    }
}
