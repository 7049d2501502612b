// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::competition::{Competition, Team};
use crate::domain::models::extraction_run::RunId;
use crate::domain::models::match_record::{
    Match, MatchStatus, RejectedRecord, RejectionReason, ScorePair, ValidatedBatch,
};

/// 落地文件描述符
///
/// 以 `(run_id, competition)` 为键，一经创建永不修改；后续运行生成新文件而不是覆盖。
/// 同时作为清单（manifest）以JSON形式与数据文件并列保存。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingArtifact {
    /// 赛事代码
    pub competition: String,
    /// 抽取运行ID
    pub run_id: RunId,
    /// 数据文件中的行数
    pub row_count: u64,
    /// 抽取阶段已拒绝的记录数
    pub rejected_at_extraction: u64,
    /// 数据文件内容的SHA-256校验和（十六进制）
    pub checksum: String,
    /// 数据文件在落地存储中的键
    pub key: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl LandingArtifact {
    /// 数据文件的存储键
    pub fn data_key(competition: &str, run_id: RunId) -> String {
        format!("matches/{}/{:012}.parquet", competition, run_id.0)
    }

    /// 清单文件的存储键
    pub fn manifest_key(competition: &str, run_id: RunId) -> String {
        format!("matches/{}/{:012}.manifest.json", competition, run_id.0)
    }

    /// 原始JSON负载的存储键
    pub fn raw_payload_key(competition: &str, run_id: RunId) -> String {
        format!("raw/{}/{:012}.json", competition, run_id.0)
    }

    /// 某个赛事所有清单的前缀
    pub fn competition_prefix(competition: &str) -> String {
        format!("matches/{}/", competition)
    }
}

/// 落地文件中的一行
///
/// 列式文件里的扁平表示，所有可能缺失的字段均为可选，
/// 加载器读取后需要重新校验才能得到 [`Match`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRow {
    pub match_id: Option<i64>,
    pub competition_id: Option<i64>,
    pub competition_code: String,
    pub competition_name: Option<String>,
    pub competition_country: Option<String>,
    pub season: Option<i32>,
    pub matchday: Option<i32>,
    pub utc_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub home_team_id: Option<i64>,
    pub home_team_name: Option<String>,
    pub home_team_short_name: Option<String>,
    pub home_team_tla: Option<String>,
    pub away_team_id: Option<i64>,
    pub away_team_name: Option<String>,
    pub away_team_short_name: Option<String>,
    pub away_team_tla: Option<String>,
    pub half_time_home: Option<i64>,
    pub half_time_away: Option<i64>,
    pub full_time_home: Option<i64>,
    pub full_time_away: Option<i64>,
    pub winner: Option<String>,
    pub extraction_run_id: i64,
    pub extracted_at: DateTime<Utc>,
}

/// 加载器校验通过的一行
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub competition: Competition,
    pub home: Team,
    pub away: Team,
    pub record: Match,
}

impl MatchRow {
    /// 把已校验批次展开为扁平行
    pub fn from_batch(batch: &ValidatedBatch) -> Vec<MatchRow> {
        let competition = &batch.competition;
        batch
            .matches
            .iter()
            .map(|m| {
                let home = batch.teams.get(&m.home_team_id);
                let away = batch.teams.get(&m.away_team_id);
                MatchRow {
                    match_id: Some(m.id),
                    competition_id: Some(competition.id),
                    competition_code: competition.code.clone(),
                    competition_name: Some(competition.name.clone()),
                    competition_country: competition.country.clone(),
                    season: m.season,
                    matchday: m.matchday,
                    utc_date: Some(m.utc_date),
                    status: Some(m.status.to_string()),
                    home_team_id: Some(m.home_team_id),
                    home_team_name: home.map(|t| t.name.clone()),
                    home_team_short_name: home.and_then(|t| t.short_name.clone()),
                    home_team_tla: home.and_then(|t| t.tla.clone()),
                    away_team_id: Some(m.away_team_id),
                    away_team_name: away.map(|t| t.name.clone()),
                    away_team_short_name: away.and_then(|t| t.short_name.clone()),
                    away_team_tla: away.and_then(|t| t.tla.clone()),
                    half_time_home: m.half_time.home.map(i64::from),
                    half_time_away: m.half_time.away.map(i64::from),
                    full_time_home: m.full_time.home.map(i64::from),
                    full_time_away: m.full_time.away.map(i64::from),
                    winner: m.winner.clone(),
                    extraction_run_id: m.extraction_run_id.0,
                    extracted_at: m.extracted_at,
                }
            })
            .collect()
    }

    /// 重新校验一行，得到可写入原始层的记录
    pub fn into_load_record(self) -> Result<LoadRecord, RejectedRecord> {
        let match_id = self.match_id;
        let reject = |reason: RejectionReason| RejectedRecord { match_id, reason };

        let id = self
            .match_id
            .ok_or_else(|| reject(RejectionReason::MissingIdentifier))?;
        let competition_id = self
            .competition_id
            .ok_or_else(|| reject(RejectionReason::MissingField("competition.id")))?;
        let utc_date = self
            .utc_date
            .ok_or_else(|| reject(RejectionReason::MissingField("utcDate")))?;
        let status_raw = self
            .status
            .ok_or_else(|| reject(RejectionReason::MissingField("status")))?;
        let status = MatchStatus::from_api(&status_raw)
            .ok_or_else(|| reject(RejectionReason::UnknownStatus(status_raw.clone())))?;
        let home_id = self
            .home_team_id
            .ok_or_else(|| reject(RejectionReason::MissingField("homeTeam.id")))?;
        let away_id = self
            .away_team_id
            .ok_or_else(|| reject(RejectionReason::MissingField("awayTeam.id")))?;

        let half_time = ScorePair::from_raw(self.half_time_home, self.half_time_away, "halfTime")
            .map_err(reject)?;
        let full_time = ScorePair::from_raw(self.full_time_home, self.full_time_away, "fullTime")
            .map_err(reject)?;

        let record = Match {
            id,
            competition_id,
            competition_code: self.competition_code.clone(),
            season: self.season,
            matchday: self.matchday,
            home_team_id: home_id,
            away_team_id: away_id,
            utc_date,
            status,
            half_time,
            full_time,
            winner: self.winner,
            extraction_run_id: RunId(self.extraction_run_id),
            extracted_at: self.extracted_at,
        };
        record.check_invariants().map_err(reject)?;

        let team =
            |id: i64, name: Option<String>, short: Option<String>, tla: Option<String>| Team {
                id,
                name: name.unwrap_or_else(|| format!("team-{}", id)),
                short_name: short,
                tla,
                country: None,
            };

        Ok(LoadRecord {
            competition: Competition {
                id: competition_id,
                code: self.competition_code.clone(),
                name: self
                    .competition_name
                    .unwrap_or_else(|| self.competition_code.clone()),
                country: self.competition_country,
            },
            home: team(
                home_id,
                self.home_team_name,
                self.home_team_short_name,
                self.home_team_tla,
            ),
            away: team(
                away_id,
                self.away_team_name,
                self.away_team_short_name,
                self.away_team_tla,
            ),
            record,
        })
    }
}
