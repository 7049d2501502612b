// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::models::competition::{Competition, Team};
use crate::domain::models::extraction_run::RunId;
use crate::domain::models::landing_artifact::LoadRecord;
use crate::domain::models::match_record::{
    Match, MatchStatus, RejectedRecord, RejectionReason, ScorePair,
};

/// 单条记录的校验结果
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(Box<LoadRecord>),
    Rejected(RejectedRecord),
}

/// 上游响应的顶层结构
///
/// 比赛先保持为原始JSON，逐条校验，单条坏记录不影响整批。
#[derive(Debug, Deserialize)]
pub struct MatchesResponse {
    pub competition: Option<ApiCompetition>,
    pub matches: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCompetition {
    pub id: i64,
    pub name: String,
    pub code: String,
}

/// 校验时需要的上下文
#[derive(Debug, Clone)]
pub struct RecordContext<'a> {
    /// 响应顶层的赛事
    pub competition: &'a Competition,
    /// 请求的赛季，记录缺少赛季信息时使用
    pub season: Option<i32>,
    pub run_id: RunId,
    pub extracted_at: DateTime<Utc>,
}

fn str_field<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn int_field(value: &Value, pointer: &str) -> Option<i64> {
    value.pointer(pointer).and_then(Value::as_i64)
}

/// 读取比分字段：缺失或null为空，非整数拒绝
fn score_field(
    value: &Value,
    pointer: &str,
    field: &'static str,
) -> Result<Option<i64>, RejectionReason> {
    match value.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or(RejectionReason::NonNumericScore(field)),
    }
}

fn team(value: &Value, side: &'static str) -> Result<Team, RejectionReason> {
    let (id_field, name_field) = match side {
        "homeTeam" => ("homeTeam.id", "homeTeam.name"),
        _ => ("awayTeam.id", "awayTeam.name"),
    };
    let id = int_field(value, &format!("/{}/id", side))
        .ok_or(RejectionReason::MissingField(id_field))?;
    let name = str_field(value, &format!("/{}/name", side))
        .ok_or(RejectionReason::MissingField(name_field))?;
    Ok(Team {
        id,
        name: name.to_string(),
        short_name: str_field(value, &format!("/{}/shortName", side)).map(str::to_string),
        tla: str_field(value, &format!("/{}/tla", side)).map(str::to_string),
        country: None,
    })
}

fn season_of(value: &Value) -> Option<i32> {
    str_field(value, "/season/startDate")
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok())
}

fn validate_inner(value: &Value, ctx: &RecordContext<'_>) -> Result<LoadRecord, RejectionReason> {
    if !value.is_object() {
        return Err(RejectionReason::Malformed("record is not an object".to_string()));
    }
    let id = int_field(value, "/id").ok_or(RejectionReason::MissingIdentifier)?;

    let utc_date = match str_field(value, "/utcDate") {
        None => return Err(RejectionReason::MissingField("utcDate")),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| RejectionReason::Malformed(format!("utcDate {}: {}", raw, e)))?
            .with_timezone(&Utc),
    };

    let status_raw = str_field(value, "/status").ok_or(RejectionReason::MissingField("status"))?;
    let status = MatchStatus::from_api(status_raw)
        .ok_or_else(|| RejectionReason::UnknownStatus(status_raw.to_string()))?;

    let home = team(value, "homeTeam")?;
    let away = team(value, "awayTeam")?;

    let half_time = ScorePair::from_raw(
        score_field(value, "/score/halfTime/home", "score.halfTime.home")?,
        score_field(value, "/score/halfTime/away", "score.halfTime.away")?,
        "score.halfTime",
    )?;
    let full_time = ScorePair::from_raw(
        score_field(value, "/score/fullTime/home", "score.fullTime.home")?,
        score_field(value, "/score/fullTime/away", "score.fullTime.away")?,
        "score.fullTime",
    )?;

    // 记录自带的赛事信息优先，国家取自赛区
    let competition = Competition {
        id: int_field(value, "/competition/id").unwrap_or(ctx.competition.id),
        code: str_field(value, "/competition/code")
            .unwrap_or(&ctx.competition.code)
            .to_string(),
        name: str_field(value, "/competition/name")
            .unwrap_or(&ctx.competition.name)
            .to_string(),
        country: str_field(value, "/area/name")
            .map(str::to_string)
            .or_else(|| ctx.competition.country.clone()),
    };

    let record = Match {
        id,
        competition_id: competition.id,
        competition_code: competition.code.clone(),
        season: season_of(value).or(ctx.season),
        matchday: int_field(value, "/matchday").and_then(|m| i32::try_from(m).ok()),
        home_team_id: home.id,
        away_team_id: away.id,
        utc_date,
        status,
        half_time,
        full_time,
        winner: str_field(value, "/score/winner").map(str::to_string),
        extraction_run_id: ctx.run_id,
        extracted_at: ctx.extracted_at,
    };
    record.check_invariants()?;

    Ok(LoadRecord {
        competition,
        home,
        away,
        record,
    })
}

/// 校验一条上游比赛记录
pub fn validate_record(value: &Value, ctx: &RecordContext<'_>) -> RecordOutcome {
    match validate_inner(value, ctx) {
        Ok(record) => RecordOutcome::Accepted(Box::new(record)),
        Err(reason) => RecordOutcome::Rejected(RejectedRecord {
            match_id: int_field(value, "/id"),
            reason,
        }),
    }
}
