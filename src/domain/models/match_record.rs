// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::models::competition::{Competition, Team};
use crate::domain::models::extraction_run::RunId;

/// 比赛状态枚举
///
/// 状态转换遵循以下流程：
/// Scheduled → InPlay → Finished，或 Scheduled → Postponed/Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// 已排期，尚未开始
    Scheduled,
    /// 进行中
    InPlay,
    /// 已结束
    Finished,
    /// 已延期
    Postponed,
    /// 已取消
    Cancelled,
}

impl MatchStatus {
    /// 解析上游API返回的状态字符串
    ///
    /// 除标准值外还接受API的别名：`TIMED`、`LIVE`、`PAUSED`、`SUSPENDED`。
    pub fn from_api(value: &str) -> Option<Self> {
        match value {
            "TIMED" => Some(MatchStatus::Scheduled),
            "LIVE" | "PAUSED" => Some(MatchStatus::InPlay),
            "SUSPENDED" => Some(MatchStatus::Postponed),
            other => other.parse().ok(),
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MatchStatus::Scheduled => write!(f, "SCHEDULED"),
            MatchStatus::InPlay => write!(f, "IN_PLAY"),
            MatchStatus::Finished => write!(f, "FINISHED"),
            MatchStatus::Postponed => write!(f, "POSTPONED"),
            MatchStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for MatchStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(MatchStatus::Scheduled),
            "IN_PLAY" => Ok(MatchStatus::InPlay),
            "FINISHED" => Ok(MatchStatus::Finished),
            "POSTPONED" => Ok(MatchStatus::Postponed),
            "CANCELLED" => Ok(MatchStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// 主客队比分对，未进行的比赛为空
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

impl ScorePair {
    pub fn new(home: Option<u32>, away: Option<u32>) -> Self {
        Self { home, away }
    }

    /// 从可能为负数的原始值构造比分
    pub fn from_raw(
        home: Option<i64>,
        away: Option<i64>,
        field: &'static str,
    ) -> Result<Self, RejectionReason> {
        let convert = |value: Option<i64>| match value {
            None => Ok(None),
            Some(v) if v < 0 => Err(RejectionReason::NegativeScore(field)),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| RejectionReason::NonNumericScore(field)),
        };
        Ok(Self {
            home: convert(home)?,
            away: convert(away)?,
        })
    }

    fn is_complete(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }
}

/// 记录被拒绝的原因
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectionReason {
    #[error("missing match identifier")]
    MissingIdentifier,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown match status: {0}")]
    UnknownStatus(String),

    #[error("score field is not numeric: {0}")]
    NonNumericScore(&'static str),

    #[error("score field is negative: {0}")]
    NegativeScore(&'static str),

    #[error("half-time score exceeds full-time score")]
    HalfTimeExceedsFullTime,

    #[error("finished match without full-time score")]
    FinishedWithoutScore,

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// 被拒绝的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// 记录ID（可能缺失）
    pub match_id: Option<i64>,
    /// 拒绝原因
    pub reason: RejectionReason,
}

/// 比赛实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// 上游API中的比赛ID，即自然键
    pub id: i64,
    /// 所属赛事ID
    pub competition_id: i64,
    /// 所属赛事代码
    pub competition_code: String,
    /// 赛季起始年份
    pub season: Option<i32>,
    /// 轮次
    pub matchday: Option<i32>,
    /// 主队ID
    pub home_team_id: i64,
    /// 客队ID
    pub away_team_id: i64,
    /// 开赛时间（UTC）
    pub utc_date: DateTime<Utc>,
    /// 比赛状态
    pub status: MatchStatus,
    /// 半场比分
    pub half_time: ScorePair,
    /// 全场比分
    pub full_time: ScorePair,
    /// 胜方（HOME_TEAM / AWAY_TEAM / DRAW）
    pub winner: Option<String>,
    /// 抽取运行ID
    pub extraction_run_id: RunId,
    /// 抽取时间
    pub extracted_at: DateTime<Utc>,
}

impl Match {
    /// 检查比分不变量
    ///
    /// 已结束的比赛必须有全场比分，且每一方的半场比分不得超过全场比分。
    pub fn check_invariants(&self) -> Result<(), RejectionReason> {
        if self.status != MatchStatus::Finished {
            return Ok(());
        }

        if !self.full_time.is_complete() {
            return Err(RejectionReason::FinishedWithoutScore);
        }

        let exceeds = |half: Option<u32>, full: Option<u32>| match (half, full) {
            (Some(h), Some(f)) => h > f,
            _ => false,
        };

        if exceeds(self.half_time.home, self.full_time.home)
            || exceeds(self.half_time.away, self.full_time.away)
        {
            return Err(RejectionReason::HalfTimeExceedsFullTime);
        }

        Ok(())
    }
}

/// 已校验的单赛事批次
///
/// 抽取器的输出，也是落地写入器的输入。
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub competition: Competition,
    /// 以ID去重后的球队
    pub teams: BTreeMap<i64, Team>,
    pub matches: Vec<Match>,
}

impl ValidatedBatch {
    pub fn new(competition: Competition) -> Self {
        Self {
            competition,
            teams: BTreeMap::new(),
            matches: Vec::new(),
        }
    }

    /// 加入一场比赛及其主客队
    pub fn push(&mut self, record: Match, home: Team, away: Team) {
        self.teams.insert(home.id, home);
        self.teams.insert(away.id, away);
        self.matches.push(record);
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// 合并另一批次（例如同一赛事的另一个赛季）
    pub fn extend(&mut self, other: ValidatedBatch) {
        self.teams.extend(other.teams);
        self.matches.extend(other.matches);
    }
}
