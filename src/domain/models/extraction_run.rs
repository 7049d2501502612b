// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 抽取运行ID
///
/// 每次编排触发分配一个，单调递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl RunId {
    /// 获取下一个运行ID
    pub fn next(self) -> Self {
        RunId(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 运行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// 所有节点成功
    Success,
    /// 部分赛事分支失败，但质量闸门在成功子集上通过
    Partial,
    /// 质量闸门失败或关键路径失败
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "SUCCESS"),
            RunOutcome::Partial => write!(f, "PARTIAL"),
            RunOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for RunOutcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(RunOutcome::Success),
            "PARTIAL" => Ok(RunOutcome::Partial),
            "FAILED" => Ok(RunOutcome::Failed),
            _ => Err(()),
        }
    }
}

/// 抽取运行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRun {
    /// 运行ID
    pub id: RunId,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 每个赛事发出的上游请求数（含重试）
    pub request_counts: BTreeMap<String, u32>,
    /// 运行结果，运行结束前为空
    pub outcome: Option<RunOutcome>,
}

impl ExtractionRun {
    pub fn start(id: RunId) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            finished_at: None,
            request_counts: BTreeMap::new(),
            outcome: None,
        }
    }

    /// 标记运行结束
    pub fn finish(&mut self, outcome: RunOutcome, request_counts: BTreeMap<String, u32>) {
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
        self.request_counts = request_counts;
    }
}
