// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::models::extraction_run::{RunId, RunOutcome};
use crate::domain::models::load_stats::LoadStats;
use crate::domain::models::task_run::{TaskRun, TaskState};
use crate::pipeline::collaborators::QualityReport;
use crate::pipeline::orchestrator::{branch_nodes, DOWNSTREAM_NODES};
use crate::pipeline::quality_gate::GateVerdict;

/// 单个赛事分支的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionSummary {
    pub competition: String,
    /// 分支状态：全部成功为 SUCCESS，任一节点失败为 FAILED，否则为 SKIPPED
    pub state: TaskState,
    pub accepted: u64,
    pub rejected: u64,
    pub requests: u32,
    /// 本次运行落地的对象键
    pub artifact: Option<String>,
    pub load: Option<LoadStats>,
    /// 原始层中该赛事的比赛总数
    pub raw_matches: Option<u64>,
    /// 分支中第一个失败节点的错误
    pub error: Option<String>,
}

/// 一次运行的最终报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub competitions: Vec<CompetitionSummary>,
    pub quality_gate: Option<GateVerdict>,
    pub quality_check: Option<QualityReport>,
    pub tasks: Vec<TaskRun>,
}

/// 由分支内各节点的状态推出分支状态
pub fn branch_state(tasks: &[TaskRun], competition: &str) -> TaskState {
    let states: Vec<TaskState> = branch_nodes(competition)
        .iter()
        .filter_map(|id| tasks.iter().find(|t| &t.node_id == id))
        .map(|t| t.state)
        .collect();
    if !states.is_empty() && states.iter().all(|s| *s == TaskState::Success) {
        TaskState::Success
    } else if states.contains(&TaskState::Failed) {
        TaskState::Failed
    } else {
        TaskState::Skipped
    }
}

/// 分支中第一个失败节点的错误信息
pub fn branch_error(tasks: &[TaskRun], competition: &str) -> Option<String> {
    branch_nodes(competition).iter().find_map(|id| {
        tasks
            .iter()
            .find(|t| &t.node_id == id && t.state == TaskState::Failed)
            .and_then(|t| t.last_error.as_ref())
            .map(|e| format!("{}: {}", id, e))
    })
}

/// 运行结论
///
/// 全部节点成功为 SUCCESS；闸门及其后的节点失败或跳过，或超过半数分支失败为 FAILED；
/// 其余为 PARTIAL。
pub fn run_outcome(tasks: &[TaskRun], competitions: &[CompetitionSummary]) -> RunOutcome {
    if tasks.iter().all(|t| t.state == TaskState::Success) {
        return RunOutcome::Success;
    }
    let downstream_broken = tasks.iter().any(|t| {
        DOWNSTREAM_NODES.contains(&t.node_id.as_str())
            && matches!(t.state, TaskState::Failed | TaskState::Skipped)
    });
    let failed_branches = competitions
        .iter()
        .filter(|c| c.state != TaskState::Success)
        .count();
    if downstream_broken || failed_branches * 2 > competitions.len() {
        RunOutcome::Failed
    } else {
        RunOutcome::Partial
    }
}

impl RunSummary {
    /// 输出最终报告
    pub fn log(&self) {
        for c in &self.competitions {
            let load = c.load.unwrap_or_default();
            info!(
                run_id = %self.run_id,
                competition = %c.competition,
                state = %c.state,
                accepted = c.accepted,
                rejected = c.rejected,
                requests = c.requests,
                rows_inserted = load.rows_inserted,
                rows_updated = load.rows_updated,
                rows_rejected = load.rows_rejected,
                rows_stale = load.rows_stale,
                raw_matches = c.raw_matches,
                "Competition summary"
            );
            if let Some(error) = &c.error {
                warn!(run_id = %self.run_id, competition = %c.competition, error = %error, "Competition branch did not complete");
            }
        }
        let duration_ms = (self.finished_at - self.started_at).num_milliseconds();
        match &self.quality_gate {
            Some(gate) => info!(
                run_id = %self.run_id,
                outcome = %self.outcome,
                gate_passed = gate.passed,
                rejection_ratio = gate.ratio,
                duration_ms,
                "Run finished"
            ),
            None => info!(run_id = %self.run_id, outcome = %self.outcome, duration_ms, "Run finished"),
        }
    }
}
