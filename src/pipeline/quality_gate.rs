// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

use crate::domain::models::load_stats::LoadStats;
use crate::domain::models::task_run::TaskState;

/// 质量闸门看到的单个赛事分支
#[derive(Debug, Clone, PartialEq)]
pub struct BranchResult {
    pub competition: String,
    /// 抽取阶段通过的记录数
    pub accepted: u64,
    /// 抽取阶段拒绝的记录数
    pub rejected: u64,
    /// 加载节点的终态
    pub load_state: TaskState,
    pub load: Option<LoadStats>,
}

/// 闸门结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub passed: bool,
    /// 被拒绝记录占所见记录的比例
    pub ratio: f64,
    pub threshold: f64,
    pub rejected: u64,
    pub seen: u64,
    /// 加载成功的分支数
    pub loaded_branches: usize,
    pub reason: Option<String>,
}

/// 汇总各分支并给出结论
///
/// 只统计加载成功的分支；因抽取失败而跳过的分支不影响结论，
/// 加载失败或没有任何分支加载成功时闸门失败。
pub fn evaluate(branches: &[BranchResult], threshold: f64) -> GateVerdict {
    let failed: Vec<&str> = branches
        .iter()
        .filter(|b| b.load_state == TaskState::Failed)
        .map(|b| b.competition.as_str())
        .collect();

    let mut rejected = 0u64;
    let mut seen = 0u64;
    let mut loaded_branches = 0usize;
    for branch in branches.iter().filter(|b| b.load_state == TaskState::Success) {
        loaded_branches += 1;
        seen += branch.accepted + branch.rejected;
        rejected += branch.rejected + branch.load.map(|s| s.rows_rejected).unwrap_or(0);
    }
    let ratio = if seen == 0 {
        0.0
    } else {
        rejected as f64 / seen as f64
    };

    let reason = if !failed.is_empty() {
        Some(format!("load failed for {}", failed.join(", ")))
    } else if loaded_branches == 0 {
        Some("nothing was loaded".to_string())
    } else if ratio > threshold {
        Some(format!(
            "rejection ratio {:.4} exceeds {:.4} ({} of {})",
            ratio, threshold, rejected, seen
        ))
    } else {
        None
    };

    GateVerdict {
        passed: reason.is_none(),
        ratio,
        threshold,
        rejected,
        seen,
        loaded_branches,
        reason,
    }
}
