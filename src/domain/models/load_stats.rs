// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// 单次原始层加载的统计信息
///
/// 每个落地文件对应一份，供质量闸门汇总。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// 从落地文件读取的行数
    pub rows_read: u64,
    /// 新插入的行数
    pub rows_inserted: u64,
    /// 按自然键更新的行数
    pub rows_updated: u64,
    /// 校验未通过而拒绝的行数
    pub rows_rejected: u64,
    /// 因库中已有更新运行的数据而跳过的行数
    pub rows_stale: u64,
}

impl LoadStats {
    /// 实际写入原始层的行数
    pub fn rows_written(&self) -> u64 {
        self.rows_inserted + self.rows_updated
    }
}

impl AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.rows_read += other.rows_read;
        self.rows_inserted += other.rows_inserted;
        self.rows_updated += other.rows_updated;
        self.rows_rejected += other.rows_rejected;
        self.rows_stale += other.rows_stale;
    }
}
