// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 赛事实体
///
/// 参考数据，每次抽取运行都会重新创建或刷新。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competition {
    /// 上游API中的赛事ID
    pub id: i64,
    /// 赛事代码，例如 `PL`、`PD`
    pub code: String,
    /// 赛事名称
    pub name: String,
    /// 所属国家或地区
    pub country: Option<String>,
}

/// 球队实体
///
/// 以ID去重，跨运行保持唯一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// 上游API中的球队ID
    pub id: i64,
    /// 球队全称
    pub name: String,
    /// 球队简称
    pub short_name: Option<String>,
    /// 三字母缩写
    pub tla: Option<String>,
    /// 所属国家
    pub country: Option<String>,
}

impl Team {
    /// 创建只有ID和名称的球队
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            short_name: None,
            tla: None,
            country: None,
        }
    }
}
