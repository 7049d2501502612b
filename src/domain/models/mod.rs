// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 赛事与球队（competition）
/// - 比赛记录及其校验规则（match_record）
/// - 抽取运行（extraction_run）
/// - 落地文件及其扁平行（landing_artifact）
/// - 加载统计（load_stats）
/// - 任务节点执行记录（task_run）
pub mod competition;
pub mod extraction_run;
pub mod landing_artifact;
pub mod load_stats;
pub mod match_record;
pub mod task_run;
