// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 分层加载配置文件与环境变量
pub mod config;

/// 领域模块
///
/// 包含比赛数据模型、仓库接口以及抽取、落地、加载服务
pub mod domain;

/// 引擎模块
///
/// 上游比赛数据API的客户端
pub mod engines;

/// 基础设施模块
///
/// 提供数据库、落地区存储、列式编码和指标等外部集成
pub mod infrastructure;

/// 流水线模块
///
/// 任务图、调度器、质量闸门与编排器
pub mod pipeline;

/// 工具模块
///
/// 限流、重试、错误分类与日志初始化
pub mod utils;
