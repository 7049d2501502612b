// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 原始层仓库（raw_repository）：比赛、球队、赛事的upsert和加载台账
/// - 运行仓库（run_repository）：抽取运行的编号与结果
/// - 存储仓库（storage_repository）：落地区文件的只增存储
pub mod raw_repository;
pub mod run_repository;
pub mod storage_repository;
