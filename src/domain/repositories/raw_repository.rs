// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::models::extraction_run::RunId;
use crate::domain::models::landing_artifact::{LandingArtifact, LoadRecord};
use crate::domain::models::load_stats::LoadStats;
use crate::domain::models::match_record::Match;
use crate::utils::errors::RepositoryError;

/// 原始层仓库特质
///
/// 原始层只能通过按自然键的upsert修改。每一行都记录最后写入它的运行ID，
/// 较旧运行的数据不会覆盖较新运行的数据。
#[async_trait]
pub trait RawRepository: Send + Sync {
    /// 在一个事务中写入一个落地文件的全部记录，并记入加载台账
    ///
    /// `base` 携带调用方统计的读取数和拒绝数；返回值补齐插入、更新和过期数。
    /// 任一语句失败时整个落地文件回滚。
    async fn apply_batch(
        &self,
        artifact: &LandingArtifact,
        records: &[LoadRecord],
        base: LoadStats,
    ) -> Result<LoadStats, RepositoryError>;

    /// 某个赛事已成功加载并入账的运行ID
    async fn ledgered_runs(&self, competition: &str) -> Result<BTreeSet<RunId>, RepositoryError>;

    /// 将永久失败的落地文件记入台账
    ///
    /// 已成功入账的文件保持不变。
    async fn record_failure(
        &self,
        artifact: &LandingArtifact,
        error: &str,
    ) -> Result<(), RepositoryError>;

    /// 某个赛事因永久失败而入账的运行ID
    async fn failed_runs(&self, competition: &str) -> Result<BTreeSet<RunId>, RepositoryError>;

    /// 台账中某个已成功加载的落地文件的统计
    async fn ledger_entry(
        &self,
        competition: &str,
        run_id: RunId,
    ) -> Result<Option<LoadStats>, RepositoryError>;

    /// 原始层比赛数，可按赛事过滤
    async fn count_matches(&self, competition: Option<&str>) -> Result<u64, RepositoryError>;

    /// 根据ID查找比赛
    async fn find_match(&self, id: i64) -> Result<Option<Match>, RepositoryError>;
}
