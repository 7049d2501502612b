// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::extraction_run::RunId;
use crate::domain::models::landing_artifact::LandingArtifact;
use crate::domain::models::load_stats::LoadStats;
use crate::domain::repositories::raw_repository::RawRepository;
use crate::domain::services::landing_service::{LandingError, LandingWriter};
use crate::infrastructure::metrics;
use crate::infrastructure::parquet_codec::{self, CodecError};
use crate::utils::errors::{Classify, ErrorClass, RepositoryError};

/// 加载错误
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Landing error: {0}")]
    Landing(#[from] LandingError),

    #[error("Decode error: {0}")]
    Codec(#[from] CodecError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl Classify for LoadError {
    fn class(&self) -> ErrorClass {
        match self {
            LoadError::Landing(e) => e.class(),
            LoadError::Codec(e) => e.class(),
            LoadError::Repository(e) => e.class(),
        }
    }
}

/// 原始层加载器
///
/// 读取落地文件并幂等写入原始层。同一赛事的加载串行执行，
/// 不同赛事之间互不阻塞。
pub struct RawLoader {
    landing: Arc<LandingWriter>,
    repo: Arc<dyn RawRepository>,
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RawLoader {
    pub fn new(landing: Arc<LandingWriter>, repo: Arc<dyn RawRepository>) -> Self {
        Self {
            landing,
            repo,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn RawRepository> {
        &self.repo
    }

    fn competition_lock(&self, competition: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(competition.to_string())
            .or_default()
            .clone()
    }

    /// 加载一个落地文件
    ///
    /// 校验失败的行计入 `rows_rejected`；写入与台账在同一事务中提交。
    /// 重复加载同一文件收敛为 inserted = 0、updated = 接受的行数。
    pub async fn load(&self, artifact: &LandingArtifact) -> Result<LoadStats, LoadError> {
        let lock = self.competition_lock(&artifact.competition);
        let _guard = lock.lock().await;
        self.load_or_settle(artifact).await
    }

    /// 加载一个落地文件，永久失败时将其以失败状态记入台账
    async fn load_or_settle(&self, artifact: &LandingArtifact) -> Result<LoadStats, LoadError> {
        match self.load_locked(artifact).await {
            Err(err) if err.class() == ErrorClass::Permanent => {
                warn!(
                    competition = %artifact.competition,
                    run_id = %artifact.run_id,
                    key = %artifact.key,
                    error = %err,
                    "Artifact failed permanently, recording it as failed in the ledger"
                );
                self.repo.record_failure(artifact, &err.to_string()).await?;
                Err(err)
            }
            other => other,
        }
    }

    #[instrument(skip(self, artifact), fields(competition = %artifact.competition, run_id = %artifact.run_id))]
    async fn load_locked(&self, artifact: &LandingArtifact) -> Result<LoadStats, LoadError> {
        let data = self.landing.read(artifact).await?;
        let rows = parquet_codec::decode(&data)?;

        let mut stats = LoadStats {
            rows_read: rows.len() as u64,
            ..LoadStats::default()
        };
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_load_record() {
                Ok(record) => records.push(record),
                Err(rejected) => {
                    debug!(match_id = ?rejected.match_id, reason = %rejected.reason, "Row rejected");
                    stats.rows_rejected += 1;
                }
            }
        }

        let stats = self.repo.apply_batch(artifact, &records, stats).await?;

        let competition = artifact.competition.as_str();
        metrics::record_raw_rows(competition, "inserted", stats.rows_inserted);
        metrics::record_raw_rows(competition, "updated", stats.rows_updated);
        metrics::record_raw_rows(competition, "rejected", stats.rows_rejected);
        metrics::record_raw_rows(competition, "stale", stats.rows_stale);
        info!(
            read = stats.rows_read,
            inserted = stats.rows_inserted,
            updated = stats.rows_updated,
            rejected = stats.rows_rejected,
            stale = stats.rows_stale,
            "Artifact loaded"
        );
        Ok(stats)
    }

    /// 按运行ID升序加载某赛事所有尚未入账、且不晚于 `up_to` 的落地文件
    ///
    /// 较早运行的文件永久失败时记为失败并跳过；暂时性失败会停止加载，
    /// 之后的文件留给下一次运行。`up_to` 本身的失败总是返回给调用方。
    pub async fn load_pending(
        &self,
        competition: &str,
        up_to: RunId,
    ) -> Result<Vec<(RunId, LoadStats)>, LoadError> {
        let lock = self.competition_lock(competition);
        let _guard = lock.lock().await;

        let mut settled = self.repo.ledgered_runs(competition).await?;
        settled.extend(self.repo.failed_runs(competition).await?);
        let pending: Vec<LandingArtifact> = self
            .landing
            .list(competition)
            .await?
            .into_iter()
            .filter(|a| a.run_id <= up_to && !settled.contains(&a.run_id))
            .collect();

        if pending.len() > 1 {
            warn!(
                competition,
                backlog = pending.len(),
                "Loading backlog of unloaded artifacts"
            );
        }

        let mut loaded = Vec::with_capacity(pending.len());
        for artifact in &pending {
            match self.load_or_settle(artifact).await {
                Ok(stats) => loaded.push((artifact.run_id, stats)),
                Err(err) if artifact.run_id < up_to && err.class() == ErrorClass::Permanent => {
                    warn!(
                        competition,
                        run_id = %artifact.run_id,
                        "Skipping permanently failed artifact of an earlier run"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
#[path = "load_service_test.rs"]
mod tests;
