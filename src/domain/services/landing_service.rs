// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::models::extraction_run::RunId;
use crate::domain::models::landing_artifact::{LandingArtifact, MatchRow};
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::domain::services::extraction_service::CompetitionExtract;
use crate::infrastructure::parquet_codec::{self, CodecError};
use crate::utils::errors::{Classify, ErrorClass};

/// 落地区错误
#[derive(Error, Debug)]
pub enum LandingError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 落地文件不存在
    #[error("Artifact missing: {0}")]
    Missing(String),

    /// 校验和不一致
    #[error("Artifact {key} is corrupt: expected checksum {expected}, got {actual}")]
    Corrupt {
        key: String,
        expected: String,
        actual: String,
    },

    /// 落地文件没有任何行
    #[error("Artifact {0} is empty")]
    Empty(String),

    /// 文件行数与清单不一致
    #[error("Artifact {key} has {actual} rows, manifest says {expected}")]
    RowCountMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },
}

impl Classify for LandingError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Permanent
    }
}

/// 计算十六进制SHA-256
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// 落地区写入器
///
/// 每个 `(赛事, 运行)` 写一个Parquet文件和一个清单，只新建不覆盖。
/// 清单最后写入，存在清单即表示该落地文件完整。
pub struct LandingWriter {
    storage: Arc<dyn StorageRepository>,
    keep_raw_payload: bool,
}

impl LandingWriter {
    pub fn new(storage: Arc<dyn StorageRepository>, keep_raw_payload: bool) -> Self {
        Self {
            storage,
            keep_raw_payload,
        }
    }

    /// 写入一个赛事的抽取结果
    ///
    /// # 返回值
    ///
    /// * `Ok(LandingArtifact)` - 已写入的落地文件描述
    /// * `Err(LandingError::Storage(StorageError::AlreadyExists))` - 该运行已写过
    #[instrument(skip(self, extract), fields(competition = %extract.competition))]
    pub async fn write(
        &self,
        run_id: RunId,
        extract: &CompetitionExtract,
    ) -> Result<LandingArtifact, LandingError> {
        let competition = extract.competition.as_str();
        let rows = MatchRow::from_batch(&extract.batch);
        let data = parquet_codec::encode(&rows)?;

        let artifact = LandingArtifact {
            competition: competition.to_string(),
            run_id,
            row_count: rows.len() as u64,
            rejected_at_extraction: extract.rejected.len() as u64,
            checksum: checksum(&data),
            key: LandingArtifact::data_key(competition, run_id),
            created_at: Utc::now(),
        };

        self.storage.save_new(&artifact.key, &data).await?;

        // 数据文件已写入；清单缺失时该文件不会被列出，需要人工补写清单
        if let Err(err) = self.write_companions(&artifact, extract).await {
            warn!(
                key = %artifact.key,
                manifest = %LandingArtifact::manifest_key(competition, run_id),
                checksum = %artifact.checksum,
                rows = artifact.row_count,
                error = %err,
                "Data file written but manifest missing, artifact is orphaned"
            );
            return Err(err);
        }

        info!(
            key = %artifact.key,
            rows = artifact.row_count,
            bytes = data.len(),
            "Landing artifact written"
        );
        Ok(artifact)
    }

    /// 读取落地文件并校验校验和
    pub async fn read(&self, artifact: &LandingArtifact) -> Result<Vec<u8>, LandingError> {
        let data = self
            .storage
            .get(&artifact.key)
            .await?
            .ok_or_else(|| LandingError::Missing(artifact.key.clone()))?;

        let actual = checksum(&data);
        if actual != artifact.checksum {
            warn!(key = %artifact.key, "Checksum mismatch");
            return Err(LandingError::Corrupt {
                key: artifact.key.clone(),
                expected: artifact.checksum.clone(),
                actual,
            });
        }
        Ok(data)
    }

    /// 写入原始负载（可选）和清单
    async fn write_companions(
        &self,
        artifact: &LandingArtifact,
        extract: &CompetitionExtract,
    ) -> Result<(), LandingError> {
        let (competition, run_id) = (artifact.competition.as_str(), artifact.run_id);
        if self.keep_raw_payload && !extract.raw_payloads.is_empty() {
            let raw = match extract.raw_payloads.as_slice() {
                [single] => single.clone(),
                many => format!("[{}]", many.join(",")),
            };
            self.storage
                .save_new(
                    &LandingArtifact::raw_payload_key(competition, run_id),
                    raw.as_bytes(),
                )
                .await?;
        }

        let manifest = serde_json::to_vec_pretty(artifact)?;
        self.storage
            .save_new(
                &LandingArtifact::manifest_key(competition, run_id),
                &manifest,
            )
            .await?;
        Ok(())
    }

    /// 某个赛事的全部落地文件，按运行ID升序
    pub async fn list(&self, competition: &str) -> Result<Vec<LandingArtifact>, LandingError> {
        let keys = self
            .storage
            .list(&LandingArtifact::competition_prefix(competition))
            .await?;

        let mut artifacts = Vec::new();
        for key in keys.iter().filter(|k| k.ends_with(".manifest.json")) {
            if let Some(bytes) = self.storage.get(key).await? {
                let artifact: LandingArtifact = serde_json::from_slice(&bytes)?;
                artifacts.push(artifact);
            }
        }
        artifacts.sort_by_key(|a| a.run_id);
        Ok(artifacts)
    }

    /// 落地校验闸门：文件存在、未损坏、非空且行数与清单一致
    pub async fn validate(&self, artifact: &LandingArtifact) -> Result<(), LandingError> {
        let data = self.read(artifact).await?;
        if artifact.row_count == 0 {
            return Err(LandingError::Empty(artifact.key.clone()));
        }
        let rows = parquet_codec::decode(&data)?;
        if rows.len() as u64 != artifact.row_count {
            return Err(LandingError::RowCountMismatch {
                key: artifact.key.clone(),
                expected: artifact.row_count,
                actual: rows.len() as u64,
            });
        }
        Ok(())
    }
}
