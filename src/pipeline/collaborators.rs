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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::settings::{QualitySettings, TransformSettings};
use crate::domain::models::extraction_run::RunId;
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::pipeline::summary::RunSummary;
use crate::utils::errors::{Classify, ErrorClass};

/// 下游协作者错误
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transform run {0} failed")]
    TransformFailed(String),

    #[error("Quality check failed: {0}")]
    QualityFailed(String),

    #[error("Invalid collaborator URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Classify for CollaboratorError {
    fn class(&self) -> ErrorClass {
        match self {
            CollaboratorError::Http(e) if e.is_timeout() || e.is_connect() => {
                ErrorClass::Transient
            }
            CollaboratorError::Status { status, .. } if *status >= 500 || *status == 429 => {
                ErrorClass::Transient
            }
            CollaboratorError::QualityFailed(_) => ErrorClass::QualityGate,
            _ => ErrorClass::Permanent,
        }
    }
}

/// 下游转换触发器
///
/// 在质量闸门通过后调用，返回时转换已经结束。
#[async_trait]
pub trait TransformTrigger: Send + Sync {
    async fn trigger(&self, run_id: RunId) -> Result<(), CollaboratorError>;
}

/// 外部质量检查结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub passed: bool,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// 外部质量检查
#[async_trait]
pub trait QualityCheck: Send + Sync {
    async fn check(&self, run_id: RunId) -> Result<QualityReport, CollaboratorError>;
}

/// 完成信号的接收方
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn complete(&self, summary: &RunSummary) -> Result<(), CollaboratorError>;
}

fn parse_base(raw: &str) -> Result<String, CollaboratorError> {
    let url = Url::parse(raw).map_err(|e| CollaboratorError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
struct TransformAccepted {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TransformStatus {
    status: String,
}

/// 通过HTTP触发的转换服务
///
/// `POST {url}/runs` 提交运行，随后轮询 `GET {url}/runs/{id}` 直到 `succeeded` 或 `failed`。
pub struct HttpTransformTrigger {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpTransformTrigger {
    pub fn new(base_url: &str, poll_interval: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base_url: parse_base(base_url)?,
            poll_interval,
        })
    }
}

#[async_trait]
impl TransformTrigger for HttpTransformTrigger {
    async fn trigger(&self, run_id: RunId) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/runs", self.base_url))
            .json(&json!({ "run_id": run_id }))
            .send()
            .await?;
        let accepted: TransformAccepted = ensure_success(response).await?.json().await?;
        let id = match accepted.id {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => run_id.to_string(),
        };
        info!(run_id = %run_id, transform_id = %id, "Transform submitted");

        loop {
            let response = self
                .client
                .get(format!("{}/runs/{}", self.base_url, id))
                .send()
                .await?;
            let status: TransformStatus = ensure_success(response).await?.json().await?;
            match status.status.as_str() {
                "succeeded" => return Ok(()),
                "failed" => return Err(CollaboratorError::TransformFailed(id)),
                other => debug!(transform_id = %id, status = other, "Transform still running"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// 未配置转换服务时使用
pub struct NoopTransformTrigger;

#[async_trait]
impl TransformTrigger for NoopTransformTrigger {
    async fn trigger(&self, run_id: RunId) -> Result<(), CollaboratorError> {
        debug!(run_id = %run_id, "No transform configured");
        Ok(())
    }
}

/// 通过HTTP查询的质量检查服务：`GET {url}/runs/{run_id}`
pub struct HttpQualityCheck {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQualityCheck {
    pub fn new(base_url: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base_url: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl QualityCheck for HttpQualityCheck {
    async fn check(&self, run_id: RunId) -> Result<QualityReport, CollaboratorError> {
        let response = self
            .client
            .get(format!("{}/runs/{}", self.base_url, run_id))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

/// 未配置质量检查服务时直接通过
pub struct NoopQualityCheck;

#[async_trait]
impl QualityCheck for NoopQualityCheck {
    async fn check(&self, _run_id: RunId) -> Result<QualityReport, CollaboratorError> {
        Ok(QualityReport {
            passed: true,
            details: serde_json::Value::Null,
        })
    }
}

/// 把运行报告写入落地区 `_runs/<run_id>/summary.json`
pub struct StorageCompletionSink {
    storage: Arc<dyn StorageRepository>,
}

impl StorageCompletionSink {
    pub fn new(storage: Arc<dyn StorageRepository>) -> Self {
        Self { storage }
    }

    pub fn summary_key(run_id: RunId) -> String {
        format!("_runs/{}/summary.json", run_id)
    }
}

#[async_trait]
impl CompletionSink for StorageCompletionSink {
    async fn complete(&self, summary: &RunSummary) -> Result<(), CollaboratorError> {
        let key = Self::summary_key(summary.run_id);
        let body = serde_json::to_vec_pretty(summary)?;
        self.storage.save_new(&key, &body).await?;
        info!(run_id = %summary.run_id, key = %key, "Completion signal written");
        Ok(())
    }
}

/// 根据配置创建转换触发器
pub fn create_transform_trigger(
    settings: &TransformSettings,
) -> Result<Arc<dyn TransformTrigger>, CollaboratorError> {
    Ok(match settings.url.as_deref() {
        Some(url) => Arc::new(HttpTransformTrigger::new(
            url,
            Duration::from_millis(settings.poll_interval_ms),
        )?),
        None => Arc::new(NoopTransformTrigger),
    })
}

/// 根据配置创建质量检查
pub fn create_quality_check(
    settings: &QualitySettings,
) -> Result<Arc<dyn QualityCheck>, CollaboratorError> {
    Ok(match settings.check_url.as_deref() {
        Some(url) => Arc::new(HttpQualityCheck::new(url)?),
        None => Arc::new(NoopQualityCheck),
    })
}
