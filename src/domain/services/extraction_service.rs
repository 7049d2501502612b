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

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::settings::ApiSettings;
use crate::domain::models::competition::Competition;
use crate::domain::models::extraction_run::RunId;
use crate::domain::models::match_record::{RejectedRecord, ValidatedBatch};
use crate::domain::services::record_validator::{
    validate_record, MatchesResponse, RecordContext, RecordOutcome,
};
use crate::engines::traits::{ApiError, MatchQuery, MatchSource};
use crate::infrastructure::metrics;
use crate::utils::errors::{Classify, ErrorClass};
use crate::utils::rate_limiter::RateLimiter;
use crate::utils::retry_policy::{RetryError, RetryPolicy};

/// 抽取错误
#[derive(Error, Debug)]
pub enum ExtractError {
    /// 上游请求失败（已经过重试策略）
    #[error("{competition}: {source}")]
    Api {
        competition: String,
        #[source]
        source: RetryError<ApiError>,
    },

    /// 响应顶层结构无法解析，仅影响该赛事
    #[error("{competition}: malformed response: {message}")]
    Malformed {
        competition: String,
        message: String,
    },
}

impl Classify for ExtractError {
    fn class(&self) -> ErrorClass {
        match self {
            ExtractError::Api { source, .. } => source.class(),
            ExtractError::Malformed { .. } => ErrorClass::Permanent,
        }
    }
}

/// 抽取窗口：赛季与日期范围
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionWindow {
    /// 赛季起始年份，为空时不带赛季参数请求一次
    pub seasons: Vec<i32>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl From<&ApiSettings> for ExtractionWindow {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            seasons: settings.seasons.clone(),
            date_from: settings.date_from.clone(),
            date_to: settings.date_to.clone(),
        }
    }
}

/// 单个赛事的抽取结果
#[derive(Debug, Clone)]
pub struct CompetitionExtract {
    /// 赛事代码
    pub competition: String,
    /// 校验通过的批次
    pub batch: ValidatedBatch,
    /// 校验通过的记录数
    pub accepted: u64,
    /// 被拒绝的记录
    pub rejected: Vec<RejectedRecord>,
    /// 本次抽取发出的请求数（含重试）
    pub requests: u32,
    /// 每个赛季的原始响应
    pub raw_payloads: Vec<String>,
}

/// 比赛抽取器
///
/// 组合共享的限流器与重试策略，逐赛季拉取并逐条校验。
pub struct Extractor {
    source: Arc<dyn MatchSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    window: ExtractionWindow,
    /// 本次运行每个赛事的请求数
    request_counts: Mutex<BTreeMap<String, u32>>,
}

impl Extractor {
    pub fn new(
        source: Arc<dyn MatchSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        window: ExtractionWindow,
    ) -> Self {
        Self {
            source,
            limiter,
            retry,
            window,
            request_counts: Mutex::new(BTreeMap::new()),
        }
    }

    /// 每个赛事累计的请求数
    pub fn request_counts(&self) -> BTreeMap<String, u32> {
        self.request_counts.lock().clone()
    }

    /// 取出并清空请求计数，每次运行结束时调用
    pub fn take_request_counts(&self) -> BTreeMap<String, u32> {
        std::mem::take(&mut *self.request_counts.lock())
    }

    fn queries(&self, competition: &str) -> Vec<MatchQuery> {
        let query = |season| MatchQuery {
            competition: competition.to_string(),
            season,
            date_from: self.window.date_from.clone(),
            date_to: self.window.date_to.clone(),
        };
        if self.window.seasons.is_empty() {
            vec![query(None)]
        } else {
            self.window.seasons.iter().map(|s| query(Some(*s))).collect()
        }
    }

    /// 抽取一个赛事在窗口内的全部比赛
    ///
    /// 顶层解析失败对该赛事是永久错误；单条坏记录只会进入拒绝列表。
    #[instrument(skip(self))]
    pub async fn extract(
        &self,
        competition: &str,
        run_id: RunId,
    ) -> Result<CompetitionExtract, ExtractError> {
        let requests = AtomicU32::new(0);
        let extracted_at = Utc::now();
        let mut batch: Option<ValidatedBatch> = None;
        let mut rejected = Vec::new();
        let mut raw_payloads = Vec::new();

        for query in self.queries(competition) {
            let body = self
                .fetch(&query, &requests)
                .await
                .map_err(|source| ExtractError::Api {
                    competition: competition.to_string(),
                    source,
                })?;

            let response: MatchesResponse =
                serde_json::from_str(&body).map_err(|e| ExtractError::Malformed {
                    competition: competition.to_string(),
                    message: e.to_string(),
                })?;
            let top = response.competition.ok_or_else(|| ExtractError::Malformed {
                competition: competition.to_string(),
                message: "missing competition".to_string(),
            })?;
            let top = Competition {
                id: top.id,
                code: top.code,
                name: top.name,
                country: None,
            };

            let ctx = RecordContext {
                competition: &top,
                season: query.season,
                run_id,
                extracted_at,
            };
            let mut season_batch = ValidatedBatch::new(top.clone());
            for value in &response.matches {
                match validate_record(value, &ctx) {
                    RecordOutcome::Accepted(record) => {
                        let record = *record;
                        if season_batch.competition.country.is_none() {
                            season_batch.competition.country = record.competition.country.clone();
                        }
                        season_batch.push(record.record, record.home, record.away);
                    }
                    RecordOutcome::Rejected(rejection) => {
                        debug!(
                            match_id = ?rejection.match_id,
                            reason = %rejection.reason,
                            "Record rejected"
                        );
                        rejected.push(rejection);
                    }
                }
            }

            match batch.as_mut() {
                Some(existing) => existing.extend(season_batch),
                None => batch = Some(season_batch),
            }
            raw_payloads.push(body);
        }

        let batch = batch.ok_or_else(|| ExtractError::Malformed {
            competition: competition.to_string(),
            message: "no season requested".to_string(),
        })?;
        let accepted = batch.len() as u64;
        info!(
            competition,
            accepted,
            rejected = rejected.len(),
            requests = requests.load(Ordering::Relaxed),
            "Extraction finished"
        );

        Ok(CompetitionExtract {
            competition: competition.to_string(),
            batch,
            accepted,
            rejected,
            requests: requests.load(Ordering::Relaxed),
            raw_payloads,
        })
    }

    /// 经限流与重试发出一次请求
    async fn fetch(
        &self,
        query: &MatchQuery,
        requests: &AtomicU32,
    ) -> Result<String, RetryError<ApiError>> {
        self.retry
            .execute(|attempt| async move {
                self.limiter.acquire().await;
                requests.fetch_add(1, Ordering::Relaxed);
                *self
                    .request_counts
                    .lock()
                    .entry(query.competition.clone())
                    .or_insert(0) += 1;

                debug!(
                    competition = %query.competition,
                    season = ?query.season,
                    attempt,
                    source = self.source.name(),
                    "Requesting matches"
                );
                let result = self.source.fetch_matches(query).await;
                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(ApiError::RateLimited { .. }) => "rate_limited",
                    Err(e) if e.is_transient() => "transient",
                    Err(_) => "permanent",
                };
                metrics::record_api_request(&query.competition, outcome);
                result
            })
            .await
    }

    /// 并发抽取多个赛事，共享同一个限流器，失败按赛事隔离
    pub async fn extract_all(
        &self,
        competitions: &[String],
        run_id: RunId,
    ) -> BTreeMap<String, Result<CompetitionExtract, ExtractError>> {
        let results = join_all(
            competitions
                .iter()
                .map(|c| async move { (c.clone(), self.extract(c, run_id).await) }),
        )
        .await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
