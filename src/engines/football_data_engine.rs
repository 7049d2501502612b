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

use crate::config::settings::ApiSettings;
use crate::engines::traits::{ApiError, MatchQuery, MatchSource};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::debug;

/// football-data.org 在429响应中给出的重置秒数
const REQUEST_COUNTER_RESET: &str = "x-requestcounter-reset";

/// football-data.org v4 客户端
///
/// 基于reqwest实现，令牌放在可配置的请求头中。
pub struct FootballDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl FootballDataClient {
    /// 根据配置创建客户端
    ///
    /// # 返回值
    ///
    /// * `Ok(FootballDataClient)` - 客户端
    /// * `Err(ApiError)` - 令牌或请求头名非法
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if !settings.token.is_empty() {
            let name = HeaderName::from_bytes(settings.token_header.as_bytes())
                .map_err(|e| ApiError::InvalidConfig(format!("invalid token header: {}", e)))?;
            let mut value = HeaderValue::from_str(&settings.token)
                .map_err(|e| ApiError::InvalidConfig(format!("invalid token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("matchday/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        [RETRY_AFTER.as_str(), REQUEST_COUNTER_RESET]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .next()
    }
}

#[async_trait]
impl MatchSource for FootballDataClient {
    /// 执行一次比赛列表请求
    ///
    /// 429映射为 [`ApiError::RateLimited`]，5xx为 [`ApiError::Server`]，其余4xx为 [`ApiError::Client`]。
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<String, ApiError> {
        let url = format!(
            "{}/competitions/{}/matches",
            self.base_url, query.competition
        );

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(season) = query.season {
            params.push(("season", season.to_string()));
        }
        if let Some(from) = &query.date_from {
            params.push(("dateFrom", from.clone()));
        }
        if let Some(to) = &query.date_to {
            params.push(("dateTo", to.clone()));
        }

        let start = Instant::now();
        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        debug!(
            competition = %query.competition,
            season = ?query.season,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upstream response"
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited {
                retry_after: Self::retry_after(response.headers()),
            });
        }
        if status.is_server_error() {
            return Err(ApiError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Client {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }

    fn name(&self) -> &'static str {
        "football-data"
    }
}

#[cfg(test)]
#[path = "football_data_engine_test.rs"]
mod tests;
