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
use std::time::Duration;
use thiserror::Error;

use crate::utils::errors::{Classify, ErrorClass};

/// 上游API错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    /// 请求超时
    #[error("Request timed out")]
    Timeout,
    /// 网络错误（连接失败、连接重置等）
    #[error("Network error: {0}")]
    Network(String),
    /// 被限流（HTTP 429）
    #[error("Rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    /// 服务端错误（HTTP 5xx）
    #[error("Upstream server error: HTTP {status}")]
    Server { status: u16 },
    /// 客户端错误（HTTP 4xx，429除外）
    #[error("Upstream rejected request: HTTP {status}: {message}")]
    Client { status: u16, message: String },
    /// 响应无法解析
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// 客户端配置非法
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Malformed(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl Classify for ApiError {
    fn class(&self) -> ErrorClass {
        match self {
            ApiError::Timeout
            | ApiError::Network(_)
            | ApiError::RateLimited { .. }
            | ApiError::Server { .. } => ErrorClass::Transient,
            ApiError::Client { .. } | ApiError::Malformed(_) | ApiError::InvalidConfig(_) => {
                ErrorClass::Permanent
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// 比赛查询参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    /// 赛事代码
    pub competition: String,
    /// 赛季起始年份
    pub season: Option<i32>,
    /// 起始日期 (YYYY-MM-DD)
    pub date_from: Option<String>,
    /// 结束日期 (YYYY-MM-DD)
    pub date_to: Option<String>,
}

/// 比赛数据源特质
///
/// 返回原始JSON文本，解析与校验由抽取器完成。
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// 拉取一个赛事在给定窗口内的比赛
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<String, ApiError>;

    /// 数据源名称
    fn name(&self) -> &'static str;
}
