// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::extraction_run::{ExtractionRun, RunId};
use crate::utils::errors::RepositoryError;

/// 抽取运行仓库特质
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// 分配下一个运行ID并记录开始时间
    async fn start_run(&self) -> Result<ExtractionRun, RepositoryError>;

    /// 记录运行结果和请求计数
    async fn finish_run(&self, run: &ExtractionRun) -> Result<(), RepositoryError>;

    /// 根据ID查找运行
    async fn find_run(&self, id: RunId) -> Result<Option<ExtractionRun>, RepositoryError>;
}
