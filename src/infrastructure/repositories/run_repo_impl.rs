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
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::models::extraction_run::{ExtractionRun, RunId};
use crate::domain::repositories::run_repository::RunRepository;
use crate::infrastructure::database::entities::extraction_run as run_entity;
use crate::utils::errors::RepositoryError;

/// 抽取运行仓库实现
#[derive(Clone)]
pub struct RunRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl RunRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<run_entity::Model> for ExtractionRun {
    type Error = RepositoryError;

    fn try_from(model: run_entity::Model) -> Result<Self, Self::Error> {
        let request_counts: BTreeMap<String, u32> = serde_json::from_str(&model.request_counts)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        Ok(Self {
            id: RunId(model.id),
            started_at: model.started_at,
            finished_at: model.finished_at,
            request_counts,
            outcome: model.outcome.and_then(|o| o.parse().ok()),
        })
    }
}

#[async_trait]
impl RunRepository for RunRepositoryImpl {
    async fn start_run(&self) -> Result<ExtractionRun, RepositoryError> {
        let txn = self.db.begin().await?;

        let max_id: Option<Option<i64>> = run_entity::Entity::find()
            .select_only()
            .column_as(Expr::col(run_entity::Column::Id).max(), "max_id")
            .into_tuple()
            .one(&txn)
            .await?;
        let id = RunId(max_id.flatten().unwrap_or(0)).next();

        let run = ExtractionRun::start(id);
        run_entity::ActiveModel {
            id: Set(run.id.0),
            started_at: Set(run.started_at),
            finished_at: Set(None),
            outcome: Set(None),
            request_counts: Set("{}".to_string()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(run)
    }

    async fn finish_run(&self, run: &ExtractionRun) -> Result<(), RepositoryError> {
        let counts = serde_json::to_string(&run.request_counts)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let model = run_entity::ActiveModel {
            id: Set(run.id.0),
            started_at: Set(run.started_at),
            finished_at: Set(run.finished_at),
            outcome: Set(run.outcome.map(|o| o.to_string())),
            request_counts: Set(counts),
        };
        model.update(self.db.as_ref()).await.map_err(|e| match e {
            sea_orm::DbErr::RecordNotUpdated => RepositoryError::NotFound,
            other => RepositoryError::Database(other),
        })?;
        Ok(())
    }

    async fn find_run(&self, id: RunId) -> Result<Option<ExtractionRun>, RepositoryError> {
        run_entity::Entity::find_by_id(id.0)
            .one(self.db.as_ref())
            .await?
            .map(ExtractionRun::try_from)
            .transpose()
    }
}
