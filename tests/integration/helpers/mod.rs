// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use matchday::config::settings::{ApiSettings, DatabaseSettings, PipelineSettings};
use matchday::domain::models::competition::Competition;
use matchday::domain::models::extraction_run::RunId;
use matchday::domain::models::match_record::ValidatedBatch;
use matchday::domain::services::extraction_service::{
    CompetitionExtract, ExtractionWindow, Extractor,
};
use matchday::domain::services::landing_service::LandingWriter;
use matchday::domain::services::load_service::RawLoader;
use matchday::domain::services::record_validator::{
    validate_record, RecordContext, RecordOutcome,
};
use matchday::engines::football_data_engine::FootballDataClient;
use matchday::infrastructure::database::connection;
use matchday::infrastructure::repositories::raw_repo_impl::RawRepositoryImpl;
use matchday::infrastructure::repositories::run_repo_impl::RunRepositoryImpl;
use matchday::infrastructure::storage::InMemoryStorage;
use matchday::pipeline::collaborators::{
    NoopQualityCheck, NoopTransformTrigger, QualityCheck, StorageCompletionSink,
    TransformTrigger,
};
use matchday::pipeline::orchestrator::{PipelineComponents, PipelineOrchestrator};
use matchday::utils::rate_limiter::RateLimiter;
use matchday::utils::retry_policy::RetryPolicy;
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn competition_id(code: &str) -> i64 {
    match code {
        "PL" => 2021,
        "PD" => 2014,
        "FL1" => 2015,
        _ => 9999,
    }
}

/// 一场已完赛的比赛，主客队随比赛ID变化
pub fn fixture_match(id: i64, half: (i64, i64), full: (i64, i64)) -> Value {
    let home = 100 + id * 2;
    json!({
        "id": id,
        "utcDate": "2024-09-14T14:00:00Z",
        "status": "FINISHED",
        "matchday": 4,
        "season": {"startDate": "2024-08-16"},
        "homeTeam": {"id": home, "name": format!("Team {}", home), "tla": "HOM"},
        "awayTeam": {"id": home + 1, "name": format!("Team {}", home + 1), "tla": "AWY"},
        "score": {
            "winner": "DRAW",
            "halfTime": {"home": half.0, "away": half.1},
            "fullTime": {"home": full.0, "away": full.1}
        }
    })
}

/// `count` 场合法比赛，ID从 `first` 开始
pub fn valid_matches(first: i64, count: i64) -> Vec<Value> {
    (first..first + count)
        .map(|id| fixture_match(id, (0, 0), (1, 1)))
        .collect()
}

pub fn payload(code: &str, matches: Vec<Value>) -> Value {
    json!({
        "competition": {"id": competition_id(code), "name": format!("League {}", code), "code": code},
        "matches": matches
    })
}

pub fn api_settings(base_url: &str, competitions: &[&str]) -> ApiSettings {
    ApiSettings {
        base_url: base_url.to_string(),
        token: "test-token".to_string(),
        token_header: "X-Auth-Token".to_string(),
        timeout_secs: 5,
        competitions: competitions.iter().map(|c| c.to_string()).collect(),
        seasons: vec![2024],
        date_from: None,
        date_to: None,
    }
}

pub fn pipeline_settings() -> PipelineSettings {
    PipelineSettings {
        max_concurrent_competitions: 4,
        extract_timeout_secs: 30,
        load_timeout_secs: 30,
        collaborator_timeout_secs: 30,
        extract_max_attempts: 1,
        load_max_attempts: 3,
        collaborator_max_attempts: 2,
        node_retry_backoff_ms: 10,
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

pub async fn memory_db() -> Arc<DatabaseConnection> {
    let db = connection::create_pool(&DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: None,
        min_connections: None,
        connect_timeout: None,
        idle_timeout: None,
    })
    .await
    .expect("Failed to open in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    Arc::new(db)
}

/// 直接校验JSON记录得到一个赛事的抽取结果
pub fn extract_of(code: &str, run_id: RunId, matches: &[Value]) -> CompetitionExtract {
    let competition = Competition {
        id: competition_id(code),
        code: code.to_string(),
        name: format!("League {}", code),
        country: None,
    };
    let ctx = RecordContext {
        competition: &competition,
        season: Some(2024),
        run_id,
        extracted_at: Utc::now(),
    };
    let mut batch = ValidatedBatch::new(competition.clone());
    let mut rejected = Vec::new();
    for value in matches {
        match validate_record(value, &ctx) {
            RecordOutcome::Accepted(record) => {
                let record = *record;
                batch.push(record.record, record.home, record.away);
            }
            RecordOutcome::Rejected(r) => rejected.push(r),
        }
    }
    CompetitionExtract {
        competition: code.to_string(),
        accepted: batch.len() as u64,
        batch,
        rejected,
        requests: 1,
        raw_payloads: Vec::new(),
    }
}

/// 模拟上游API、内存数据库与内存落地区的完整环境
#[allow(dead_code)]
pub struct Harness {
    pub api: MockServer,
    pub db: Arc<DatabaseConnection>,
    pub storage: Arc<InMemoryStorage>,
    pub landing: Arc<LandingWriter>,
    pub raw_repo: Arc<RawRepositoryImpl>,
    pub run_repo: Arc<RunRepositoryImpl>,
}

impl Harness {
    pub async fn new() -> Self {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new());
        Self {
            api: MockServer::start().await,
            landing: Arc::new(LandingWriter::new(storage.clone(), true)),
            raw_repo: Arc::new(RawRepositoryImpl::new(db.clone())),
            run_repo: Arc::new(RunRepositoryImpl::new(db.clone())),
            storage,
            db,
        }
    }

    /// 让上游API对该赛事返回给定比赛
    pub async fn serve_matches(&self, code: &str, matches: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/competitions/{}/matches", code)))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload(code, matches)))
            .mount(&self.api)
            .await;
    }

    pub async fn serve_status(&self, code: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/competitions/{}/matches", code)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.api)
            .await;
    }

    pub fn orchestrator(&self, competitions: &[&str]) -> PipelineOrchestrator {
        self.orchestrator_with(
            competitions,
            Arc::new(NoopTransformTrigger),
            Arc::new(NoopQualityCheck),
        )
    }

    pub fn orchestrator_with(
        &self,
        competitions: &[&str],
        transform: Arc<dyn TransformTrigger>,
        quality: Arc<dyn QualityCheck>,
    ) -> PipelineOrchestrator {
        self.orchestrator_tuned(
            api_settings(&self.api.uri(), competitions),
            pipeline_settings(),
            transform,
            quality,
        )
    }

    /// 使用自定义的API与编排配置，便于构造超时场景
    pub fn orchestrator_tuned(
        &self,
        settings: ApiSettings,
        pipeline: PipelineSettings,
        transform: Arc<dyn TransformTrigger>,
        quality: Arc<dyn QualityCheck>,
    ) -> PipelineOrchestrator {
        let client = Arc::new(
            FootballDataClient::new(&settings).expect("Failed to build API client"),
        );
        let extractor = Arc::new(Extractor::new(
            client,
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            fast_retry(),
            ExtractionWindow::from(&settings),
        ));
        let components = PipelineComponents {
            extractor,
            landing: self.landing.clone(),
            loader: Arc::new(RawLoader::new(self.landing.clone(), self.raw_repo.clone())),
            runs: self.run_repo.clone(),
            transform,
            quality,
            sink: Arc::new(StorageCompletionSink::new(self.storage.clone())),
        };
        PipelineOrchestrator::new(components, settings.competitions, pipeline, 0.10)
    }
}
