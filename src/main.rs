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

use matchday::config::settings::Settings;
use matchday::domain::models::extraction_run::RunOutcome;
use matchday::domain::services::extraction_service::{ExtractionWindow, Extractor};
use matchday::domain::services::landing_service::LandingWriter;
use matchday::domain::services::load_service::RawLoader;
use matchday::engines::football_data_engine::FootballDataClient;
use matchday::infrastructure::database::connection;
use matchday::infrastructure::repositories::raw_repo_impl::RawRepositoryImpl;
use matchday::infrastructure::repositories::run_repo_impl::RunRepositoryImpl;
use matchday::infrastructure::storage::create_storage_repository;
use matchday::pipeline::cancel::CancelHandle;
use matchday::pipeline::collaborators::{
    create_quality_check, create_transform_trigger, StorageCompletionSink,
};
use matchday::pipeline::orchestrator::{PipelineComponents, PipelineOrchestrator};
use matchday::utils::rate_limiter::RateLimiter;
use matchday::utils::retry_policy::RetryPolicy;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use matchday::utils::telemetry;
use migration::{Migrator, MigratorTrait};

/// 主函数
///
/// 加载配置、初始化各组件并执行一次完整运行；运行结论决定退出码。
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(&settings.logging);
    matchday::infrastructure::metrics::init_metrics(&settings.metrics);
    info!("Starting matchday...");

    // 3. Connect to database
    let db = Arc::new(connection::create_pool(&settings.database).await?);

    // Run database migrations
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Initialize Components
    let storage = Arc::new(create_storage_repository(&settings.landing));
    let landing = Arc::new(LandingWriter::new(
        storage.clone(),
        settings.landing.keep_raw_payload,
    ));
    let raw_repo = Arc::new(RawRepositoryImpl::new(db.clone()));
    let run_repo = Arc::new(RunRepositoryImpl::new(db.clone()));

    let client = Arc::new(FootballDataClient::new(&settings.api)?);
    let limiter = Arc::new(RateLimiter::new(
        settings.rate_limiting.requests_per_window,
        settings.rate_limiting.window(),
    ));
    let extractor = Arc::new(Extractor::new(
        client,
        limiter,
        RetryPolicy::from(&settings.retry),
        ExtractionWindow::from(&settings.api),
    ));

    let components = PipelineComponents {
        extractor,
        landing: landing.clone(),
        loader: Arc::new(RawLoader::new(landing, raw_repo)),
        runs: run_repo,
        transform: create_transform_trigger(&settings.transform)?,
        quality: create_quality_check(&settings.quality)?,
        sink: Arc::new(StorageCompletionSink::new(storage)),
    };
    let orchestrator = PipelineOrchestrator::new(
        components,
        settings.api.competitions.clone(),
        settings.pipeline.clone(),
        settings.quality.max_rejection_ratio,
    );

    // 5. Ctrl-C cancels the run
    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    // 6. Run
    let summary = orchestrator.run(cancel.signal()).await?;
    info!(run_id = %summary.run_id, outcome = %summary.outcome, "matchday finished");

    Ok(match summary.outcome {
        RunOutcome::Success => ExitCode::SUCCESS,
        RunOutcome::Partial => ExitCode::from(2),
        RunOutcome::Failed => ExitCode::FAILURE,
    })
}
