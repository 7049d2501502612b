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
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::settings::PipelineSettings;
use crate::domain::models::extraction_run::{RunId, RunOutcome};
use crate::domain::models::landing_artifact::LandingArtifact;
use crate::domain::models::load_stats::LoadStats;
use crate::domain::models::task_run::{DomainError, TaskError, TaskRun};
use crate::domain::repositories::run_repository::RunRepository;
use crate::domain::services::extraction_service::{CompetitionExtract, Extractor};
use crate::domain::services::landing_service::LandingWriter;
use crate::domain::services::load_service::RawLoader;
use crate::infrastructure::metrics;
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::collaborators::{
    CollaboratorError, CompletionSink, QualityCheck, QualityReport, TransformTrigger,
};
use crate::pipeline::graph::{TaskContext, TaskGraph, TaskHandler, TaskNode, TriggerRule};
use crate::pipeline::quality_gate::{self, BranchResult, GateVerdict};
use crate::pipeline::scheduler::{Scheduler, SchedulerConfig, TaskBoard};
use crate::pipeline::summary::{self, CompetitionSummary, RunSummary};
use crate::utils::errors::PipelineError;

pub const QUALITY_GATE: &str = "quality_gate";
pub const TRANSFORM: &str = "transform";
pub const QUALITY_CHECK: &str = "quality_check";
pub const COMPLETE: &str = "complete";

/// 闸门及其后的节点
pub const DOWNSTREAM_NODES: [&str; 4] = [QUALITY_GATE, TRANSFORM, QUALITY_CHECK, COMPLETE];

/// 一个赛事分支的节点ID，按执行顺序排列
pub fn branch_nodes(competition: &str) -> [String; 4] {
    ["extract", "land", "validate", "load"].map(|stage| format!("{}:{}", stage, competition))
}

/// 编排器依赖的组件
pub struct PipelineComponents {
    pub extractor: Arc<Extractor>,
    pub landing: Arc<LandingWriter>,
    pub loader: Arc<RawLoader>,
    pub runs: Arc<dyn RunRepository>,
    pub transform: Arc<dyn TransformTrigger>,
    pub quality: Arc<dyn QualityCheck>,
    pub sink: Arc<dyn CompletionSink>,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Extract,
    Land,
    Validate,
    Load,
    Gate,
    Transform,
    QualityCheck,
    Complete,
}

#[derive(Default)]
struct BranchRecord {
    extract: Option<Arc<CompetitionExtract>>,
    accepted: u64,
    rejected: u64,
    artifact: Option<LandingArtifact>,
    load: Option<LoadStats>,
}

#[derive(Default)]
struct RunState {
    branches: HashMap<String, BranchRecord>,
    gate: Option<GateVerdict>,
    quality: Option<QualityReport>,
}

/// 单次运行内各节点共享的上下文
struct RunContext {
    run_id: RunId,
    started_at: DateTime<Utc>,
    components: Arc<PipelineComponents>,
    competitions: Vec<String>,
    max_rejection_ratio: f64,
    board: TaskBoard,
    node_order: Mutex<Vec<String>>,
    state: Mutex<RunState>,
}

fn task_error<E: crate::utils::errors::Classify + std::fmt::Display>(err: E) -> TaskError {
    TaskError::from_classified(&err)
}

impl RunContext {
    async fn extract(&self, competition: &str) -> Result<(), TaskError> {
        let extract = self
            .components
            .extractor
            .extract(competition, self.run_id)
            .await
            .map_err(task_error)?;
        info!(
            run_id = %self.run_id,
            competition,
            accepted = extract.accepted,
            rejected = extract.rejected.len(),
            requests = extract.requests,
            "Extraction finished"
        );
        let mut state = self.state.lock();
        let branch = state.branches.entry(competition.to_string()).or_default();
        branch.accepted = extract.accepted;
        branch.rejected = extract.rejected.len() as u64;
        branch.extract = Some(Arc::new(extract));
        Ok(())
    }

    async fn land(&self, competition: &str) -> Result<(), TaskError> {
        let extract = self
            .state
            .lock()
            .branches
            .get(competition)
            .and_then(|b| b.extract.clone())
            .ok_or_else(|| TaskError::permanent(format!("no extract for {}", competition)))?;
        let artifact = self
            .components
            .landing
            .write(self.run_id, &extract)
            .await
            .map_err(task_error)?;

        let mut state = self.state.lock();
        let branch = state.branches.entry(competition.to_string()).or_default();
        // 已落地，释放内存中的批次
        branch.extract = None;
        branch.artifact = Some(artifact);
        Ok(())
    }

    async fn validate(&self, competition: &str) -> Result<(), TaskError> {
        let artifact = self
            .state
            .lock()
            .branches
            .get(competition)
            .and_then(|b| b.artifact.clone())
            .ok_or_else(|| TaskError::permanent(format!("no artifact for {}", competition)))?;
        self.components
            .landing
            .validate(&artifact)
            .await
            .map_err(task_error)
    }

    /// 按运行ID顺序补齐该赛事尚未加载的落地文件，本次运行的文件最后加载
    async fn load(&self, competition: &str) -> Result<(), TaskError> {
        let loader = &self.components.loader;
        let applied = loader
            .load_pending(competition, self.run_id)
            .await
            .map_err(task_error)?;
        if applied.len() > 1 {
            info!(
                run_id = %self.run_id,
                competition,
                artifacts = applied.len(),
                "Loaded backlog of earlier runs"
            );
        }

        let stats = match applied.iter().find(|(id, _)| *id == self.run_id) {
            Some((_, stats)) => *stats,
            None => loader
                .repository()
                .ledger_entry(competition, self.run_id)
                .await
                .map_err(task_error)?
                .ok_or_else(|| {
                    TaskError::permanent(format!(
                        "artifact of run {} for {} was not loaded",
                        self.run_id, competition
                    ))
                })?,
        };
        self.state
            .lock()
            .branches
            .entry(competition.to_string())
            .or_default()
            .load = Some(stats);
        Ok(())
    }

    fn gate(&self) -> Result<(), TaskError> {
        let branches: Vec<BranchResult> = {
            let state = self.state.lock();
            self.competitions
                .iter()
                .map(|c| {
                    let [_, _, _, load] = branch_nodes(c);
                    let record = state.branches.get(c);
                    BranchResult {
                        competition: c.clone(),
                        accepted: record.map(|r| r.accepted).unwrap_or(0),
                        rejected: record.map(|r| r.rejected).unwrap_or(0),
                        load_state: self.board.state(&load).unwrap_or_default(),
                        load: record.and_then(|r| r.load),
                    }
                })
                .collect()
        };

        let verdict = quality_gate::evaluate(&branches, self.max_rejection_ratio);
        info!(
            run_id = %self.run_id,
            passed = verdict.passed,
            ratio = verdict.ratio,
            rejected = verdict.rejected,
            seen = verdict.seen,
            loaded_branches = verdict.loaded_branches,
            "Quality gate evaluated"
        );
        let result = match &verdict.reason {
            Some(reason) => Err(TaskError::quality_gate(reason.clone())),
            None => Ok(()),
        };
        self.state.lock().gate = Some(verdict);
        result
    }

    async fn quality_check(&self) -> Result<(), TaskError> {
        let report = self
            .components
            .quality
            .check(self.run_id)
            .await
            .map_err(task_error)?;
        let passed = report.passed;
        let details = report.details.to_string();
        self.state.lock().quality = Some(report);
        if passed {
            Ok(())
        } else {
            Err(task_error(CollaboratorError::QualityFailed(details)))
        }
    }

    async fn complete(&self) -> Result<(), TaskError> {
        let tasks: Vec<TaskRun> = self
            .node_order
            .lock()
            .iter()
            .filter(|id| id.as_str() != COMPLETE)
            .filter_map(|id| self.board.get(id))
            .collect();
        let summary = self.summary(tasks).await;
        self.components
            .sink
            .complete(&summary)
            .await
            .map_err(task_error)
    }

    async fn summary(&self, tasks: Vec<TaskRun>) -> RunSummary {
        let repo = self.components.loader.repository();
        let requests = self.components.extractor.request_counts();

        let mut competitions = Vec::with_capacity(self.competitions.len());
        for c in &self.competitions {
            let raw_matches = repo.count_matches(Some(c.as_str())).await.ok();
            let state = self.state.lock();
            let record = state.branches.get(c);
            competitions.push(CompetitionSummary {
                competition: c.clone(),
                state: summary::branch_state(&tasks, c),
                accepted: record.map(|r| r.accepted).unwrap_or(0),
                rejected: record.map(|r| r.rejected).unwrap_or(0),
                requests: requests.get(c).copied().unwrap_or(0),
                artifact: record.and_then(|r| r.artifact.as_ref().map(|a| a.key.clone())),
                load: record.and_then(|r| r.load),
                raw_matches,
                error: summary::branch_error(&tasks, c),
            });
        }

        let state = self.state.lock();
        RunSummary {
            run_id: self.run_id,
            outcome: summary::run_outcome(&tasks, &competitions),
            started_at: self.started_at,
            finished_at: Utc::now(),
            competitions,
            quality_gate: state.gate.clone(),
            quality_check: state.quality.clone(),
            tasks,
        }
    }
}

struct StageHandler {
    ctx: Arc<RunContext>,
    stage: Stage,
    competition: String,
}

#[async_trait]
impl TaskHandler for StageHandler {
    async fn run(&self, _task: TaskContext) -> Result<(), TaskError> {
        let c = self.competition.as_str();
        match self.stage {
            Stage::Extract => self.ctx.extract(c).await,
            Stage::Land => self.ctx.land(c).await,
            Stage::Validate => self.ctx.validate(c).await,
            Stage::Load => self.ctx.load(c).await,
            Stage::Gate => self.ctx.gate(),
            Stage::Transform => self
                .ctx
                .components
                .transform
                .trigger(self.ctx.run_id)
                .await
                .map_err(task_error),
            Stage::QualityCheck => self.ctx.quality_check().await,
            Stage::Complete => self.ctx.complete().await,
        }
    }
}

/// 流水线编排器
///
/// 每次 `run` 分配新的运行ID，构建任务图并交给调度器执行，最后持久化运行记录。
pub struct PipelineOrchestrator {
    components: Arc<PipelineComponents>,
    competitions: Vec<String>,
    settings: PipelineSettings,
    max_rejection_ratio: f64,
}

impl PipelineOrchestrator {
    pub fn new(
        components: PipelineComponents,
        competitions: Vec<String>,
        settings: PipelineSettings,
        max_rejection_ratio: f64,
    ) -> Self {
        Self {
            components: Arc::new(components),
            competitions,
            settings,
            max_rejection_ratio,
        }
    }

    fn build_graph(&self, ctx: &Arc<RunContext>) -> Result<TaskGraph, DomainError> {
        let s = &self.settings;
        let handler = |stage: Stage, competition: &str| -> Arc<dyn TaskHandler> {
            Arc::new(StageHandler {
                ctx: ctx.clone(),
                stage,
                competition: competition.to_string(),
            })
        };

        let mut graph = TaskGraph::new();
        let mut loads = Vec::with_capacity(self.competitions.len());
        for code in &self.competitions {
            let [extract, land, validate, load] = branch_nodes(code);
            graph.add(
                TaskNode::new(&extract, handler(Stage::Extract, code))
                    .timeout(s.extract_timeout())
                    .max_attempts(s.extract_max_attempts),
            )?;
            graph.add(
                TaskNode::new(&land, handler(Stage::Land, code))
                    .after([&extract])
                    .timeout(s.load_timeout()),
            )?;
            graph.add(
                TaskNode::new(&validate, handler(Stage::Validate, code))
                    .after([&land])
                    .timeout(s.load_timeout()),
            )?;
            graph.add(
                TaskNode::new(&load, handler(Stage::Load, code))
                    .after([&validate])
                    .timeout(s.load_timeout())
                    .max_attempts(s.load_max_attempts),
            )?;
            loads.push(load);
        }

        graph.add(
            TaskNode::new(QUALITY_GATE, handler(Stage::Gate, ""))
                .after(loads)
                .trigger(TriggerRule::AllDone)
                .timeout(s.collaborator_timeout()),
        )?;
        let downstream = [
            (TRANSFORM, QUALITY_GATE, Stage::Transform),
            (QUALITY_CHECK, TRANSFORM, Stage::QualityCheck),
            (COMPLETE, QUALITY_CHECK, Stage::Complete),
        ];
        for (id, dep, stage) in downstream {
            graph.add(
                TaskNode::new(id, handler(stage, ""))
                    .after([dep])
                    .timeout(s.collaborator_timeout())
                    .max_attempts(s.collaborator_max_attempts),
            )?;
        }

        *ctx.node_order.lock() = graph.nodes().iter().map(|n| n.id.clone()).collect();
        Ok(graph)
    }

    /// 执行一次完整运行
    ///
    /// 节点失败只体现在运行结论中；只有任务图本身无效或运行记录无法持久化时返回错误。
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: CancelSignal) -> Result<RunSummary, PipelineError> {
        let mut record = self.components.runs.start_run().await?;
        let run_id = record.id;
        info!(run_id = %run_id, competitions = ?self.competitions, "Run started");

        let ctx = Arc::new(RunContext {
            run_id,
            started_at: record.started_at,
            components: self.components.clone(),
            competitions: self.competitions.clone(),
            max_rejection_ratio: self.max_rejection_ratio,
            board: TaskBoard::new(),
            node_order: Mutex::new(Vec::new()),
            state: Mutex::new(RunState::default()),
        });

        let scheduler = Scheduler::new(SchedulerConfig {
            max_parallel: self.settings.max_concurrent_competitions,
            retry_backoff: self.settings.node_retry_backoff(),
        });
        let executed = match self.build_graph(&ctx) {
            Ok(graph) => scheduler.run(&graph, run_id, &ctx.board, cancel).await,
            Err(e) => Err(e),
        };
        let executed = match executed {
            Ok(executed) => executed,
            Err(e) => {
                record.finish(
                    RunOutcome::Failed,
                    self.components.extractor.take_request_counts(),
                );
                self.components.runs.finish_run(&record).await?;
                metrics::record_run(&RunOutcome::Failed.to_string());
                return Err(e.into());
            }
        };

        if executed.cancelled {
            warn!(run_id = %run_id, "Run cancelled");
        }
        let summary = ctx.summary(executed.runs).await;
        record.finish(
            summary.outcome,
            self.components.extractor.take_request_counts(),
        );
        self.components.runs.finish_run(&record).await?;
        metrics::record_run(&summary.outcome.to_string());
        summary.log();
        Ok(summary)
    }
}

