// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::models::extraction_run::RunId;
use crate::domain::models::task_run::{DomainError, TaskError, TaskRun, TaskState};
use crate::infrastructure::metrics;
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::graph::{TaskContext, TaskGraph, TriggerRule};
use crate::utils::errors::ErrorClass;

/// 节点重试退避的上限
const MAX_NODE_BACKOFF: Duration = Duration::from_secs(300);

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 同时运行的节点数上限
    pub max_parallel: usize,
    /// 节点级重试的初始退避，之后每次翻倍
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// 任务状态看板
///
/// 调度器在每次状态转换后更新，处理器可以读取其他节点的状态。
#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    runs: Arc<RwLock<HashMap<String, TaskRun>>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, run: &TaskRun) {
        self.runs.write().insert(run.node_id.clone(), run.clone());
    }

    pub fn get(&self, node_id: &str) -> Option<TaskRun> {
        self.runs.read().get(node_id).cloned()
    }

    pub fn state(&self, node_id: &str) -> Option<TaskState> {
        self.runs.read().get(node_id).map(|r| r.state)
    }
}

/// 一次图执行的结果
#[derive(Debug, Clone)]
pub struct GraphRun {
    /// 按节点加入顺序排列
    pub runs: Vec<TaskRun>,
    pub cancelled: bool,
}

impl GraphRun {
    pub fn get(&self, node_id: &str) -> Option<&TaskRun> {
        self.runs.iter().find(|r| r.node_id == node_id)
    }

    pub fn state(&self, node_id: &str) -> Option<TaskState> {
        self.get(node_id).map(|r| r.state)
    }
}

/// 任务图调度器
///
/// 单个循环驱动所有状态转换；节点的每次尝试在 `JoinSet` 中独立运行。
pub struct Scheduler {
    config: SchedulerConfig,
}

enum Readiness {
    Wait,
    Ready,
    Skip,
}

struct Execution<'a> {
    graph: &'a TaskGraph,
    run_id: RunId,
    board: &'a TaskBoard,
    runs: Vec<TaskRun>,
    in_flight: HashMap<Id, usize>,
    delayed: Vec<(Instant, usize)>,
    tasks: JoinSet<Result<(), TaskError>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .retry_backoff
            .saturating_mul(factor)
            .min(MAX_NODE_BACKOFF)
    }

    /// 执行任务图直到所有节点进入终态或运行被取消
    ///
    /// 取消时中止所有在途尝试，所有非终态节点记为 FAILED("Cancelled")。
    pub async fn run(
        &self,
        graph: &TaskGraph,
        run_id: RunId,
        board: &TaskBoard,
        mut cancel: CancelSignal,
    ) -> Result<GraphRun, DomainError> {
        graph.topological_order()?;

        let mut exec = Execution {
            graph,
            run_id,
            board,
            runs: graph.nodes().iter().map(|n| TaskRun::new(&n.id)).collect(),
            in_flight: HashMap::new(),
            delayed: Vec::new(),
            tasks: JoinSet::new(),
        };
        for run in &exec.runs {
            board.publish(run);
        }

        let max_parallel = self.config.max_parallel.max(1);
        let mut cancelled = cancel.is_cancelled();

        loop {
            if cancelled {
                exec.cancel_all().await?;
                break;
            }

            let mut ready = exec.due_retries();
            ready.extend(exec.promote()?);
            for idx in ready {
                if exec.in_flight.len() < max_parallel {
                    exec.spawn(idx)?;
                } else if exec.runs[idx].state == TaskState::Retrying {
                    // 名额已满，重试留到下一轮
                    exec.delayed.push((Instant::now(), idx));
                }
            }

            if exec.runs.iter().all(|r| r.state.is_terminal()) {
                break;
            }
            if exec.in_flight.is_empty() && exec.delayed.is_empty() {
                return Err(DomainError::InvalidGraph(
                    "no runnable node left".to_string(),
                ));
            }

            let next_due = exec
                .delayed
                .iter()
                .map(|(due, _)| *due)
                .min()
                .filter(|_| exec.in_flight.len() < max_parallel);
            tokio::select! {
                joined = exec.tasks.join_next_with_id(), if !exec.tasks.is_empty() => {
                    match joined {
                        Some(Ok((id, result))) => {
                            if let Some(idx) = exec.in_flight.remove(&id) {
                                self.settle(&mut exec, idx, result)?;
                            }
                        }
                        Some(Err(join_error)) => {
                            if let Some(idx) = exec.in_flight.remove(&join_error.id()) {
                                let err =
                                    TaskError::permanent(format!("task aborted: {}", join_error));
                                self.settle(&mut exec, idx, Err(err))?;
                            }
                        }
                        None => {}
                    }
                }
                _ = sleep_until_opt(next_due), if next_due.is_some() => {}
                _ = cancel.cancelled() => {
                    cancelled = true;
                }
            }
        }

        Ok(GraphRun {
            runs: exec.runs,
            cancelled,
        })
    }

    fn settle(
        &self,
        exec: &mut Execution<'_>,
        idx: usize,
        result: Result<(), TaskError>,
    ) -> Result<(), DomainError> {
        let graph = exec.graph;
        let node = &graph.nodes()[idx];
        let run = &mut exec.runs[idx];
        match result {
            Ok(()) => {
                run.succeed()?;
                info!(run_id = %exec.run_id, node = %node.id, attempt = run.attempt, "Task succeeded");
            }
            Err(err) if err.class == ErrorClass::Transient && run.attempt < node.max_attempts => {
                let delay = self.backoff(run.attempt);
                warn!(
                    run_id = %exec.run_id,
                    node = %node.id,
                    attempt = run.attempt,
                    class = %err.class,
                    delay_ms = delay.as_millis() as u64,
                    error = %err.message,
                    "Task failed, retrying"
                );
                run.retry(err)?;
                exec.delayed.push((Instant::now() + delay, idx));
            }
            Err(err) => {
                error!(
                    run_id = %exec.run_id,
                    node = %node.id,
                    attempt = run.attempt,
                    class = %err.class,
                    error = %err.message,
                    "Task failed"
                );
                run.fail(err)?;
            }
        }
        exec.record(idx);
        Ok(())
    }
}

async fn sleep_until_opt(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

impl Execution<'_> {
    fn record(&self, idx: usize) {
        let run = &self.runs[idx];
        self.board.publish(run);
        metrics::record_task_transition(&run.node_id, &run.state.to_string());
    }

    fn readiness(&self, idx: usize) -> Readiness {
        let node = &self.graph.nodes()[idx];
        let states: Vec<TaskState> = node
            .deps
            .iter()
            .filter_map(|d| self.graph.position(d))
            .map(|i| self.runs[i].state)
            .collect();

        match node.trigger {
            TriggerRule::AllSuccess => {
                if states
                    .iter()
                    .any(|s| matches!(s, TaskState::Failed | TaskState::Skipped))
                {
                    Readiness::Skip
                } else if states.iter().all(|s| *s == TaskState::Success) {
                    Readiness::Ready
                } else {
                    Readiness::Wait
                }
            }
            TriggerRule::AllDone => {
                if states.iter().all(TaskState::is_terminal) {
                    Readiness::Ready
                } else {
                    Readiness::Wait
                }
            }
        }
    }

    /// 传播跳过并返回可以启动的节点
    ///
    /// 依赖总是先于依赖者加入，按加入顺序扫描一次即可到达不动点。
    fn promote(&mut self) -> Result<Vec<usize>, DomainError> {
        let mut ready = Vec::new();
        for idx in 0..self.runs.len() {
            if self.runs[idx].state != TaskState::Pending {
                continue;
            }
            match self.readiness(idx) {
                Readiness::Wait => {}
                Readiness::Ready => ready.push(idx),
                Readiness::Skip => {
                    self.runs[idx].skip()?;
                    info!(run_id = %self.run_id, node = %self.runs[idx].node_id, "Task skipped");
                    self.record(idx);
                }
            }
        }
        Ok(ready)
    }

    /// 取出到期的重试
    fn due_retries(&mut self) -> Vec<usize> {
        let now = Instant::now();
        let mut due: Vec<(Instant, usize)> = Vec::new();
        self.delayed.retain(|entry| {
            if entry.0 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort();
        due.into_iter().map(|(_, idx)| idx).collect()
    }

    fn spawn(&mut self, idx: usize) -> Result<(), DomainError> {
        self.runs[idx].start()?;
        self.record(idx);

        let graph = self.graph;
        let node = &graph.nodes()[idx];
        let handler = node.handler.clone();
        let timeout = node.timeout;
        let ctx = TaskContext {
            run_id: self.run_id,
            node_id: node.id.clone(),
            attempt: self.runs[idx].attempt,
        };
        info!(run_id = %self.run_id, node = %node.id, attempt = ctx.attempt, "Task started");

        let handle = self.tasks.spawn(async move {
            match tokio::time::timeout(timeout, handler.run(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(TaskError::timeout(timeout)),
            }
        });
        self.in_flight.insert(handle.id(), idx);
        Ok(())
    }

    /// 中止在途尝试，非终态节点记为取消
    async fn cancel_all(&mut self) -> Result<(), DomainError> {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        self.in_flight.clear();
        self.delayed.clear();

        for idx in 0..self.runs.len() {
            if !self.runs[idx].state.is_terminal() {
                self.runs[idx].fail(TaskError::cancelled())?;
                warn!(run_id = %self.run_id, node = %self.runs[idx].node_id, "Task cancelled");
                self.record(idx);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
