// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::extraction_run::RunId;
use crate::domain::models::task_run::{DomainError, TaskError};

/// 触发规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerRule {
    /// 所有前驱成功才运行；任一前驱失败或跳过则跳过
    AllSuccess,
    /// 所有前驱进入终态即运行
    AllDone,
}

/// 一次尝试的上下文
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub node_id: String,
    /// 当前尝试序号，从1开始
    pub attempt: u32,
}

/// 任务处理器特质
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError>;
}

struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F, Fut>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        (self.f)(ctx).await
    }
}

/// 用闭包构造处理器
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _marker: PhantomData,
    })
}

/// 任务图节点
#[derive(Clone)]
pub struct TaskNode {
    pub id: String,
    pub deps: Vec<String>,
    pub trigger: TriggerRule,
    /// 单次尝试的超时时间
    pub timeout: Duration,
    /// 最大尝试次数（包含第一次）
    pub max_attempts: u32,
    pub handler: Arc<dyn TaskHandler>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            id: id.into(),
            deps: Vec::new(),
            trigger: TriggerRule::AllSuccess,
            timeout: Duration::from_secs(600),
            max_attempts: 1,
            handler,
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn trigger(mut self, trigger: TriggerRule) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .field("trigger", &self.trigger)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// 有向无环任务图
///
/// 节点按加入顺序保存，调度时同时就绪的节点按该顺序启动。
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入节点，依赖必须已经存在
    pub fn add(&mut self, node: TaskNode) -> Result<(), DomainError> {
        if self.index.contains_key(&node.id) {
            return Err(DomainError::InvalidGraph(format!(
                "duplicate node {}",
                node.id
            )));
        }
        if let Some(missing) = node.deps.iter().find(|d| !self.index.contains_key(*d)) {
            return Err(DomainError::InvalidGraph(format!(
                "{} depends on unknown node {}",
                node.id, missing
            )));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// 节点在加入顺序中的位置
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Kahn算法求拓扑序，有环时报错
    pub fn topological_order(&self) -> Result<Vec<&str>, DomainError> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.deps {
                let d = self.index.get(dep).copied().ok_or_else(|| {
                    DomainError::InvalidGraph(format!("unknown node {}", dep))
                })?;
                dependents[d].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|i| in_degree[*i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = queue.pop_front() {
            order.push(self.nodes[i].id.as_str());
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(DomainError::InvalidGraph("cycle detected".to_string()));
        }
        Ok(order)
    }
}
