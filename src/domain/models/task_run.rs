// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::utils::errors::{Classify, ErrorClass};

/// 任务节点状态
///
/// 状态转换遵循以下流程：
/// Pending → Running → Success/Failed，Running → Retrying → Running，
/// Pending → Skipped。Success、Failed、Skipped为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Retrying,
    Skipped,
}

impl TaskState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Success => write!(f, "SUCCESS"),
            TaskState::Failed => write!(f, "FAILED"),
            TaskState::Retrying => write!(f, "RETRYING"),
            TaskState::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl FromStr for TaskState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskState::Pending),
            "RUNNING" => Ok(TaskState::Running),
            "SUCCESS" => Ok(TaskState::Success),
            "FAILED" => Ok(TaskState::Failed),
            "RETRYING" => Ok(TaskState::Retrying),
            "SKIPPED" => Ok(TaskState::Skipped),
            _ => Err(()),
        }
    }
}

/// 任务处理器返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{class}: {message}")]
pub struct TaskError {
    pub class: ErrorClass,
    pub message: String,
}

impl TaskError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, message)
    }

    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::new(
            ErrorClass::Timeout,
            format!("Timeout after {}ms", limit.as_millis()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorClass::Cancelled, "Cancelled")
    }

    pub fn quality_gate(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::QualityGate, message)
    }

    /// 从任意可分类的错误构造
    pub fn from_classified<E: Classify + fmt::Display>(err: &E) -> Self {
        Self::new(err.class(), err.to_string())
    }
}

impl Classify for TaskError {
    fn class(&self) -> ErrorClass {
        self.class
    }
}

/// 领域错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition for {node}: {from} -> {to}")]
    InvalidStateTransition {
        node: String,
        from: TaskState,
        to: TaskState,
    },

    /// 任务图定义错误
    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),
}

/// 任务节点的一次执行记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    /// 节点ID
    pub node_id: String,
    /// 已开始的尝试次数
    pub attempt: u32,
    /// 当前状态
    pub state: TaskState,
    /// 首次进入Running的时间
    pub started_at: Option<DateTime<Utc>>,
    /// 进入终态的时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 最近一次错误
    pub last_error: Option<TaskError>,
}

impl TaskRun {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            attempt: 0,
            state: TaskState::Pending,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    fn transition(&mut self, allowed: &[TaskState], to: TaskState) -> Result<(), DomainError> {
        if !allowed.contains(&self.state) {
            return Err(DomainError::InvalidStateTransition {
                node: self.node_id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// 开始一次尝试：Pending/Retrying → Running
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Pending, TaskState::Retrying], TaskState::Running)?;
        self.attempt += 1;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Running → Success
    pub fn succeed(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Running], TaskState::Success)
    }

    /// Running → Retrying
    pub fn retry(&mut self, error: TaskError) -> Result<(), DomainError> {
        self.transition(&[TaskState::Running], TaskState::Retrying)?;
        self.last_error = Some(error);
        Ok(())
    }

    /// 任意非终态 → Failed
    ///
    /// Pending和Retrying只在运行被取消时直接进入Failed。
    pub fn fail(&mut self, error: TaskError) -> Result<(), DomainError> {
        self.transition(
            &[TaskState::Pending, TaskState::Running, TaskState::Retrying],
            TaskState::Failed,
        )?;
        self.last_error = Some(error);
        Ok(())
    }

    /// Pending → Skipped
    pub fn skip(&mut self) -> Result<(), DomainError> {
        self.transition(&[TaskState::Pending], TaskState::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_cycle() {
        let mut run = TaskRun::new("load:PL");
        run.start().unwrap();
        run.retry(TaskError::transient("connection reset")).unwrap();
        run.start().unwrap();
        run.succeed().unwrap();

        assert_eq!(run.state, TaskState::Success);
        assert_eq!(run.attempt, 2);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_skip_only_from_pending() {
        let mut run = TaskRun::new("land:PD");
        run.start().unwrap();
        let err = run.skip().unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                node: "land:PD".to_string(),
                from: TaskState::Running,
                to: TaskState::Skipped,
            }
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = TaskRun::new("extract:PL");
        run.start().unwrap();
        run.fail(TaskError::timeout(std::time::Duration::from_millis(50)))
            .unwrap();
        assert!(run.start().is_err());
        assert!(run.fail(TaskError::cancelled()).is_err());
        assert_eq!(
            run.last_error.as_ref().map(|e| e.class),
            Some(ErrorClass::Timeout)
        );
    }

    #[test]
    fn test_state_round_trips_through_string() {
        for state in [
            TaskState::Pending,
            TaskState::Running,
            TaskState::Success,
            TaskState::Failed,
            TaskState::Retrying,
            TaskState::Skipped,
        ] {
            assert_eq!(state.to_string().parse::<TaskState>(), Ok(state));
        }
    }
}
