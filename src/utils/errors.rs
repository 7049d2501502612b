// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::task_run::DomainError;

/// 错误分类
///
/// 每个层级的错误都归入其中一类，调度器和重试策略只依赖分类做决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 可重试（网络、限流、5xx、连接失败）
    Transient,
    /// 不可重试，作用范围限于单个赛事或单个落地文件
    Permanent,
    /// 节点超时
    Timeout,
    /// 数据质量闸门未通过
    QualityGate,
    /// 运行被取消
    Cancelled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::Timeout => write!(f, "timeout"),
            ErrorClass::QualityGate => write!(f, "quality_gate"),
            ErrorClass::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 可分类的错误
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// 服务端建议的重试等待时间
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("数据库错误: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("未找到数据")]
    NotFound,

    #[error("序列化错误: {0}")]
    Serialization(String),
}

impl Classify for RepositoryError {
    fn class(&self) -> ErrorClass {
        match self {
            RepositoryError::Database(sea_orm::DbErr::Conn(_))
            | RepositoryError::Database(sea_orm::DbErr::ConnectionAcquire(_)) => {
                ErrorClass::Transient
            }
            _ => ErrorClass::Permanent,
        }
    }
}

/// 编排器顶层错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("任务图错误: {0}")]
    Graph(#[from] DomainError),

    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),
}
