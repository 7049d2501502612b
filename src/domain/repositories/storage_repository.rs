// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use crate::utils::errors::{Classify, ErrorClass};

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 键已存在，落地文件不可覆盖
    #[error("Key already exists: {0}")]
    AlreadyExists(String),
}

impl Classify for StorageError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Permanent
    }
}

/// 存储仓库特质
///
/// 定义落地区数据访问接口。写入只允许新建，已存在的键永远不会被覆盖。
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 使用指定键保存数据，键已存在时返回 [`StorageError::AlreadyExists`]
    async fn save_new(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// 根据键从存储中检索数据
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// 检查存储中是否存在指定键
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// 列出以 `prefix` 开头的键，按字典序排列
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
