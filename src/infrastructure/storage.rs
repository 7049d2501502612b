// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::settings::LandingSettings;
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};

/// 本地文件系统存储实现
///
/// 先写临时文件再硬链接到目标路径，目标已存在时链接失败，从而保证只新建不覆盖，
/// 读者也不会看到写了一半的文件。
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn get_full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    async fn write_tmp(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageRepository for LocalStorage {
    async fn save_new(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let full_path = self.get_full_path(key);

        // 确保目录存在
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = full_path.with_extension(format!("tmp-{:016x}", rand::random::<u64>()));
        let written = Self::write_tmp(&tmp_path, data).await;
        let linked = match written {
            Ok(()) => fs::hard_link(&tmp_path, &full_path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::AlreadyExists(key.to_string())
                } else {
                    StorageError::Io(e)
                }
            }),
            Err(e) => Err(e),
        };
        let _ = fs::remove_file(&tmp_path).await;
        linked
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let full_path = self.get_full_path(key);

        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.get_full_path(key)).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // 前缀以'/'结尾时视为目录，否则按目录加文件名前缀匹配
        let (dir, name_prefix) = match prefix.rfind('/') {
            Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
            None => ("", prefix),
        };

        let mut entries = match fs::read_dir(self.base_path.join(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(name_prefix) && !name.contains(".tmp-") {
                keys.push(if dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir, name)
                });
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// 存储工厂函数
pub fn create_storage_repository(settings: &LandingSettings) -> LocalStorage {
    LocalStorage::new(&settings.path)
}

/// 测试用的内存存储实现（用于单元测试）
pub struct InMemoryStorage {
    data: tokio::sync::RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            data: tokio::sync::RwLock::new(BTreeMap::new()),
        }
    }

    /// 直接替换某个键的内容，用于模拟损坏的文件
    pub async fn overwrite_for_test(&self, key: &str, data: &[u8]) {
        self.data.write().await.insert(key.to_string(), data.to_vec());
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageRepository for InMemoryStorage {
    async fn save_new(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        if map.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self.data.read().await;
        Ok(map.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let map = self.data.read().await;
        Ok(map.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let map = self.data.read().await;
        Ok(map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
