//! 存储抽象
//!
//! 以 `/` 分隔的相对键访问二进制对象，提供本地磁盘和内存两种实现。

use async_trait::async_trait;
use dental_core::{DentalError, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 二进制对象存储接口
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 写入对象，整体替换已有内容，返回存储位置
    async fn put(&self, key: &str, data: &[u8]) -> Result<String>;

    /// 读取对象，不存在时返回 `NotFound`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// 检查对象是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 删除对象，返回对象此前是否存在
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 列出某个目录前缀下的直接子对象，按键排序
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

fn check_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(DentalError::InvalidInput(format!("Invalid storage key: {}", key)))
    }
}

fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// 本地磁盘存储
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let full_path = self.resolve(key)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DentalError::Storage(format!(
                    "Failed to create directory for file storage {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // 先写临时文件再重命名，替换是原子的
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp_path = full_path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, data).await.map_err(|e| {
            DentalError::Storage(format!("Failed to write {}: {}", key, e))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &full_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(DentalError::Storage(format!("Failed to write {}: {}", key, e)));
        }

        debug!("Stored {} bytes at {}", data.len(), full_path.display());
        Ok(full_path.to_string_lossy().to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(key)?;
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DentalError::NotFound(key.to_string()))
            }
            Err(e) => Err(DentalError::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&full_path).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let full_path = self.resolve(key)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!("Deleted {}", full_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DentalError::Storage(format!("Failed to delete {}: {}", key, e))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            keys.push(join_key(prefix, &name));
        }
        keys.sort();
        Ok(keys)
    }
}

/// 内存存储，用于测试和无盘部署
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        check_key(key)?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        check_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DentalError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.objects.write().await.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        check_key(prefix)?;
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|key| {
                key.strip_prefix(&dir)
                    .map(|rest| !rest.is_empty() && !rest.contains('/'))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
