//! 策略存储抽象层
//!
//! 整表读写：load 返回全部策略，save 覆盖写入。内存实现用于单进程与测试，文件实现写 `<data_dir>/policies.json`。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::policy::Policy;

/// 策略存储接口
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// 读取全部策略（按插入顺序）
    async fn load(&self) -> anyhow::Result<Vec<Policy>>;

    /// 覆盖写入全部策略
    async fn save(&self, policies: &[Policy]) -> anyhow::Result<()>;
}

/// 内存策略存储
#[derive(Default)]
pub struct MemoryPolicyStore {
    items: RwLock<Vec<Policy>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn load(&self) -> anyhow::Result<Vec<Policy>> {
        Ok(self.items.read().await.clone())
    }

    async fn save(&self, policies: &[Policy]) -> anyhow::Result<()> {
        *self.items.write().await = policies.to_vec();
        Ok(())
    }
}

/// JSON 文件策略存储；文件缺失或无法解析时视为空表
#[derive(Debug)]
pub struct FilePolicyStore {
    path: PathBuf,
}

impl FilePolicyStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PolicyStore for FilePolicyStore {
    async fn load(&self) -> anyhow::Result<Vec<Policy>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "policy file unreadable");
                return Ok(Vec::new());
            }
        };
        match serde_json::from_str::<Vec<Policy>>(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "policy file malformed");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, policies: &[Policy]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(policies)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn policy(id: &str) -> Policy {
        serde_json::from_value(json!({
            "id": id, "intent": "i", "ttlMs": 10, "createdAt": 0, "expiresAt": 10
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FilePolicyStore::new(dir.path().join("policies.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_and_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("policies.json");
        let store = FilePolicyStore::new(&path);
        store.save(&[policy("a"), policy("b")]).await.unwrap();
        let ids: Vec<String> = store.load().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        std::fs::write(&path, "not json").unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryPolicyStore::new();
        store.save(&[policy("x")]).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }
}
