//! JSON 数组文件
//!
//! 日历、记忆条目等「追加到数组」的持久化：整文件读出、追加、整文件写回。
//! 同一进程内的读-改-写由锁串行化；文件缺失视为空数组。

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::Mutex;

/// 单文件 JSON 数组
#[derive(Debug)]
pub struct JsonListFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonListFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部条目；文件缺失或为空时返回空 Vec，内容不是数组时报错
    pub async fn load(&self) -> anyhow::Result<Vec<Value>> {
        let _guard = self.lock.lock().await;
        self.read_items().await
    }

    /// 追加一条；max_items 为 Some 时只保留最新的 n 条
    pub async fn append(&self, item: Value, max_items: Option<usize>) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut items = self.read_items().await?;
        items.push(item);
        if let Some(max) = max_items {
            let excess = items.len().saturating_sub(max);
            items.drain(..excess);
        }
        self.write_items(&items).await
    }

    async fn read_items(&self) -> anyhow::Result<Vec<Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Array(items) => Ok(items),
            _ => anyhow::bail!("{} does not contain a JSON array", self.path.display()),
        }
    }

    async fn write_items(&self, items: &[Value]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(items)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_creates_file_and_keeps_order() {
        let dir = TempDir::new().unwrap();
        let file = JsonListFile::new(dir.path().join("data").join("calendar.json"));
        assert!(file.load().await.unwrap().is_empty());
        file.append(json!({"title": "a"}), None).await.unwrap();
        file.append(json!({"title": "b"}), None).await.unwrap();
        let items = file.load().await.unwrap();
        assert_eq!(items, vec![json!({"title": "a"}), json!({"title": "b"})]);
    }

    #[tokio::test]
    async fn test_append_trims_to_max_items() {
        let dir = TempDir::new().unwrap();
        let file = JsonListFile::new(dir.path().join("memory.json"));
        for i in 0..5 {
            file.append(json!(i), Some(3)).await.unwrap();
        }
        assert_eq!(file.load().await.unwrap(), vec![json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_non_array_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"a\": 1}").unwrap();
        let file = JsonListFile::new(&path);
        assert!(file.append(json!(1), None).await.is_err());
    }
}
