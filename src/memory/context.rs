//! 长上下文提示
//!
//! 一段简短的背景文本（会议议程、参会人、用户自述等），拼入 prompt 的 LongContext 段。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::memory::long_term::truncate_chars;

/// 提示文本的字符上限
pub const LONG_CONTEXT_MAX_CHARS: usize = 2000;

#[async_trait]
pub trait LongContextProvider: Send + Sync {
    async fn assemble(&self) -> String;
}

/// 固定文本
#[derive(Debug, Clone, Default)]
pub struct StaticLongContext {
    text: String,
}

impl StaticLongContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl LongContextProvider for StaticLongContext {
    async fn assemble(&self) -> String {
        truncate_chars(&self.text, LONG_CONTEXT_MAX_CHARS)
    }
}

/// 从文件读取（默认 `<data_dir>/context.md`）；文件缺失时为空
#[derive(Debug, Clone)]
pub struct FileLongContext {
    path: PathBuf,
}

impl FileLongContext {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl LongContextProvider for FileLongContext {
    async fn assemble(&self) -> String {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => truncate_chars(s.trim(), LONG_CONTEXT_MAX_CHARS),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_context_is_trimmed_and_capped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.md");
        std::fs::write(&path, format!("  {}  \n", "a".repeat(3000))).unwrap();
        let ctx = FileLongContext::new(&path).assemble().await;
        assert_eq!(ctx.len(), LONG_CONTEXT_MAX_CHARS);

        let missing = FileLongContext::new(dir.path().join("none.md")).assemble().await;
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_static_context() {
        let ctx = StaticLongContext::new("Weekly sync with design team");
        assert_eq!(ctx.assemble().await, "Weekly sync with design team");
    }
}
