//! 反馈日志（JSON Lines）
//!
//! 用户对某次动作的赞 / 踩与可选纠正，按行追加到 `<data_dir>/feedback.jsonl`；stats 统计最近 200 条。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// list_recent 默认条数
pub const DEFAULT_RECENT_FEEDBACK: usize = 50;
const STATS_WINDOW: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub t: i64,
    pub action_id: String,
    pub action_type: String,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    /// up / total；没有反馈时为 1.0
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub async fn append(&self, entry: &FeedbackEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = format!("{}\n", serde_json::to_string(entry)?);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// 最近 limit 条；无法解析的行跳过
    pub async fn list_recent(&self, limit: usize) -> Vec<FeedbackEntry> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..]
            .iter()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    pub async fn stats(&self) -> FeedbackStats {
        let items = self.list_recent(STATS_WINDOW).await;
        let up = items.iter().filter(|e| e.rating == Rating::Up).count();
        let down = items.len() - up;
        let total = up + down;
        FeedbackStats {
            total,
            up,
            down,
            accuracy: if total > 0 { up as f64 / total as f64 } else { 1.0 },
        }
    }
}
