//! 审计日志（JSON Lines）
//!
//! 独立于会话事件的持久化轨迹：每行一个对象，含 `ts`（注入的 Clock 给出的毫秒）与 `type`，其余字段由调用方给出。
//! 写入失败只记 warn，不影响调用方。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core::{Clock, SystemClock};

/// read_recent 的默认条数
pub const DEFAULT_RECENT: usize = 200;

/// 追加式审计日志；path 为 None 时不落盘
pub struct AuditLog {
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// 不落盘的审计日志（测试与纯内存运行）
    pub fn disabled() -> Self {
        Self {
            path: None,
            clock: Arc::new(SystemClock),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 追加一条记录；fields 若不是对象则放在 `data` 键下
    pub async fn record(&self, kind: &str, fields: Value) {
        let Some(path) = &self.path else {
            return;
        };
        let mut entry = Map::new();
        entry.insert("ts".into(), Value::from(self.clock.now_ms()));
        entry.insert("type".into(), Value::from(kind));
        match fields {
            Value::Object(map) => entry.extend(map),
            Value::Null => {}
            other => {
                entry.insert("data".into(), other);
            }
        }
        let line = format!("{}\n", Value::Object(entry));

        let _guard = self.write_lock.lock().await;
        if let Err(e) = append_line(path, &line).await {
            tracing::warn!(path = %path.display(), error = %e, "audit log write failed");
        }
    }

    /// 最近 limit 条记录（按写入顺序）；无法解析的行跳过
    pub async fn read_recent(&self, limit: usize) -> Vec<Value> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let raw = match tokio::fs::read_to_string(path).await {
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
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await
}
