//! 文件会话存储
//!
//! 每次变更把整份快照 `{"session": …}` 重写到 JSON 文件（最后写入者生效，不保证部分写入的崩溃安全）。
//! 打开时加载上次快照；读写失败只记 warn。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Clock;
use crate::session::store::{apply_event, apply_start, apply_stop, SessionCell};
use crate::session::{AgentSession, EventKind, SessionStore};

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    #[serde(default)]
    session: Option<AgentSession>,
}

/// 文件会话存储
pub struct FileSessionStore {
    path: PathBuf,
    cell: SessionCell,
}

impl FileSessionStore {
    /// 打开存储；文件缺失或损坏时从空状态开始
    pub async fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        let path = path.as_ref().to_path_buf();
        let initial = load_snapshot(&path).await;
        Self {
            cell: SessionCell::new(clock, initial),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn load_snapshot(path: &Path) -> Option<AgentSession> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "session snapshot unreadable");
            return None;
        }
    };
    match serde_json::from_str::<Snapshot>(&raw) {
        Ok(s) => s.session,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "session snapshot malformed");
            None
        }
    }
}

async fn save_snapshot(path: &Path, session: Option<AgentSession>) {
    let write = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(&Snapshot { session })?;
        tokio::fs::write(path, body).await?;
        Ok::<(), anyhow::Error>(())
    };
    if let Err(e) = write.await {
        tracing::warn!(path = %path.display(), error = %e, "session snapshot write failed");
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn start(&self) -> AgentSession {
        let path = self.path.as_path();
        self.cell
            .mutate(apply_start, |s| save_snapshot(path, s))
            .await
    }

    async fn stop(&self) -> Option<AgentSession> {
        let path = self.path.as_path();
        self.cell
            .mutate(apply_stop, |s| save_snapshot(path, s))
            .await
    }

    async fn status(&self) -> Option<AgentSession> {
        self.cell.snapshot().await
    }

    async fn add_event(&self, kind: EventKind, payload: Value) {
        let path = self.path.as_path();
        self.cell
            .mutate(
                |slot, now| apply_event(slot, now, kind, payload),
                |s| save_snapshot(path, s),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        let clock = Arc::new(ManualClock::new(10));

        let store = FileSessionStore::open(&path, clock.clone()).await;
        let started = store.start().await;
        store.add_event(EventKind::Insight, json!({"text": "speaker paused"})).await;
        store.add_event(EventKind::System, json!({"kind": "agent.step"})).await;

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["session"]["id"], started.id.as_str());
        assert_eq!(raw["session"]["events"].as_array().unwrap().len(), 2);

        let reopened = FileSessionStore::open(&path, clock).await;
        let status = reopened.status().await.unwrap();
        assert_eq!(status.id, started.id);
        assert_eq!(status.events.len(), 2);
        assert!(reopened.stop().await.is_some());
    }

    #[tokio::test]
    async fn test_no_write_when_nothing_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        let store = FileSessionStore::open(&path, Arc::new(ManualClock::new(0))).await;
        store.add_event(EventKind::Note, json!({})).await;
        assert!(store.stop().await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, "{broken").unwrap();
        let store = FileSessionStore::open(&path, Arc::new(ManualClock::new(0))).await;
        assert!(store.status().await.is_none());
    }
}
