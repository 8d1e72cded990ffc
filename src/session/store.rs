//! 会话存储接口与内存实现

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::core::Clock;
use crate::session::types::new_session_id;
use crate::session::{AgentEvent, AgentSession, EventKind};

/// 会话存储接口；所有操作都不返回错误，持久化失败由实现自行记录
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 新建会话（新 id、空事件表）并设为活动会话
    async fn start(&self) -> AgentSession;

    /// 结束活动会话；没有活动会话时返回 None
    async fn stop(&self) -> Option<AgentSession>;

    /// 最近一次会话（可能已结束）
    async fn status(&self) -> Option<AgentSession>;

    /// 向活动会话追加事件；没有活动会话时丢弃
    async fn add_event(&self, kind: EventKind, payload: Value);
}

/// 内存与文件实现共用的会话状态
pub(crate) struct SessionCell {
    current: RwLock<Option<AgentSession>>,
    clock: Arc<dyn Clock>,
}

impl SessionCell {
    pub(crate) fn new(clock: Arc<dyn Clock>, initial: Option<AgentSession>) -> Self {
        Self {
            current: RwLock::new(initial),
            clock,
        }
    }

    /// 在写锁内执行 f；f 返回的 bool 为 true 时把新快照交给 persist
    pub(crate) async fn mutate<T, F, P, Fut>(&self, f: F, persist: P) -> T
    where
        F: FnOnce(&mut Option<AgentSession>, i64) -> (T, bool),
        P: FnOnce(Option<AgentSession>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut guard = self.current.write().await;
        let now = self.clock.now_ms();
        let (out, changed) = f(&mut *guard, now);
        if changed {
            persist(guard.clone()).await;
        }
        out
    }

    pub(crate) async fn snapshot(&self) -> Option<AgentSession> {
        self.current.read().await.clone()
    }
}

pub(crate) fn apply_start(slot: &mut Option<AgentSession>, now: i64) -> (AgentSession, bool) {
    let session = AgentSession::new(new_session_id(now), now);
    *slot = Some(session.clone());
    (session, true)
}

pub(crate) fn apply_stop(slot: &mut Option<AgentSession>, now: i64) -> (Option<AgentSession>, bool) {
    match slot.as_mut() {
        Some(s) if s.is_active() => {
            s.ended_at = Some(now);
            (Some(s.clone()), true)
        }
        _ => (None, false),
    }
}

pub(crate) fn apply_event(
    slot: &mut Option<AgentSession>,
    now: i64,
    kind: EventKind,
    payload: Value,
) -> ((), bool) {
    match slot.as_mut() {
        Some(s) if s.is_active() => {
            s.events.push(AgentEvent {
                timestamp: now,
                kind,
                payload,
            });
            ((), true)
        }
        _ => ((), false),
    }
}

/// 内存会话存储
pub struct MemorySessionStore {
    cell: SessionCell,
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cell: SessionCell::new(clock, None),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn start(&self) -> AgentSession {
        self.cell.mutate(apply_start, |_| async {}).await
    }

    async fn stop(&self) -> Option<AgentSession> {
        self.cell.mutate(apply_stop, |_| async {}).await
    }

    async fn status(&self) -> Option<AgentSession> {
        self.cell.snapshot().await
    }

    async fn add_event(&self, kind: EventKind, payload: Value) {
        self.cell
            .mutate(|slot, now| apply_event(slot, now, kind, payload), |_| async {})
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use serde_json::json;

    fn store() -> (Arc<ManualClock>, MemorySessionStore) {
        let clock = Arc::new(ManualClock::new(1_000));
        (clock.clone(), MemorySessionStore::new(clock))
    }

    #[tokio::test]
    async fn test_add_event_before_start_is_dropped() {
        let (_, s) = store();
        s.add_event(EventKind::System, json!({"kind": "x"})).await;
        assert!(s.status().await.is_none());
        let started = s.start().await;
        assert!(started.events.is_empty());
    }

    #[tokio::test]
    async fn test_events_append_in_order() {
        let (clock, s) = store();
        s.start().await;
        for i in 0..5 {
            clock.advance(10);
            s.add_event(EventKind::Note, json!({"i": i})).await;
        }
        let session = s.status().await.unwrap();
        assert_eq!(session.events.len(), 5);
        let order: Vec<i64> = session.events.iter().map(|e| e.payload["i"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(session.events[4].timestamp, 1_050);
    }

    #[tokio::test]
    async fn test_start_replaces_active_session() {
        let (_, s) = store();
        let first = s.start().await;
        s.add_event(EventKind::Insight, json!({})).await;
        let second = s.start().await;
        assert_ne!(first.id, second.id);
        assert!(s.status().await.unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn test_stop_semantics() {
        let (clock, s) = store();
        assert!(s.stop().await.is_none());
        s.start().await;
        clock.advance(500);
        let stopped = s.stop().await.unwrap();
        assert_eq!(stopped.ended_at, Some(1_500));
        assert!(s.stop().await.is_none());

        s.add_event(EventKind::System, json!({"late": true})).await;
        let status = s.status().await.unwrap();
        assert!(status.events.is_empty());
        assert!(!status.is_active());
    }
}
