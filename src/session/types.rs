//! 会话与事件类型
//!
//! 持久化字段沿用 `{t, type, data}` 的紧凑事件格式。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insight,
    Note,
    System,
}

/// 会话时间线上的一条事件，追加后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "data")]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub id: String,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub events: Vec<AgentEvent>,
}

impl AgentSession {
    pub fn new(id: String, started_at: i64) -> Self {
        Self {
            id,
            started_at,
            ended_at: None,
            events: Vec::new(),
        }
    }

    /// 未结束即为活动会话
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// 指定 kind 的 system 事件（payload.kind）
    pub fn system_events<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a AgentEvent> + 'a {
        self.events.iter().filter(move |e| {
            e.kind == EventKind::System && e.payload.get("kind").and_then(Value::as_str) == Some(kind)
        })
    }
}

/// 新会话 id：`sess-<毫秒>-<8 位随机十六进制>`
pub fn new_session_id(now_ms: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("sess-{}-{}", now_ms, &suffix[..8])
}
