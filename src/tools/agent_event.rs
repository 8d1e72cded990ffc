//! 会话时间线工具：agent.event / agent.verify_step / notes.write
//!
//! 三者都只向活动会话追加事件；没有活动会话时事件被丢弃，调用仍视为成功。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::policy::predicate::is_truthy;
use crate::session::{EventKind, SessionStore};
use crate::tools::Tool;

/// agent.event(kind, details?)：追加一条 system 事件 `{kind, details}`
pub struct AgentEventTool {
    sessions: Arc<dyn SessionStore>,
}

impl AgentEventTool {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Tool for AgentEventTool {
    fn name(&self) -> &str {
        "agent.event"
    }

    fn description(&self) -> &str {
        "Emit an internal agent event into the session timeline."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "kind": { "type": "string" }, "details": { "type": "object" } },
            "required": ["kind"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let kind = args
            .get("kind")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("note")
            .to_string();
        let details = match args.get("details") {
            Some(v) if !v.is_null() => v.clone(),
            _ => Value::Object(Map::new()),
        };
        self.sessions
            .add_event(EventKind::System, json!({ "kind": kind, "details": details }))
            .await;
        Ok(Value::Bool(true))
    }
}

/// agent.verify_step(claim, evidence?, pass)：记录一次通过 / 未通过的自检
pub struct VerifyStepTool {
    sessions: Arc<dyn SessionStore>,
}

impl VerifyStepTool {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Tool for VerifyStepTool {
    fn name(&self) -> &str {
        "agent.verify_step"
    }

    fn description(&self) -> &str {
        "Record a pass/fail verification of a claim, with optional evidence."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "claim": { "type": "string" },
                "evidence": { "type": "string" },
                "pass": { "type": "boolean" }
            },
            "required": ["claim", "pass"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let claim = args
            .get("claim")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let evidence = args.get("evidence").cloned().unwrap_or(Value::Null);
        let pass = args.get("pass").is_some_and(is_truthy);
        let details = json!({ "claim": claim, "evidence": evidence, "pass": pass });
        self.sessions
            .add_event(
                EventKind::System,
                json!({ "kind": "agent.verify", "details": details }),
            )
            .await;
        Ok(details)
    }
}

/// notes.write(text)：追加一条 note 事件
pub struct NotesWriteTool {
    sessions: Arc<dyn SessionStore>,
}

impl NotesWriteTool {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Tool for NotesWriteTool {
    fn name(&self) -> &str {
        "notes.write"
    }

    fn description(&self) -> &str {
        "Write a short note into the session timeline."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if text.trim().is_empty() {
            return Err("text is required".to_string());
        }
        self.sessions
            .add_event(EventKind::Note, json!({ "text": text }))
            .await;
        Ok(json!({ "text": text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::session::MemorySessionStore;

    fn sessions() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::new(Arc::new(ManualClock::new(0))))
    }

    #[tokio::test]
    async fn test_agent_event_defaults() {
        let s = sessions();
        s.start().await;
        let tool = AgentEventTool::new(s.clone());
        tool.execute(json!({})).await.unwrap();
        tool.execute(json!({"kind": "agent.level3", "details": {"signature": "obs:|tools:|ok:0"}}))
            .await
            .unwrap();
        let events = s.status().await.unwrap().events;
        assert_eq!(events[0].payload, json!({"kind": "note", "details": {}}));
        assert_eq!(events[1].payload["details"]["signature"], "obs:|tools:|ok:0");
    }

    #[tokio::test]
    async fn test_verify_step_records_pass_flag() {
        let s = sessions();
        s.start().await;
        let tool = VerifyStepTool::new(s.clone());
        let out = tool
            .execute(json!({"claim": "Executed 1 tool(s); 0 of 1 succeeded", "pass": false}))
            .await
            .unwrap();
        assert_eq!(out["pass"], false);
        let session = s.status().await.unwrap();
        let verify: Vec<_> = session.system_events("agent.verify").collect();
        assert_eq!(verify.len(), 1);
        assert_eq!(verify[0].payload["details"]["claim"], "Executed 1 tool(s); 0 of 1 succeeded");
    }

    #[tokio::test]
    async fn test_notes_write_requires_text() {
        let s = sessions();
        s.start().await;
        let tool = NotesWriteTool::new(s.clone());
        assert!(tool.execute(json!({})).await.is_err());
        tool.execute(json!({"text": "follow up on budget"})).await.unwrap();
        let events = s.status().await.unwrap().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Note);
    }
}
