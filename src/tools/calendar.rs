//! calendar.create_event：向本地日历文件追加一条事件记录

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Clock;
use crate::memory::JsonListFile;
use crate::session::{EventKind, SessionStore};
use crate::tools::Tool;

const MAX_ATTENDEES: usize = 20;

pub struct CalendarTool {
    file: JsonListFile,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl CalendarTool {
    pub fn new(file: JsonListFile, sessions: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            file,
            sessions,
            clock,
        }
    }
}

fn text_arg(args: &Value, key: &str) -> Option<String> {
    match args.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar.create_event"
    }

    fn description(&self) -> &str {
        "Create a calendar event stub saved locally."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "when": { "type": "string" },
                "attendees": { "type": "array", "items": { "type": "string" } },
                "notes": { "type": "string" }
            },
            "required": ["title", "when"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let title = text_arg(&args, "title")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let attendees: Vec<Value> = args
            .get("attendees")
            .and_then(Value::as_array)
            .map(|a| a.iter().take(MAX_ATTENDEES).cloned().collect())
            .unwrap_or_default();
        let event = json!({
            "title": title,
            "when": text_arg(&args, "when").unwrap_or_default(),
            "attendees": attendees,
            "notes": text_arg(&args, "notes").unwrap_or_default(),
            "createdAt": self.clock.now_ms(),
        });

        self.file
            .append(event.clone(), None)
            .await
            .map_err(|e| e.to_string())?;
        self.sessions
            .add_event(
                EventKind::System,
                json!({ "kind": "calendar.create_event", "details": event }),
            )
            .await;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::session::MemorySessionStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_event_defaults_and_caps() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(99));
        let sessions = Arc::new(MemorySessionStore::new(clock.clone()));
        sessions.start().await;
        let tool = CalendarTool::new(
            JsonListFile::new(dir.path().join("calendar.json")),
            sessions.clone(),
            clock,
        );

        let attendees: Vec<String> = (0..30).map(|i| format!("p{i}")).collect();
        let out = tool
            .execute(json!({"when": "tomorrow 10:00", "attendees": attendees}))
            .await
            .unwrap();
        assert_eq!(out["title"], "Untitled");
        assert_eq!(out["attendees"].as_array().unwrap().len(), 20);
        assert_eq!(out["createdAt"], 99);

        let saved = JsonListFile::new(dir.path().join("calendar.json")).load().await.unwrap();
        assert_eq!(saved, vec![out]);
        let session = sessions.status().await.unwrap();
        assert_eq!(session.system_events("calendar.create_event").count(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calendar.json");
        std::fs::write(&path, "{}").unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let tool = CalendarTool::new(
            JsonListFile::new(&path),
            Arc::new(MemorySessionStore::new(clock.clone())),
            clock,
        );
        assert!(tool.execute(json!({"title": "x", "when": "now"})).await.is_err());
    }
}
