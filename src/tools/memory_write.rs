//! memory.write：追加一条带标签的自由文本记忆

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Clock;
use crate::memory::JsonListFile;
use crate::session::{EventKind, SessionStore};
use crate::tools::Tool;

pub struct MemoryWriteTool {
    file: JsonListFile,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl MemoryWriteTool {
    pub fn new(file: JsonListFile, sessions: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            file,
            sessions,
            clock,
        }
    }
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "memory.write"
    }

    fn description(&self) -> &str {
        "Write a memory item with optional tags to long-term store."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let text = match args.get("text") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let tags = match args.get("tags") {
            Some(Value::Array(a)) => Value::Array(a.clone()),
            _ => json!([]),
        };
        let item = json!({ "text": text, "tags": tags, "createdAt": self.clock.now_ms() });

        self.file
            .append(item.clone(), None)
            .await
            .map_err(|e| e.to_string())?;
        self.sessions
            .add_event(EventKind::System, json!({ "kind": "memory.write", "details": item }))
            .await;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::session::MemorySessionStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_item_appended() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(5));
        let tool = MemoryWriteTool::new(
            JsonListFile::new(dir.path().join("memory.json")),
            Arc::new(MemorySessionStore::new(clock.clone())),
            clock,
        );
        tool.execute(json!({"text": "prefers morning meetings", "tags": ["schedule"]}))
            .await
            .unwrap();
        let out = tool.execute(json!({"text": "likes short agendas"})).await.unwrap();
        assert_eq!(out["tags"], json!([]));

        let saved = JsonListFile::new(dir.path().join("memory.json")).load().await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0]["tags"], json!(["schedule"]));
        assert_eq!(saved[1]["createdAt"], 5);
    }
}
