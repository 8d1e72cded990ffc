//! web.search：把查询交给研究提供方，返回其补全结果（可能是 source=none）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::memory::long_term::truncate_chars;
use crate::research::ResearchProvider;
use crate::session::{EventKind, SessionStore};
use crate::tools::Tool;

/// 查询的字符上限
pub const MAX_QUERY_CHARS: usize = 256;

pub struct WebSearchTool {
    provider: Arc<dyn ResearchProvider>,
    sessions: Arc<dyn SessionStore>,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn ResearchProvider>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { provider, sessions }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web.search"
    }

    fn description(&self) -> &str {
        "Search the web for public information relevant to the query using Google CSE or Wikipedia."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let raw = match args.get("query") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let query = truncate_chars(raw.trim(), MAX_QUERY_CHARS);
        let result = self.provider.enrich_person(&query).await?;
        let value = serde_json::to_value(&result).map_err(|e| e.to_string())?;
        let source = value["source"].clone();
        self.sessions
            .add_event(
                EventKind::System,
                json!({ "kind": "web.search", "details": { "query": query, "source": source } }),
            )
            .await;
        Ok(value)
    }
}
