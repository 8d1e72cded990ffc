//! Planner：调用生成后端并把原始文本解析为 StepPlan
//!
//! 解析从第一个 `{` 到最后一个 `}` 截取子串尝试反序列化；失败、非对象或无花括号时
//! 退化为 `thoughts = 原文`、无工具调用。解析失败是预期路径，不是错误。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::{LlmClient, LlmError};
use crate::react::prompt::StepMode;

/// 单个工具调用：{"name": "web.search", "args": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// 一次生成解析后的计划
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPlan {
    pub thoughts: String,
    pub tool_calls: Vec<ToolCall>,
    pub final_text: Option<String>,
}

impl StepPlan {
    /// 生成后端重试耗尽时的确定性回退：无工具调用，文本按模式给出
    pub fn fallback(mode: &StepMode) -> Self {
        let final_text = match mode {
            StepMode::Goal { .. } => {
                "Could not complete the goal because the generation backend call failed. \
                 Please check your API key, quota and network, then retry."
            }
            StepMode::Coaching => {
                "The Leak: AI is temporarily offline; the generation backend call failed.\n\
                 The Fix: Check your API key, quota and network, then retry.\n\
                 The Vibe: Patient pause, deep breath."
            }
        };
        Self {
            thoughts: "Generation backend unreachable; returning fallback response.".to_string(),
            tool_calls: Vec::new(),
            final_text: Some(final_text.to_string()),
        }
    }

    /// 保留前 max 个工具调用，顺序不变
    pub fn clamp_tools(&mut self, max: usize) {
        self.tool_calls.truncate(max);
    }
}

/// 解析生成后端的原始输出，永不失败
pub fn parse_step_output(raw: &str) -> StepPlan {
    let degraded = || StepPlan {
        thoughts: raw.trim().to_string(),
        ..StepPlan::default()
    };

    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return degraded();
    };
    if end < start {
        return degraded();
    }
    let obj = match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => return degraded(),
        Err(e) => {
            tracing::debug!(error = %e, "model output is not valid JSON, keeping raw text");
            return degraded();
        }
    };

    let thoughts = match obj.get("thoughts") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };
    let tool_calls = match obj.get("tool_calls") {
        Some(Value::Array(items)) => items.iter().filter_map(tool_call_from_value).collect(),
        _ => Vec::new(),
    };
    let final_text = obj
        .get("final")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    StepPlan {
        thoughts,
        tool_calls,
        final_text,
    }
}

/// name 缺省时兼容 "tool" 字段；args 非对象时视为 {}
fn tool_call_from_value(v: &Value) -> Option<ToolCall> {
    let obj = v.as_object()?;
    let name = obj
        .get("name")
        .or_else(|| obj.get("tool"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let args = match obj.get("args") {
        Some(Value::Object(a)) => Value::Object(a.clone()),
        _ => Value::Object(Map::new()),
    };
    Some(ToolCall { name, args })
}

/// Planner：持有（已带重试的）生成后端
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 单次生成并解析；后端错误原样返回，由调用方决定回退
    pub async fn plan(&self, prompt: &str) -> Result<StepPlan, LlmError> {
        let raw = self.llm.complete(prompt).await?;
        Ok(parse_step_output(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_json() {
        let raw = r#"Sure! Here you go:
{"thoughts": "look them up", "tool_calls": [{"name": "web.search", "args": {"query": "Ada"}}], "final": ""}
Hope that helps."#;
        let plan = parse_step_output(raw);
        assert_eq!(plan.thoughts, "look them up");
        assert_eq!(plan.tool_calls, vec![ToolCall::new("web.search", json!({"query": "Ada"}))]);
        assert_eq!(plan.final_text, None);
    }

    #[test]
    fn test_parse_prose_degrades_to_thoughts() {
        let plan = parse_step_output("  just talking, no json here  ");
        assert_eq!(plan.thoughts, "just talking, no json here");
        assert!(plan.tool_calls.is_empty());
        assert!(plan.final_text.is_none());
    }

    #[test]
    fn test_parse_broken_json_keeps_raw_text() {
        let raw = "{\"thoughts\": \"oops\", }";
        let plan = parse_step_output(raw);
        assert_eq!(plan.thoughts, raw);
        assert!(plan.tool_calls.is_empty());

        let reversed = "} nothing {";
        assert_eq!(parse_step_output(reversed).thoughts, reversed);
    }

    #[test]
    fn test_parse_lenient_fields() {
        let raw = r#"{"thoughts": 42, "tool_calls": [{"tool": "notes.write", "args": "bad"}, 7], "final": "Done."}"#;
        let plan = parse_step_output(raw);
        assert_eq!(plan.thoughts, "42");
        assert_eq!(plan.tool_calls, vec![ToolCall::new("notes.write", json!({}))]);
        assert_eq!(plan.final_text.as_deref(), Some("Done."));

        let not_array = parse_step_output(r#"{"thoughts": "x", "tool_calls": {"name": "a"}}"#);
        assert!(not_array.tool_calls.is_empty());
    }

    #[test]
    fn test_fallback_text_per_mode() {
        let coaching = StepPlan::fallback(&StepMode::Coaching);
        let text = coaching.final_text.unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("The Leak: AI is temporarily offline"));

        let goal = StepPlan::fallback(&StepMode::Goal {
            goal: "book a room".into(),
            step_index: 0,
        });
        assert!(goal.final_text.unwrap().starts_with("Could not complete the goal"));
        assert!(goal.tool_calls.is_empty());
    }

    #[test]
    fn test_clamp_preserves_order() {
        let mut plan = StepPlan {
            tool_calls: vec![
                ToolCall::new("a", json!({})),
                ToolCall::new("b", json!({})),
                ToolCall::new("c", json!({})),
            ],
            ..StepPlan::default()
        };
        plan.clamp_tools(2);
        let names: Vec<_> = plan.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        plan.clamp_tools(0);
        assert!(plan.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_planner_passes_errors_through() {
        let planner = Planner::new(Arc::new(MockLlmClient::failing("down")));
        assert!(planner.plan("p").await.is_err());

        let planner = Planner::new(Arc::new(MockLlmClient::new()));
        let plan = planner.plan("p").await.unwrap();
        assert_eq!(plan.final_text.as_deref(), Some("No-op"));
    }
}
