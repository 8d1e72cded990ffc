//! 输出契约 JSON Schema 与可选参数校验
//!
//! step_contract_schema_json 由 schemars 生成，由 build_prompt 拼在输出契约之后；
//! validate_args 仅在开启 tools.validate_args 时由调度器调用。
//! 字段说明会进入 prompt，因此用英文书写。

use std::collections::HashMap;
use std::sync::OnceLock;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 单个工具调用：`{"name": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// Registered tool name from the TOOLS section
    pub name: String,
    /// Tool arguments matching that tool's schema
    pub args: HashMap<String, Value>,
}

/// 一步的模型输出契约
#[allow(dead_code)]
#[derive(JsonSchema)]
struct StepContract {
    /// Brief reasoning
    pub thoughts: String,
    /// Tool calls for this step, executed in order
    pub tool_calls: Vec<ToolCallFormat>,
    /// User-facing text, shaped by the output contract
    #[serde(rename = "final")]
    pub final_text: Option<String>,
}

/// 返回输出契约的 JSON Schema 字符串（进程内只生成一次）
pub fn step_contract_schema_json() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema = schema_for!(StepContract);
        serde_json::to_string(&schema).unwrap_or_default()
    })
}

/// 按工具声明的 schema 检查参数：必填键存在，已声明属性的基本类型匹配
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(obj) = args.as_object() else {
        return Err("arguments must be an object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if obj.get(key).map_or(true, Value::is_null) {
                return Err(format!("missing required field '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop) in props {
            let (Some(value), Some(expected)) = (obj.get(key), prop.get("type").and_then(Value::as_str))
            else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if !type_matches(expected, value) {
                return Err(format!("field '{key}' must be of type {expected}"));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contract_schema_mentions_fields() {
        let s = step_contract_schema_json();
        assert!(s.contains("tool_calls"));
        assert!(s.contains("\"final\""));
        assert!(s.contains("thoughts"));
    }

    #[test]
    fn test_validate_args() {
        let schema = json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "attendees": {"type": "array"}
            },
            "required": ["title"]
        });
        assert!(validate_args(&schema, &json!({"title": "Sync"})).is_ok());
        assert!(validate_args(&schema, &json!({}))
            .unwrap_err()
            .contains("title"));
        assert!(validate_args(&schema, &json!({"title": "x", "attendees": "bob"}))
            .unwrap_err()
            .contains("attendees"));
        assert!(validate_args(&schema, &json!("text")).is_err());
    }
}
