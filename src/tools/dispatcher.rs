//! 工具调度器
//!
//! 持有只读 ToolRegistry、单次超时与审计日志。dispatch(name, args) 总是返回 ToolResult：
//! 未知工具、超时、工具自身失败都折叠为 ok=false，从不中断调用方。每次调用计时并写入审计日志。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::observability::AuditLog;
use crate::tools::{schema, ToolRegistry, ToolSchema};

/// 一次工具调用的结果，生成后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub ok: bool,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(name: &str, args: Value, result: Value) -> Self {
        Self {
            name: name.to_string(),
            ok: true,
            args,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(name: &str, args: Value, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok: false,
            args,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// 工具调度器
pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
    audit: Arc<AuditLog>,
    validate_args: bool,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64, audit: Arc<AuditLog>) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            audit,
            validate_args: false,
        }
    }

    /// 开启后，按工具声明的 schema 校验参数，不合法时返回 "Invalid arguments: …"
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn schema_summary(&self) -> Vec<ToolSchema> {
        self.registry.schema_summary()
    }

    /// 执行指定工具；args 为 null 时按空对象处理
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let args = if args.is_null() {
            Value::Object(Map::new())
        } else {
            args
        };
        let start = Instant::now();
        let outcome = self.run(name, args.clone()).await;
        let ms = start.elapsed().as_millis() as u64;

        let ok = outcome.is_ok();
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": ok,
            "duration_ms": ms,
            "args_preview": args_preview(&args),
        });
        tracing::info!(audit = %audit, "tool");
        self.audit
            .record("tool_result", serde_json::json!({ "name": name, "ms": ms, "ok": ok }))
            .await;

        match outcome {
            Ok(value) => ToolResult::success(name, args, value),
            Err(e) => ToolResult::failure(name, args, e.tool_error_text()),
        }
    }

    async fn run(&self, name: &str, args: Value) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        if self.validate_args {
            schema::validate_args(&tool.parameters_schema(), &args)
                .map_err(AgentError::InvalidArguments)?;
        }

        match timeout(self.timeout, tool.execute(args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(name.to_string())),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo args back"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(&self, args: Value) -> Result<Value, String> {
            Ok(args)
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn execute(&self, _args: Value) -> Result<Value, String> {
            Err("disk full".to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Value::Null)
        }
    }

    fn dispatcher(audit: Arc<AuditLog>) -> ToolDispatcher {
        let mut reg = ToolRegistry::new();
        reg.register(Echo);
        reg.register(Broken);
        reg.register(Slow);
        ToolDispatcher::new(reg, 30, audit)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_inline_failure() {
        let d = dispatcher(Arc::new(AuditLog::disabled()));
        let r = d.dispatch("nope.tool", json!({"a": 1})).await;
        assert!(!r.ok);
        assert_eq!(r.error.as_deref(), Some("Unknown tool"));
        assert_eq!(r.args, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_success_and_failure_results() {
        let d = dispatcher(Arc::new(AuditLog::disabled()));
        let ok = d.dispatch("echo", json!({"text": "hi"})).await;
        assert!(ok.ok);
        assert_eq!(ok.result, Some(json!({"text": "hi"})));

        let bad = d.dispatch("broken", Value::Null).await;
        assert!(!bad.ok);
        assert_eq!(bad.error.as_deref(), Some("disk full"));
        assert_eq!(bad.args, json!({}));
    }

    #[tokio::test]
    async fn test_timeout_reported_as_failure() {
        let d = dispatcher(Arc::new(AuditLog::disabled())).with_timeout(Duration::from_millis(20));
        let r = d.dispatch("slow", json!({})).await;
        assert!(!r.ok);
        assert_eq!(r.error.as_deref(), Some("Tool timeout: slow"));
    }

    #[tokio::test]
    async fn test_validation_is_opt_in() {
        let d = dispatcher(Arc::new(AuditLog::disabled()));
        assert!(d.dispatch("echo", json!({})).await.ok);

        let d = dispatcher(Arc::new(AuditLog::disabled())).with_arg_validation(true);
        let r = d.dispatch("echo", json!({})).await;
        assert!(!r.ok);
        assert!(r.error.unwrap().starts_with("Invalid arguments:"));
    }

    #[tokio::test]
    async fn test_every_dispatch_is_audited() {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::new(
            dir.path().join("agent.log"),
            Arc::new(crate::core::SystemClock),
        ));
        let d = dispatcher(audit.clone());
        d.dispatch("echo", json!({"text": "a"})).await;
        d.dispatch("missing", json!({})).await;
        let lines = audit.read_recent(10).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "echo");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[1]["name"], "missing");
        assert_eq!(lines[1]["ok"], false);
        assert!(lines[1]["ms"].is_u64());
    }
}
