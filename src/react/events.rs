//! 编排过程写入会话时间线的 system 事件
//!
//! 序列化为 `{"kind": "agent.step", ...}`，与工具写入的 `{kind, details}` 事件共用 kind 字段。

use serde::Serialize;
use serde_json::Value;

use crate::react::StepOutput;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum StepEvent {
    /// 一步完成：耗时与完整输出
    #[serde(rename = "agent.step")]
    Step { ms: u64, output: StepOutput },
    /// 生成后端重试耗尽
    #[serde(rename = "agent.error")]
    Error { details: ErrorDetails },
    /// 多步运行中的一步
    #[serde(rename = "agent.run_step")]
    RunStep { index: usize, tools: usize },
    /// 多步运行的校验产物写入失败
    #[serde(rename = "agent.run_artifact_write_failed")]
    RunArtifactWriteFailed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    #[serde(rename = "where")]
    pub location: String,
    pub error: String,
}

impl StepEvent {
    pub fn upstream_failure(error: impl Into<String>) -> Self {
        StepEvent::Error {
            details: ErrorDetails {
                location: "run_step.generate".to_string(),
                error: error.into(),
            },
        }
    }

    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
