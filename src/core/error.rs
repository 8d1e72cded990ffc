//! Agent 错误类型
//!
//! 单步编排对外从不返回错误（run_step 总是得到合法 StepOutput）；AgentError 由工具调度折叠成 ToolResult.error，
//! 也是 act / run_goal / activate_policy / record_feedback 等可拒绝入口的错误类型。

use thiserror::Error;

use crate::policy::PolicyRejection;

/// Agent 运行过程中可能出现的错误（工具、隐私、策略准入、存储）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 未注册的工具名；Display 固定为 "Unknown tool"，直接作为 ToolResult.error 返回
    #[error("Unknown tool")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 仅在开启 tools.validate_args 时出现
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// 策略准入失败；Display 为拒绝码（missing_fields / forbidden_scope / sensitive_inference）
    #[error("{0}")]
    PolicyRejected(#[from] PolicyRejection),

    /// 隐私模式为 off 时拒绝调用云端生成后端
    #[error("privacy_off")]
    PrivacyOff,

    #[error("missing_goal")]
    MissingGoal,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AgentError {
    /// 写入 ToolResult.error 的文本：工具自身的失败信息原样透出，其余用 Display
    pub fn tool_error_text(&self) -> String {
        match self {
            AgentError::ToolExecutionFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
