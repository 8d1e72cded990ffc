//! OmniSense - 会议助手的 Agent 编排核心
//!
//! 模块划分：
//! - **agent**: 无头运行时（单步、带隐私检查的 act、多步目标运行、反馈）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、时间源、运行时构建器
//! - **llm**: 生成后端抽象、重试包装与实现（OpenAI 兼容 / Mock）
//! - **memory**: 长期交互记忆、长上下文提示、JSON 记录文件、反馈日志
//! - **observability**: tracing 初始化与审计日志
//! - **policy**: 策略规则引擎（准入、存储、求值）
//! - **react**: prompt 组装、输出解析、单步编排与升级级别
//! - **research**: 人物 / 主题补全（Google CSE、Wikipedia）
//! - **session**: 会话事件存储
//! - **tools**: 工具注册表、调度器与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod policy;
pub mod react;
pub mod research;
pub mod session;
pub mod tools;

pub use agent::{AgentRuntime, GoalRequest, RunReport};
pub use core::{AgentBuilder, AgentError};
pub use react::{StepInput, StepOutput};
