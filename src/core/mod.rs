//! 核心层：错误类型、时间源、运行时构建器

pub mod builder;
pub mod clock;
pub mod error;

pub use builder::AgentBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AgentError;

/// 观测：开放的字符串键映射（目标、音频强度、传感器读数、转写片段……），消费方按键防御式读取
pub type Observation = serde_json::Map<String, serde_json::Value>;
