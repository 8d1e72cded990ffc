//! 生成后端层：客户端抽象、重试包装与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage, DEEPSEEK_BASE_URL};
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient};
