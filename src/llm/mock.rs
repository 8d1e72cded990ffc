//! Mock 生成后端（用于测试与无 API Key 的本地运行）
//!
//! 默认返回一个不调用工具的合法 JSON；scripted 按顺序返回预置结果，用完后回到默认回复；
//! 记录调用次数与收到的 prompt，便于断言 prompt 组装。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};

const DEFAULT_REPLY: &str = r#"{"thoughts": "Mock backend: no API key configured", "tool_calls": [], "final": "No-op"}"#;

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    /// 设置后每次都返回该错误（优先于 script）
    always_fail: Option<LlmError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回预置结果
    pub fn scripted(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// 依次返回给定文本
    pub fn replies<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    /// 永远失败
    pub fn failing(message: &str) -> Self {
        Self {
            always_fail: Some(LlmError::Request(message.to_string())),
            ..Self::default()
        }
    }

    /// 每次调用前等待（用于超时测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 已收到的全部 prompt
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(DEFAULT_REPLY.to_string()))
    }
}
