//! 生成后端抽象
//!
//! 编排层只需要单次完成：complete(prompt) -> 原始文本。RetryingLlmClient 在外层包装重试、指数退避与单次超时。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

/// 生成后端错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Empty response")]
    EmptyResponse,
}

/// 生成后端 trait：黑盒文本补全
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单次补全，可能失败
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略：最多 attempts 次；两次尝试之间等待 min(base * 2^i, max) + [0, jitter] 毫秒
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
    /// 单次尝试的截止时间；None 表示不限
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(2000),
            jitter: Duration::from_millis(100),
            attempt_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryConfig {
    /// 无等待、无超时（测试用）
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            attempt_timeout: None,
        }
    }

    /// 第 retry 次重试前的基础退避（不含抖动），retry 从 0 开始
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn backoff_with_jitter(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff(retry) + Duration::from_millis(extra)
    }
}

/// 带重试的后端包装：全部尝试失败时返回最后一次错误
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    async fn attempt(&self, prompt: &str) -> Result<String, LlmError> {
        match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.complete(prompt))
                .await
                .unwrap_or(Err(LlmError::Timeout(limit))),
            None => self.inner.complete(prompt).await,
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let attempts = self.config.attempts.max(1);
        let mut last_err = LlmError::EmptyResponse;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.backoff_with_jitter(attempt - 1)).await;
            }
            match self.attempt(prompt).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(attempt = attempt + 1, "LLM recovered after retries");
                    }
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, attempts, error = %e, "LLM attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.backoff(0), Duration::from_millis(250));
        assert_eq!(cfg.backoff(1), Duration::from_millis(500));
        assert_eq!(cfg.backoff(2), Duration::from_millis(1000));
        assert_eq!(cfg.backoff(3), Duration::from_millis(2000));
        assert_eq!(cfg.backoff(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let cfg = RetryConfig::default();
        for _ in 0..50 {
            let d = cfg.backoff_with_jitter(0);
            assert!(d >= Duration::from_millis(250));
            assert!(d <= Duration::from_millis(350));
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failures() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Request("boom".into())),
            Err(LlmError::Request("boom again".into())),
            Ok("{\"thoughts\":\"ok\"}".to_string()),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::immediate(3));
        let out = client.complete("hi").await.unwrap();
        assert_eq!(out, "{\"thoughts\":\"ok\"}");
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let mock = Arc::new(MockLlmClient::failing("upstream down"));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::immediate(3));
        let err = client.complete("hi").await.unwrap_err();
        assert_eq!(err, LlmError::Request("upstream down".into()));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_first_success_does_not_wait() {
        let mock = Arc::new(MockLlmClient::replies(["{\"thoughts\":\"fast\"}"]));
        let cfg = RetryConfig::default();
        let base = cfg.base_delay;
        let client = RetryingLlmClient::new(mock.clone(), cfg);
        let started = std::time::Instant::now();
        client.complete("hi").await.unwrap();
        assert!(started.elapsed() < base);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_after_exhaustion_is_from_final_attempt() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Request("first".into())),
            Err(LlmError::EmptyResponse),
            Err(LlmError::Request("third".into())),
            Ok("never reached".to_string()),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::immediate(3));
        let err = client.complete("hi").await.unwrap_err();
        assert_eq!(err, LlmError::Request("third".into()));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let mock = Arc::new(MockLlmClient::new().with_delay(Duration::from_millis(200)));
        let mut cfg = RetryConfig::immediate(2);
        cfg.attempt_timeout = Some(Duration::from_millis(10));
        let client = RetryingLlmClient::new(mock.clone(), cfg);
        let err = client.complete("hi").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
        assert_eq!(mock.calls(), 2);
    }
}
