//! 瞬时错误退避重试
//!
//! RetryingLlmClient 包装任意 LlmClient：限流 / 超时 / 5xx 按指数退避重试，最多 max_attempts 次；
//! 其它错误立即返回。解析失败、校验失败不在这里处理，它们属于反思循环的状态机。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::ExponentialBackoffBuilder;

use crate::llm::{Completion, LlmClient, LlmError};
use crate::memory::Message;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 总尝试次数上限（含首次）
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// 带退避重试的 LLM 客户端
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> Result<Completion, LlmError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let inner = &self.inner;
        let max_attempts = self.config.max_attempts.max(1);

        retry_notify(
            policy,
            move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match inner.complete(system, messages).await {
                    Ok(completion) => Ok(completion),
                    Err(e) if e.is_transient() && n < max_attempts => Err(backoff::Error::transient(e)),
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            },
            |err: LlmError, wait: Duration| {
                tracing::warn!(
                    model = %inner.model(),
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "transient LLM failure, backing off"
                );
            },
        )
        .await
    }
}
