//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Ollama / Scripted）实现 LlmClient：complete 返回回复文本与本次 token 用量。
//! 错误按是否瞬时分类，只有瞬时错误会被 RetryingLlmClient 退避重试。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::TokenUsage;
use crate::memory::Message;

/// LLM 传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 限流、超时、网络错误、5xx 视为瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_) | LlmError::Timeout(_) | LlmError::Network(_) | LlmError::Server(_)
        )
    }

    /// 按 HTTP 状态码归类：429 / 5xx / 529 重试，其余 4xx 不重试
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => LlmError::RateLimited(message),
            408 => LlmError::Timeout(message),
            500..=599 => LlmError::Server(format!("{status}: {message}")),
            _ => LlmError::Api(format!("{status}: {message}")),
        }
    }
}

/// 一次完成调用的结果
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 实际请求使用的模型名（用于用量记账）
    fn model(&self) -> &str;

    /// 非流式完成：system 提示 + 完整对话历史
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<Completion, LlmError>;
}
