//! 后端选择：按 [llm].provider 创建客户端
//!
//! 三个后端都走 OpenAI 兼容协议，区别只在 base_url 与 API Key 来源：
//! - openai:   OPENAI_API_KEY，默认官方端点
//! - deepseek: DEEPSEEK_API_KEY（回退 OPENAI_API_KEY），https://api.deepseek.com
//! - ollama:   无需 Key，http://localhost:11434/v1
//!
//! 返回的客户端已包上 RetryingLlmClient。

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, OpenAiClient, RetryConfig, RetryingLlmClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// 创建带重试的客户端；model 为 None 时使用配置中的模型
pub fn create_client(section: &LlmSection, model: Option<&str>) -> Result<Arc<dyn LlmClient>, AgentError> {
    let model = model.unwrap_or(&section.model);
    let (base_url, api_key) = match section.provider.to_lowercase().as_str() {
        "openai" => (
            section.base_url.clone(),
            section
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        ),
        "deepseek" => (
            Some(section.base_url.clone().unwrap_or_else(|| DEEPSEEK_BASE_URL.to_string())),
            section
                .api_key
                .clone()
                .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        ),
        "ollama" => (
            Some(section.base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string())),
            Some("ollama".to_string()),
        ),
        other => {
            return Err(AgentError::Config(format!(
                "unknown LLM provider '{}' (expected openai, deepseek or ollama)",
                other
            )))
        }
    };

    tracing::info!(provider = %section.provider, model = %model, "LLM client created");

    let client = OpenAiClient::new(base_url.as_deref(), model, api_key.as_deref())
        .with_request_timeout(Duration::from_secs(section.timeouts.request));
    let retry = RetryConfig {
        max_attempts: section.retry.max_attempts,
        initial_backoff_ms: section.retry.initial_backoff_ms,
        max_backoff_ms: section.retry.max_backoff_ms,
    };
    Ok(Arc::new(RetryingLlmClient::new(Arc::new(client), retry)))
}
