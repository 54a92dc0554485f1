//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DeepSeek、Ollama 等。
//! 每次调用返回本次 token 用量，不在客户端内累计。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{Completion, LlmClient, LlmError, TokenUsage};
use crate::memory::{Message, Role};

/// 按 SDK 错误结构归类：reqwest 错误看状态码与超时/连接标志，API 错误看 type / code
fn classify_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else if let Some(status) = e.status() {
                LlmError::from_status(status.as_u16(), e.to_string())
            } else if e.is_connect() || e.is_request() {
                LlmError::Network(e.to_string())
            } else {
                LlmError::Api(e.to_string())
            }
        }
        OpenAIError::ApiError(api) => classify_api_error(api),
        OpenAIError::JSONDeserialize(e, _) => LlmError::InvalidResponse(e.to_string()),
        other => LlmError::Api(other.to_string()),
    }
}

fn classify_api_error(api: ApiError) -> LlmError {
    let kind = api.r#type.as_deref().unwrap_or("");
    let code = api.code.as_deref().unwrap_or("");
    let message = api.to_string();
    match (kind, code) {
        ("insufficient_quota", _) | (_, "insufficient_quota") => LlmError::Api(message),
        (_, "rate_limit_exceeded") | ("requests" | "tokens" | "rate_limit_error", _) => {
            LlmError::RateLimited(message)
        }
        ("server_error" | "overloaded_error" | "api_error", _) | (_, "server_error" | "overloaded") => {
            LlmError::Server(message)
        }
        // 5xx 的响应体不一定是 JSON，SDK 此时只填 message
        ("", "") if api.param.is_none() => LlmError::Server(message),
        _ => LlmError::Api(message),
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        // SDK 自带的限流重试关掉，统一由 RetryingLlmClient 退避
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(config).with_backoff(no_retry),
            model: model.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn to_openai_messages(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::InvalidResponse(e.to_string());

        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(build_err)?,
        ));
        for m in messages {
            let msg = match m.role {
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
            };
            out.push(msg);
        }
        Ok(out)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> Result<Completion, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(system, messages)?)
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                LlmError::Timeout(format!("no response within {}s", self.request_timeout.as_secs()))
            })?
            .map_err(classify_error)?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens as u64,
                completion_tokens: u.completion_tokens as u64,
                cached_tokens: u
                    .prompt_tokens_details
                    .as_ref()
                    .and_then(|d| d.cached_tokens)
                    .unwrap_or(0) as u64,
            })
            .unwrap_or_default();

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("response has no message content".to_string()))?;

        Ok(Completion { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(kind: Option<&str>, code: Option<&str>, message: &str) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: kind.map(String::from),
            param: None,
            code: code.map(String::from),
        })
    }

    #[test]
    fn test_context_length_error_is_permanent() {
        let err = classify_error(api_error(
            Some("invalid_request_error"),
            Some("context_length_exceeded"),
            "This model's maximum context length is 8192 tokens. However, your messages resulted in 15000 tokens (500 in the completion).",
        ));
        assert!(matches!(err, LlmError::Api(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        let rate = classify_error(api_error(Some("requests"), Some("rate_limit_exceeded"), "slow down"));
        assert!(matches!(rate, LlmError::RateLimited(_)));
        let server = classify_error(api_error(None, None, "<html>502 Bad Gateway</html>"));
        assert!(matches!(server, LlmError::Server(_)));
        let quota = classify_error(api_error(Some("insufficient_quota"), None, "quota"));
        assert!(!quota.is_transient());
    }

    #[test]
    fn test_invalid_argument_is_permanent() {
        let err = classify_error(OpenAIError::InvalidArgument("model missing".into()));
        assert!(!err.is_transient());
    }
}
