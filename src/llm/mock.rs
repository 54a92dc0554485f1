//! 脚本化 LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 按顺序返回预设回复（或预设错误），并记录每次请求的 system 与消息，便于断言反馈内容。
//! 脚本用尽后返回 InvalidResponse。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Completion, LlmClient, LlmError, TokenUsage};
use crate::memory::Message;

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
}

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    model: String,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|s| Ok(s.into())))
    }

    pub fn with_results(results: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            model: "scripted".to_string(),
            replies: Mutex::new(results.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// 第 n 次请求中最后一条 user 消息（即当轮 prompt）
    pub fn prompt_at(&self, n: usize) -> Option<String> {
        self.requests().get(n).and_then(|r| {
            r.messages
                .iter()
                .rev()
                .find(|m| m.role == crate::memory::Role::User)
                .map(|m| m.content.clone())
        })
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> Result<Completion, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(RecordedRequest {
                system: system.to_string(),
                messages: messages.to_vec(),
            });
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| LlmError::InvalidResponse("script lock poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))?;
        let content = next?;
        let prompt_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        Ok(Completion {
            usage: TokenUsage::new((prompt_chars / 4) as u64, (content.len() / 4) as u64),
            content,
        })
    }
}
