//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Scripted）、退避重试、用量记账

pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod traits;
pub mod usage;

pub use mock::{RecordedRequest, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use provider::create_client;
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{Completion, LlmClient, LlmError};
pub use usage::{TokenUsage, UsageLedger};
