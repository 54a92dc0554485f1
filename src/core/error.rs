//! 错误类型与恢复动作
//!
//! 两个互不相交的错误族：
//! - `LoopSignal`：可恢复信号（解析失败、参数损坏、校验失败、工具失败），只在反思循环内部消化，转成下一轮反馈；
//! - `AgentError`：致命错误（LLM 传输重试耗尽、I/O、配置），只在单次 attempt 边界被捕获。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// 反思循环内的可恢复信号，永远不会向上传播
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopSignal {
    #[error("Could not find ACTION in response ({len} chars)")]
    NoActionFound { len: usize, preview: String },

    #[error("Malformed arguments: {reason}")]
    MalformedArguments { raw: String, reason: String },

    #[error("Missing '{key}' key in {action} arguments")]
    MissingPayload { action: String, key: String },

    #[error("Validation failed with {} error(s)", errors.len())]
    ValidationFailed { errors: Vec<String> },

    #[error("Error using tool {tool}: {reason}")]
    ToolFailed { tool: String, reason: String },
}

/// 致命错误：中止当前 attempt（由编排器捕获），或中止单个流水线阶段
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing input file: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Phase {phase} produced no artifact: {reason}")]
    PhaseIncomplete { phase: String, reason: String },
}

/// 恢复引擎根据信号给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 将纠正提示注入下一轮反馈，让模型重试
    RetryWithPrompt(String),
    /// 放弃当前 attempt（记为 Exhausted）
    Abandon,
}
