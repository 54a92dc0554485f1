//! Ideaforge - Rust 科研创意生成器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、新颖性评分、多 attempt 生成编排
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Scripted）、退避重试、用量记账
//! - **memory**: 对话历史、断点与产物文件的原子写入
//! - **pipeline**: 四阶段研究流水线与假设扩展
//! - **react**: 动作解析、参数解码、提示模板、反思循环
//! - **tools**: 文献检索工具、注册表与执行器
//! - **validation**: 产物 JSON schema 校验

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod react;
pub mod tools;
pub mod validation;

pub use crate::core::{AgentError, GenerationOrchestrator, GenerationReport, OrchestratorSettings};
pub use crate::pipeline::{PipelineSettings, ResearchPipeline};
pub use crate::react::{ArtifactKind, ReflectionLoop, ResponseParser};
