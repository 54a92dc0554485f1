//! 核心编排层：错误与恢复、新颖性评分、多 attempt 生成编排

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scoring;

pub use error::{AgentError, LoopSignal, RecoveryAction};
pub use orchestrator::{GenerationOrchestrator, GenerationReport, OrchestratorSettings};
pub use recovery::{RecoveryContext, RecoveryEngine};
pub use scoring::{annotate, ArtifactScorer, LlmNoveltyScorer};
