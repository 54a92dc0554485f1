//! 四阶段研究流水线：文献综述 → 缺口与假设 → 研究方向 → 实验计划
//!
//! 每个阶段读上一阶段的 JSON 产物、写自己的产物文件（`<out>/<stem>.<suffix>.json`），
//! 因此既可以整体运行，也可以从任一阶段的输入文件单独运行。

pub mod expansion;
pub mod phases;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::config::PipelineSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, UsageLedger};
use crate::memory::write_json_atomic;
use crate::react::{ArtifactKind, ResponseParser};
use crate::tools::ToolExecutor;
use crate::validation::SchemaValidator;

pub use expansion::{expand_hypotheses, parse_expansion, ExpansionSource};
pub use phases::PhaseOutput;

/// 流水线参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub literature_reflections: usize,
    pub direction_reflections: usize,
    pub max_hypotheses: usize,
    pub force_final_round: bool,
    pub degraded_fallback: bool,
}

impl From<&PipelineSection> for PipelineSettings {
    fn from(section: &PipelineSection) -> Self {
        Self {
            literature_reflections: section.literature_reflections,
            direction_reflections: section.direction_reflections,
            max_hypotheses: section.max_hypotheses,
            force_final_round: section.force_final_round,
            degraded_fallback: section.degraded_fallback,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineSection::default())
    }
}

/// 整体运行写出的四个文件
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePaths {
    pub literature_review: PathBuf,
    pub hypotheses: PathBuf,
    pub direction: PathBuf,
    pub experiment_plan: PathBuf,
}

/// `<out_dir>/<stem>.<suffix>.json`
pub fn artifact_path(out_dir: &Path, stem: &str, kind: ArtifactKind) -> PathBuf {
    out_dir.join(format!("{}.{}.json", stem, kind.file_suffix()))
}

/// 从产物文件名还原主题 stem（`topic.lit_review.json` → `topic`）
pub fn stem_of(path: &Path, kind: ArtifactKind) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!(".{}", kind.file_suffix());
    stem.strip_suffix(&suffix).map(str::to_string).unwrap_or(stem)
}

/// 读取输入 JSON；文件不存在时返回 MissingInput
pub fn read_json(path: &Path) -> Result<Value, AgentError> {
    if !path.exists() {
        return Err(AgentError::MissingInput(path.to_path_buf()));
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// 读取文本输入（主题文件）
pub fn read_text(path: &Path) -> Result<String, AgentError> {
    if !path.exists() {
        return Err(AgentError::MissingInput(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

/// 流水线运行时：共享的 LLM、工具、解析器与校验器
pub struct ResearchPipeline {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    parser: ResponseParser,
    validator: Option<SchemaValidator>,
    settings: PipelineSettings,
}

impl ResearchPipeline {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, settings: PipelineSettings) -> Self {
        let parser = ResponseParser::for_registry(executor.registry());
        Self {
            llm,
            executor,
            parser,
            validator: None,
            settings,
        }
    }

    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 依次运行四个阶段；任一阶段失败即中止，已写出的文件保留
    pub async fn run_full(&self, topic: &str, stem: &str, out_dir: &Path) -> Result<PipelinePaths, AgentError> {
        fs::create_dir_all(out_dir)?;
        let paths = PipelinePaths {
            literature_review: artifact_path(out_dir, stem, ArtifactKind::LiteratureReview),
            hypotheses: artifact_path(out_dir, stem, ArtifactKind::Hypotheses),
            direction: artifact_path(out_dir, stem, ArtifactKind::Direction),
            experiment_plan: artifact_path(out_dir, stem, ArtifactKind::ExperimentPlan),
        };
        let mut usage = UsageLedger::new();

        let review = self.literature_review(topic).await?;
        write_phase(&paths.literature_review, &review, &mut usage)?;

        let hypotheses = self.hypotheses(&review.artifact).await?;
        write_phase(&paths.hypotheses, &hypotheses, &mut usage)?;

        let direction = self.direction(&review.artifact, &hypotheses.artifact, None).await?;
        write_phase(&paths.direction, &direction, &mut usage)?;

        let plan = self.experiment_plan(&direction.artifact).await?;
        write_phase(&paths.experiment_plan, &plan, &mut usage)?;

        usage.log_summary();
        Ok(paths)
    }
}

/// 写出阶段产物并合并用量
pub fn write_phase(path: &Path, output: &PhaseOutput, usage: &mut UsageLedger) -> Result<(), AgentError> {
    write_json_atomic(path, &output.artifact)?;
    usage.merge(&output.usage);
    tracing::info!(path = %path.display(), degraded = output.degraded, "Phase complete");
    Ok(())
}
