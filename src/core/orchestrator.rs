//! 生成编排器：多次独立的创意 attempt
//!
//! 负责：恢复归档（断点优先，否则读已有输出文件）、按序号逐个运行反思循环、可选的新颖性评分、
//! 定期写断点，以及结束时原子写出完整归档并删除断点。
//! 单个 attempt 内的致命错误（LLM 重试耗尽等）只中止该 attempt，整个运行继续。

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::config::GenerationSection;
use crate::core::scoring::{annotate, ArtifactScorer};
use crate::core::AgentError;
use crate::llm::{LlmClient, UsageLedger};
use crate::memory::{write_json_atomic, CheckpointRecord, CheckpointStore};
use crate::react::prompts::idea_task;
use crate::react::{ArtifactKind, AttemptOutcome, LoopSettings, ReflectionLoop, ResponseParser};
use crate::tools::ToolExecutor;
use crate::validation::SchemaValidator;

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_generations: usize,
    pub checkpoint_interval: usize,
    pub resume: bool,
    pub loop_settings: LoopSettings,
    pub system_prompt_override: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&GenerationSection::default())
    }
}

impl From<&GenerationSection> for OrchestratorSettings {
    fn from(section: &GenerationSection) -> Self {
        Self {
            max_generations: section.max_generations,
            checkpoint_interval: section.checkpoint_interval,
            resume: section.resume,
            loop_settings: LoopSettings {
                num_reflections: section.num_reflections,
                force_final_round: false,
            },
            system_prompt_override: section.system_prompt_override.clone(),
        }
    }
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub archive: Vec<Value>,
    /// 本次运行实际执行的 attempt 数
    pub attempts: usize,
    pub finalized: usize,
    pub exhausted: usize,
    pub aborted: usize,
    pub usage: UsageLedger,
}

pub struct GenerationOrchestrator {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    parser: ResponseParser,
    validator: Option<SchemaValidator>,
    scorer: Option<Box<dyn ArtifactScorer>>,
    settings: OrchestratorSettings,
}

impl GenerationOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, settings: OrchestratorSettings) -> Self {
        let parser = ResponseParser::for_registry(executor.registry());
        Self {
            llm,
            executor,
            parser,
            validator: None,
            scorer: None,
            settings,
        }
    }

    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn ArtifactScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// 恢复起始状态：(归档, 起始序号)
    fn initial_state(&self, output: &Path, store: &CheckpointStore) -> Result<(Vec<Value>, usize), AgentError> {
        if self.settings.resume {
            if let Some(record) = store.load() {
                tracing::info!(
                    archived = record.archive.len(),
                    next_attempt = record.next_attempt_index,
                    "Resumed from checkpoint"
                );
                return Ok((record.archive, record.next_attempt_index));
            }
            return Ok((Vec::new(), 0));
        }

        if output.exists() {
            let existing: Vec<Value> = serde_json::from_str(&fs::read_to_string(output)?)?;
            tracing::info!(count = existing.len(), path = %output.display(), "Loaded existing ideas");
            return Ok((existing, 0));
        }
        Ok((Vec::new(), 0))
    }

    /// 运行全部 attempt，写出 output 并返回汇总
    pub async fn run(&self, topic: &str, output: &Path) -> Result<GenerationReport, AgentError> {
        let store = CheckpointStore::for_output(output);
        let (archive, start) = self.initial_state(output, &store)?;
        let interval = self.settings.checkpoint_interval.max(1);
        let max = self.settings.max_generations;

        let mut report = GenerationReport {
            archive,
            ..Default::default()
        };

        for idx in start..max {
            tracing::info!("=== Generating idea {} / {} ===", idx + 1, max);
            report.attempts += 1;

            let prompts = idea_task(
                self.executor.registry(),
                topic,
                &report.archive,
                self.settings.system_prompt_override.as_deref(),
            );
            let mut reflection = ReflectionLoop::new(self.llm.as_ref(), &self.executor, &self.parser, ArtifactKind::Idea)
                .with_settings(self.settings.loop_settings);
            if let Some(validator) = &self.validator {
                reflection = reflection.with_validator(validator);
            }

            match reflection.run(&prompts).await {
                Ok(attempt) => {
                    report.usage.merge(&attempt.usage);
                    match attempt.outcome {
                        AttemptOutcome::Finalized { mut artifact, round } => {
                            if let Some(scorer) = &self.scorer {
                                annotate(scorer.as_ref(), &mut artifact, &mut report.usage).await;
                            }
                            let name = artifact
                                .get("Name")
                                .or_else(|| artifact.get("Title"))
                                .and_then(Value::as_str)
                                .unwrap_or("?")
                                .to_string();
                            tracing::info!(idea = %name, round, "Idea finalized");
                            report.archive.push(artifact);
                            report.finalized += 1;
                        }
                        AttemptOutcome::Exhausted { reason } => {
                            tracing::warn!(
                                attempt = idx + 1,
                                reason = ?reason,
                                "Idea was NOT finalized after {} reflection rounds",
                                self.settings.loop_settings.num_reflections
                            );
                            report.exhausted += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(attempt = idx + 1, error = %e, "Failed to generate idea");
                    report.aborted += 1;
                }
            }

            if (idx + 1) % interval == 0 {
                let record = CheckpointRecord {
                    archive: report.archive.clone(),
                    next_attempt_index: idx + 1,
                };
                if let Err(e) = store.save(&record) {
                    tracing::error!(error = %e, path = %store.path().display(), "Failed to write checkpoint");
                }
            }
        }

        write_json_atomic(output, &report.archive)?;
        tracing::info!(count = report.archive.len(), path = %output.display(), "Saved ideas");
        store.clear()?;

        tracing::info!(
            attempts = report.attempts,
            finalized = report.finalized,
            exhausted = report.exhausted,
            aborted = report.aborted,
            "generation finished"
        );
        report.usage.log_summary();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::ToolRegistry;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings(max: usize, resume: bool) -> OrchestratorSettings {
        OrchestratorSettings {
            max_generations: max,
            checkpoint_interval: 1,
            resume,
            loop_settings: LoopSettings {
                num_reflections: 2,
                force_final_round: false,
            },
            system_prompt_override: None,
        }
    }

    fn finalize(name: &str) -> String {
        format!("ACTION: FinalizeIdea\nARGUMENTS: {{\"idea\": {{\"Name\": \"{name}\"}}}}")
    }

    #[tokio::test]
    async fn test_existing_output_is_extended_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("ideas.json");
        fs::write(&output, "[{\"Name\": \"old\"}]").unwrap();

        let llm = Arc::new(ScriptedLlmClient::new([finalize("new")]));
        let orchestrator = GenerationOrchestrator::new(llm.clone(), ToolExecutor::new(ToolRegistry::new(), 5), settings(1, false));
        let report = orchestrator.run("topic", &output).await.unwrap();

        assert_eq!(report.archive, vec![json!({"Name": "old"}), json!({"Name": "new"})]);
        // 已有创意出现在首轮提示中
        assert!(llm.prompt_at(0).unwrap().contains("{\"Name\":\"old\"}"));
        assert!(!CheckpointStore::for_output(&output).path().exists());
    }

    #[tokio::test]
    async fn test_aborted_attempt_does_not_stop_run() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("ideas.json");
        let llm = Arc::new(ScriptedLlmClient::with_results([
            Err(crate::llm::LlmError::Api("invalid key".into())),
            Ok(finalize("second")),
        ]));
        let orchestrator = GenerationOrchestrator::new(llm, ToolExecutor::new(ToolRegistry::new(), 5), settings(2, false));
        let report = orchestrator.run("topic", &output).await.unwrap();

        assert_eq!(report.aborted, 1);
        assert_eq!(report.finalized, 1);
        let written: Vec<Value> = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, vec![json!({"Name": "second"})]);
    }
}
