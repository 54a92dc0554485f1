//! 四个阶段的实现
//!
//! - 文献综述 / 研究方向：反思循环，最后一轮强制终结；耗尽时按配置生成降级产物，否则阶段失败；
//! - 缺口与假设 / 实验计划：单次调用，从回复中取 JSON 对象。

use serde_json::Value;

use crate::core::AgentError;
use crate::llm::UsageLedger;
use crate::memory::Message;
use crate::react::prompts::{
    direction_task, experiment_plan_prompt, hypotheses_prompt, literature_review_task, TaskPrompts,
};
use crate::react::{
    decode, ArtifactKind, AttemptOutcome, AttemptReport, DegradedArtifactBuilder, DirectionFromHypothesis,
    LoopSettings, ReflectionLoop, ReviewFromSearchResults,
};

use super::ResearchPipeline;

const MIN_HYPOTHESES: usize = 5;
const MAX_HYPOTHESES: usize = 20;
/// 综述没有 synthesis 时，方向阶段改用前几条条目
const SYNTHESIS_FALLBACK_ENTRIES: usize = 3;

/// 单个阶段的产物
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    pub artifact: Value,
    /// 由降级策略生成、未经校验
    pub degraded: bool,
    pub usage: UsageLedger,
}

impl ResearchPipeline {
    async fn run_loop(
        &self,
        kind: ArtifactKind,
        prompts: &TaskPrompts,
        num_reflections: usize,
    ) -> Result<AttemptReport, AgentError> {
        let settings = LoopSettings {
            num_reflections,
            force_final_round: self.settings.force_final_round,
        };
        let mut reflection =
            ReflectionLoop::new(self.llm.as_ref(), &self.executor, &self.parser, kind).with_settings(settings);
        if let Some(validator) = &self.validator {
            reflection = reflection.with_validator(validator);
        }
        reflection.run(prompts).await
    }

    fn finish_loop(
        &self,
        kind: ArtifactKind,
        report: AttemptReport,
        fallback: &dyn DegradedArtifactBuilder,
    ) -> Result<PhaseOutput, AgentError> {
        let artifact = match &report.outcome {
            AttemptOutcome::Finalized { artifact, .. } => {
                return Ok(PhaseOutput {
                    artifact: artifact.clone(),
                    degraded: false,
                    usage: report.usage,
                })
            }
            AttemptOutcome::Exhausted { reason } if self.settings.degraded_fallback => {
                tracing::warn!(phase = %kind, reason = ?reason, "Phase not finalized, building degraded artifact");
                fallback.build(&report)
            }
            AttemptOutcome::Exhausted { reason } => {
                return Err(AgentError::PhaseIncomplete {
                    phase: kind.to_string(),
                    reason: format!("not finalized within {} rounds ({:?})", report.rounds_used(), reason),
                })
            }
        };
        Ok(PhaseOutput {
            artifact,
            degraded: true,
            usage: report.usage,
        })
    }

    /// 单次调用：返回回复中的 JSON 对象
    async fn single_call(&self, system: &str, prompt: String, usage: &mut UsageLedger) -> Result<Option<Value>, AgentError> {
        let completion = self.llm.complete(system, &[Message::user(prompt)]).await?;
        usage.record(self.llm.model(), completion.usage);
        Ok(match decode(&completion.content) {
            Ok(v @ Value::Object(_)) => Some(v),
            _ => None,
        })
    }

    /// 阶段 1：文献综述
    pub async fn literature_review(&self, topic: &str) -> Result<PhaseOutput, AgentError> {
        tracing::info!("Phase 1: Literature review");
        let prompts = literature_review_task(self.executor.registry(), topic);
        let report = self
            .run_loop(ArtifactKind::LiteratureReview, &prompts, self.settings.literature_reflections)
            .await?;
        self.finish_loop(ArtifactKind::LiteratureReview, report, &ReviewFromSearchResults::new(topic))
    }

    /// 阶段 2：缺口与假设
    pub async fn hypotheses(&self, lit_review: &Value) -> Result<PhaseOutput, AgentError> {
        tracing::info!("Phase 2: Gaps and hypotheses");
        let max = self.settings.max_hypotheses.clamp(MIN_HYPOTHESES, MAX_HYPOTHESES);
        let (system, prompt) = hypotheses_prompt(&serde_json::to_string_pretty(lit_review)?, max);
        let mut usage = UsageLedger::new();

        let data = self
            .single_call(&system, prompt, &mut usage)
            .await?
            .filter(|d| d.get("gaps").is_some() && d.get("hypotheses").is_some())
            .ok_or_else(|| AgentError::PhaseIncomplete {
                phase: ArtifactKind::Hypotheses.to_string(),
                reason: "LLM did not return valid JSON with 'gaps' and 'hypotheses'".to_string(),
            })?;

        if let Some(validator) = &self.validator {
            if let Err(errors) = validator.validate(ArtifactKind::Hypotheses, &data) {
                tracing::warn!(errors = ?errors, "Hypotheses validation failed");
            }
        }
        Ok(PhaseOutput {
            artifact: data,
            degraded: false,
            usage,
        })
    }

    /// 阶段 3：选定研究方向；preferred 为偏好的假设 name
    pub async fn direction(
        &self,
        lit_review: &Value,
        hypotheses: &Value,
        preferred: Option<&str>,
    ) -> Result<PhaseOutput, AgentError> {
        tracing::info!("Phase 3: Direction");
        let synthesis = synthesis_of(lit_review);
        let hypotheses_list = hypotheses_list(hypotheses, preferred);

        let prompts = direction_task(self.executor.registry(), &synthesis, &hypotheses_list);
        let report = self
            .run_loop(ArtifactKind::Direction, &prompts, self.settings.direction_reflections)
            .await?;
        let fallback = DirectionFromHypothesis::new(hypotheses.clone(), synthesis);
        self.finish_loop(ArtifactKind::Direction, report, &fallback)
    }

    /// 阶段 4：实验计划；校验失败只记日志
    pub async fn experiment_plan(&self, direction: &Value) -> Result<PhaseOutput, AgentError> {
        tracing::info!("Phase 4: Experiment plan");
        let (system, prompt) = experiment_plan_prompt(&serde_json::to_string_pretty(direction)?);
        let mut usage = UsageLedger::new();

        let data = self
            .single_call(&system, prompt, &mut usage)
            .await?
            .ok_or_else(|| AgentError::PhaseIncomplete {
                phase: ArtifactKind::ExperimentPlan.to_string(),
                reason: "LLM did not return valid JSON".to_string(),
            })?;

        if let Some(validator) = &self.validator {
            if let Err(errors) = validator.validate(ArtifactKind::ExperimentPlan, &data) {
                tracing::warn!(count = errors.len(), "Experiment plan validation failed");
                for e in &errors {
                    tracing::warn!("  {}", e);
                }
            }
        }
        Ok(PhaseOutput {
            artifact: data,
            degraded: false,
            usage,
        })
    }
}

fn synthesis_of(lit_review: &Value) -> String {
    match lit_review.get("synthesis").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            let entries: Vec<Value> = lit_review
                .get("entries")
                .and_then(Value::as_array)
                .map(|e| e.iter().take(SYNTHESIS_FALLBACK_ENTRIES).cloned().collect())
                .unwrap_or_default();
            Value::Array(entries).to_string()
        }
    }
}

fn hypotheses_list(hypotheses: &Value, preferred: Option<&str>) -> String {
    let mut list = hypotheses
        .get("hypotheses")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|h| {
                    format!(
                        "- {}: {}",
                        h.get("name").and_then(Value::as_str).unwrap_or("?"),
                        h.get("short_hypothesis").and_then(Value::as_str).unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    if let Some(id) = preferred {
        list.push_str(&format!("\n(Preferred: {id})"));
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_synthesis_falls_back_to_entries() {
        assert_eq!(synthesis_of(&json!({"synthesis": "gaps remain"})), "gaps remain");
        let review = json!({"synthesis": "", "entries": [{"a": 1}, {"a": 2}, {"a": 3}, {"a": 4}]});
        assert_eq!(synthesis_of(&review), "[{\"a\":1},{\"a\":2},{\"a\":3}]");
    }

    #[test]
    fn test_hypotheses_list_with_preference() {
        let hyps = json!({"hypotheses": [
            {"name": "h1", "short_hypothesis": "first"},
            {"short_hypothesis": "nameless"}
        ]});
        assert_eq!(hypotheses_list(&hyps, Some("h1")), "- h1: first\n- ?: nameless\n(Preferred: h1)");
    }
}
