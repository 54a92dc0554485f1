//! 反思循环：单个产物的一次 attempt
//!
//! 每轮：构造 prompt（首轮用任务模板，之后用带上一轮反馈的反思模板）→ 带完整历史调用 LLM →
//! 解析动作 → 分派（检索工具 / 终结 / 未知）→ 得到下一轮反馈。
//! - 解析失败每个 attempt 只纠正一次，第二次直接结束为 Exhausted；
//! - 终结动作的产物通过校验后立即结束，剩余轮次不再执行；
//! - 工具失败、参数损坏、缺少 payload、校验失败都只变成反馈，不中止循环；
//! - 只有 LLM 传输错误（重试耗尽后）以 AgentError 返回，由调用方在 attempt 边界处理。

use serde_json::Value;

use crate::core::{AgentError, LoopSignal, RecoveryAction, RecoveryContext, RecoveryEngine};
use crate::llm::{LlmClient, UsageLedger};
use crate::memory::{Message, MessageHistory};
use crate::react::arguments::decode;
use crate::react::prompts::{final_round_prompt, reflection_prompt, TaskPrompts};
use crate::react::{Action, ArtifactKind, ResponseParser};
use crate::tools::ToolExecutor;
use crate::validation::SchemaValidator;

/// 轮次预算与最后一轮策略
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub num_reflections: usize,
    /// 最后一轮使用强制终结模板，且不执行检索
    pub force_final_round: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            num_reflections: 5,
            force_final_round: false,
        }
    }
}

/// Exhausted 的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// 轮次用完仍未终结
    RoundBudget,
    /// 连续第二次无法解析动作
    ParseFailures,
}

/// attempt 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 通过校验的产物，round 从 1 计
    Finalized { artifact: Value, round: usize },
    Exhausted { reason: ExhaustReason },
}

/// 单轮记录：解析出的动作与交给下一轮的反馈（None 表示沿用上一轮反馈）
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub round: usize,
    pub action: Option<String>,
    pub feedback: Option<String>,
}

/// 一次 attempt 的完整报告
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub outcome: AttemptOutcome,
    pub rounds: Vec<RoundRecord>,
    /// 成功的工具调用结果，按时间顺序
    pub tool_results: Vec<String>,
    pub history: MessageHistory,
    pub usage: UsageLedger,
}

impl AttemptReport {
    pub fn artifact(&self) -> Option<&Value> {
        match &self.outcome {
            AttemptOutcome::Finalized { artifact, .. } => Some(artifact),
            AttemptOutcome::Exhausted { .. } => None,
        }
    }

    pub fn rounds_used(&self) -> usize {
        self.rounds.len()
    }
}

/// 反思循环
pub struct ReflectionLoop<'a> {
    llm: &'a dyn LlmClient,
    executor: &'a ToolExecutor,
    parser: &'a ResponseParser,
    validator: Option<&'a SchemaValidator>,
    recovery: RecoveryEngine,
    kind: ArtifactKind,
    settings: LoopSettings,
}

impl<'a> ReflectionLoop<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        executor: &'a ToolExecutor,
        parser: &'a ResponseParser,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            llm,
            executor,
            parser,
            validator: None,
            recovery: RecoveryEngine::new(),
            kind,
            settings: LoopSettings::default(),
        }
    }

    /// 启用 schema 校验
    pub fn with_validator(mut self, validator: &'a SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// 运行一次 attempt
    pub async fn run(&self, prompts: &TaskPrompts) -> Result<AttemptReport, AgentError> {
        let total = self.settings.num_reflections.max(1);
        let finalize_action = self.kind.finalize_action();

        let mut history = MessageHistory::new();
        let mut usage = UsageLedger::new();
        let mut rounds = Vec::new();
        let mut tool_results = Vec::new();
        let mut feedback = String::new();
        let mut parse_retried = false;
        let mut outcome = AttemptOutcome::Exhausted {
            reason: ExhaustReason::RoundBudget,
        };

        for round in 0..total {
            let forced = self.settings.force_final_round && round > 0 && round + 1 == total;
            let prompt = if round == 0 {
                prompts.initial.clone()
            } else if forced {
                final_round_prompt(self.kind, round + 1, total, &feedback)
            } else {
                reflection_prompt(self.kind, round + 1, total, &feedback)
            };

            history.push(Message::user(prompt));
            let completion = self.llm.complete(&prompts.system, history.messages()).await?;
            usage.record(self.llm.model(), completion.usage);
            history.push(Message::assistant(completion.content.clone()));

            let ctx = RecoveryContext {
                finalize_action,
                parse_retried,
            };

            let parsed = match self.parser.parse(&completion.content) {
                Ok(parsed) => parsed,
                Err(signal) => {
                    tracing::warn!(round = round + 1, kind = %self.kind, error = %signal, "Failed to parse LLM response");
                    match self.recovery.handle(&signal, ctx) {
                        RecoveryAction::RetryWithPrompt(text) => {
                            parse_retried = true;
                            feedback = text.clone();
                            rounds.push(RoundRecord {
                                round: round + 1,
                                action: None,
                                feedback: Some(text),
                            });
                            continue;
                        }
                        RecoveryAction::Abandon => {
                            rounds.push(RoundRecord {
                                round: round + 1,
                                action: None,
                                feedback: None,
                            });
                            outcome = AttemptOutcome::Exhausted {
                                reason: ExhaustReason::ParseFailures,
                            };
                            break;
                        }
                    }
                }
            };

            tracing::info!(round = round + 1, total, kind = %self.kind, action = %parsed.name, "reflection round");
            let action = Action::resolve(&parsed.name, self.kind, self.executor.registry());

            let next_feedback = match action {
                Action::Search(tool) if forced => Some(format!(
                    "{} is not available in the final round. You must call {} now.",
                    tool, finalize_action
                )),
                Action::Search(tool) => {
                    let result = match decode(&parsed.raw_arguments) {
                        Ok(args) => self.executor.execute(&tool, args).await,
                        Err(signal) => Err(signal),
                    };
                    Some(match result {
                        Ok(text) => {
                            tool_results.push(text.clone());
                            text
                        }
                        Err(signal) => self.feedback_for(&signal, ctx),
                    })
                }
                Action::Finalize(kind) => match self.finalize(kind, &parsed.raw_arguments) {
                    Ok(artifact) => {
                        rounds.push(RoundRecord {
                            round: round + 1,
                            action: Some(parsed.name),
                            feedback: None,
                        });
                        tracing::info!(round = round + 1, kind = %kind, "artifact finalized");
                        outcome = AttemptOutcome::Finalized {
                            artifact,
                            round: round + 1,
                        };
                        break;
                    }
                    Err(signal) => {
                        tracing::warn!(round = round + 1, kind = %kind, error = %signal, "finalize rejected");
                        Some(self.feedback_for(&signal, ctx))
                    }
                },
                Action::Unknown(ref name) => {
                    tracing::warn!(
                        action = %name,
                        available = ?self.executor.registry().names(),
                        finalize = finalize_action,
                        "Unknown action"
                    );
                    None
                }
            };

            if let Some(text) = &next_feedback {
                feedback = text.clone();
            }
            rounds.push(RoundRecord {
                round: round + 1,
                action: Some(parsed.name),
                feedback: next_feedback,
            });
        }

        if let AttemptOutcome::Exhausted { reason } = &outcome {
            tracing::warn!(kind = %self.kind, rounds = rounds.len(), reason = ?reason, "attempt not finalized");
        }

        Ok(AttemptReport {
            outcome,
            rounds,
            tool_results,
            history,
            usage,
        })
    }

    /// 解码终结参数、取出 payload 并校验
    fn finalize(&self, kind: ArtifactKind, raw_arguments: &str) -> Result<Value, LoopSignal> {
        let arguments = decode(raw_arguments)?;
        let key = kind.payload_key();
        let payload = arguments
            .get(key)
            .filter(|v| !is_empty_payload(v))
            .cloned()
            .ok_or_else(|| LoopSignal::MissingPayload {
                action: kind.finalize_action().to_string(),
                key: key.to_string(),
            })?;

        if let Some(validator) = self.validator {
            validator
                .validate(kind, &payload)
                .map_err(|errors| LoopSignal::ValidationFailed { errors })?;
        }
        Ok(payload)
    }

    fn feedback_for(&self, signal: &LoopSignal, ctx: RecoveryContext<'_>) -> String {
        match self.recovery.handle(signal, ctx) {
            RecoveryAction::RetryWithPrompt(text) => text,
            RecoveryAction::Abandon => signal.to_string(),
        }
    }
}

fn is_empty_payload(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
