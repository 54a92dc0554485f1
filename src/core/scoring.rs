//! 新颖性评分：对已定稿的创意打一个 [0, 1] 的分数，写入 `novelty_score`
//!
//! 评分失败（LLM 错误、回复无法解析）不影响归档，分数记为 0.5。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, UsageLedger};
use crate::memory::Message;
use crate::react::decode;
use crate::react::prompts::novelty_prompt;

pub const DEFAULT_NOVELTY: f64 = 0.5;
pub const NOVELTY_FIELD: &str = "novelty_score";

/// 产物评分器
#[async_trait]
pub trait ArtifactScorer: Send + Sync {
    /// 返回 [0, 1] 内的分数；本次调用的 token 用量记入 ledger
    async fn score(&self, artifact: &Value, ledger: &mut UsageLedger) -> f64;
}

/// 用（可单独配置的）LLM 给创意的新颖性打分
pub struct LlmNoveltyScorer {
    llm: Arc<dyn LlmClient>,
}

impl LlmNoveltyScorer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// 从回复中取 score 并裁剪到 [0, 1]
pub fn parse_score(reply: &str) -> Option<f64> {
    let data = decode(reply).ok()?;
    let score = match data.get("score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if score.is_nan() {
        return None;
    }
    if let Some(reasoning) = data.get("reasoning").and_then(Value::as_str) {
        tracing::info!(score, reasoning = %reasoning.chars().take(120).collect::<String>(), "Novelty score");
    }
    Some(score.clamp(0.0, 1.0))
}

#[async_trait]
impl ArtifactScorer for LlmNoveltyScorer {
    async fn score(&self, artifact: &Value, ledger: &mut UsageLedger) -> f64 {
        let (system, prompt) = novelty_prompt(artifact);
        let completion = match self.llm.complete(&system, &[Message::user(prompt)]).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Novelty scoring failed");
                return DEFAULT_NOVELTY;
            }
        };
        ledger.record(self.llm.model(), completion.usage);
        parse_score(&completion.content).unwrap_or_else(|| {
            tracing::warn!("Could not parse novelty response, defaulting to {}", DEFAULT_NOVELTY);
            DEFAULT_NOVELTY
        })
    }
}

/// 评分并写回产物
pub async fn annotate(scorer: &dyn ArtifactScorer, artifact: &mut Value, ledger: &mut UsageLedger) {
    let score = scorer.score(artifact, ledger).await;
    if let Value::Object(map) = artifact {
        map.insert(NOVELTY_FIELD.to_string(), Value::from(score));
    }
}
