//! Token 用量与费用估算
//!
//! 每次 LLM 调用返回本次的 TokenUsage；调用方按模型累加到 UsageLedger，运行结束时由编排器合并并输出汇总。
//! 不使用进程级全局计数器。

use std::collections::BTreeMap;

use serde::Serialize;

/// 单次（或累计）token 计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cached_tokens: 0,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cached_tokens += other.cached_tokens;
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// 每 token 美元价格：(prompt, cached, completion)
const MODEL_PRICES: &[(&str, f64, f64, f64)] = &[
    ("gpt-4o-2024-11-20", 2.5e-6, 1.25e-6, 10e-6),
    ("gpt-4o-2024-08-06", 2.5e-6, 1.25e-6, 10e-6),
    ("gpt-4o-2024-05-13", 5.0e-6, 5.0e-6, 15e-6),
    ("gpt-4o-mini-2024-07-18", 0.15e-6, 0.075e-6, 0.6e-6),
    ("o1-2024-12-17", 15e-6, 7.5e-6, 60e-6),
    ("o3-mini-2025-01-31", 1.1e-6, 0.55e-6, 4.4e-6),
    ("deepseek-chat", 0.27e-6, 0.07e-6, 1.1e-6),
    ("deepseek-reasoner", 0.55e-6, 0.14e-6, 2.19e-6),
];

/// 按模型累计的用量账本
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageLedger {
    by_model: BTreeMap<String, TokenUsage>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, model: &str, usage: TokenUsage) {
        self.by_model.entry(model.to_string()).or_default().add(usage);
    }

    /// 合并另一个账本（attempt / 阶段结束时由上层调用）
    pub fn merge(&mut self, other: &UsageLedger) {
        for (model, usage) in &other.by_model {
            self.record(model, *usage);
        }
    }

    pub fn get(&self, model: &str) -> TokenUsage {
        self.by_model.get(model).copied().unwrap_or_default()
    }

    /// 估算费用（美元）；价格表中没有的模型计 0
    pub fn cost(&self, model: &str) -> f64 {
        let Some(&(_, prompt, cached, completion)) =
            MODEL_PRICES.iter().find(|(name, ..)| *name == model)
        else {
            return 0.0;
        };
        let t = self.get(model);
        let uncached = t.prompt_tokens.saturating_sub(t.cached_tokens);
        uncached as f64 * prompt + t.cached_tokens as f64 * cached + t.completion_tokens as f64 * completion
    }

    pub fn total_cost(&self) -> f64 {
        self.by_model.keys().map(|m| self.cost(m)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }

    pub fn log_summary(&self) {
        for (model, t) in &self.by_model {
            tracing::info!(
                model = %model,
                prompt = t.prompt_tokens,
                completion = t.completion_tokens,
                cached = t.cached_tokens,
                cost_usd = format!("{:.4}", self.cost(model)),
                "token usage"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_merge_sums_per_model() {
        let mut a = UsageLedger::new();
        a.record("gpt-4o-2024-05-13", TokenUsage::new(100, 20));
        let mut b = UsageLedger::new();
        b.record("gpt-4o-2024-05-13", TokenUsage::new(50, 10));
        b.record("other", TokenUsage::new(1, 1));

        a.merge(&b);
        assert_eq!(a.get("gpt-4o-2024-05-13"), TokenUsage::new(150, 30));
        assert_eq!(a.get("other").total(), 2);
    }

    #[test]
    fn test_cost_known_and_unknown_model() {
        let mut ledger = UsageLedger::new();
        ledger.record("gpt-4o-2024-05-13", TokenUsage::new(1_000_000, 1_000_000));
        ledger.record("my-local-model", TokenUsage::new(10, 10));
        assert!((ledger.cost("gpt-4o-2024-05-13") - 20.0).abs() < 1e-9);
        assert_eq!(ledger.cost("my-local-model"), 0.0);
    }
}
