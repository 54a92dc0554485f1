//! 假设扩展：从研究主题或已有创意生成若干可独立研究的子假设

use serde_json::{json, Value};

use crate::core::AgentError;
use crate::llm::{LlmClient, UsageLedger};
use crate::memory::Message;
use crate::react::arguments::{extract_first_json_array, strip_json_fence};
use crate::react::prompts::{expansion_from_idea, expansion_from_topic};

const MIN_SUB: usize = 5;
const MAX_SUB: usize = 20;

/// 扩展的出发点
#[derive(Debug, Clone, Copy)]
pub enum ExpansionSource<'a> {
    Topic(&'a str),
    /// 至少含 Title 与 Short Hypothesis 的创意对象
    Idea(&'a Value),
}

/// 生成子假设，返回 `{"Name", "Short Hypothesis"}` 列表
pub async fn expand_hypotheses(
    llm: &dyn LlmClient,
    source: ExpansionSource<'_>,
    max_sub: usize,
    usage: &mut UsageLedger,
) -> Result<Vec<Value>, AgentError> {
    let max_sub = max_sub.clamp(MIN_SUB, MAX_SUB);
    let (system, prompt) = match source {
        ExpansionSource::Topic(topic) => expansion_from_topic(topic, max_sub),
        ExpansionSource::Idea(idea) => {
            let field = |k: &str| idea.get(k).and_then(Value::as_str).unwrap_or("");
            expansion_from_idea(field("Title"), field("Short Hypothesis"), max_sub)
        }
    };

    let completion = llm.complete(&system, &[Message::user(prompt)]).await?;
    usage.record(llm.model(), completion.usage);
    let items = parse_expansion(&completion.content);
    tracing::info!(count = items.len(), "Expanded hypotheses");
    Ok(items)
}

fn text_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

/// 取回复中的第一个 JSON 数组，保留同时有名字与假设的条目
pub fn parse_expansion(reply: &str) -> Vec<Value> {
    let text = strip_json_fence(reply.trim());
    let Some(array) = extract_first_json_array(text) else {
        tracing::warn!("No JSON array found in expansion response");
        return Vec::new();
    };
    let items: Vec<Value> = match serde_json::from_str(array) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse expansion JSON");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let name = text_field(item, &["Name", "name"])?;
            let hypothesis = text_field(item, &["Short Hypothesis", "short_hypothesis", "hypothesis"])?;
            Some(json!({"Name": name, "Short Hypothesis": hypothesis}))
        })
        .collect()
}
