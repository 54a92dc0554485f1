//! 降级产物：反思循环未能终结时，用已有的工具结果与对话历史拼出一个尽力而为的产物
//!
//! 降级产物一律带 `"degraded": true`，且不经过 schema 校验。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::react::arguments::decode;
use crate::react::loop_::AttemptReport;
use crate::react::parser::extract_arguments;
use crate::react::ArtifactKind;

/// 降级条目上限
const MAX_DEGRADED_ENTRIES: usize = 15;
const SUMMARY_CHARS: usize = 500;

/// 可替换的降级策略
pub trait DegradedArtifactBuilder: Send + Sync {
    fn build(&self, report: &AttemptReport) -> Value;
}

/// 在产物上打降级标记
pub fn tag_degraded(value: &mut Value) {
    if let Value::Object(map) = value {
        map.insert("degraded".to_string(), Value::Bool(true));
    }
}

/// 从最近的模型回复里找带 payload 键的参数对象（模型写出了产物但没能通过解析或校验时）
pub fn salvage_payload(report: &AttemptReport, kind: ArtifactKind) -> Option<Value> {
    let key = kind.payload_key();
    report
        .history
        .messages()
        .iter()
        .rev()
        .filter(|m| m.role == crate::memory::Role::Assistant)
        .filter_map(|m| decode(&extract_arguments(&m.content)).ok())
        .filter_map(|args| args.get(key).cloned())
        .find(|payload| matches!(payload, Value::Object(m) if !m.is_empty()))
}

fn paper_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+): (.+)$").expect("valid regex"))
}

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 解析一个编号论文块（`N: Title. Authors. Venue, Year.` 以及可选的 URL / Abstract 行）
fn parse_paper_block(block: &str) -> Option<Value> {
    let mut lines = block.lines();
    let header = paper_header().captures(lines.next()?.trim())?;
    let rest = header.get(2)?.as_str();

    let mut parts = rest.splitn(3, ". ");
    let title = parts.next()?.trim().trim_end_matches('.').to_string();
    if title.is_empty() {
        return None;
    }
    let author = parts.next().unwrap_or("Unknown").trim().to_string();
    let year = year_pattern()
        .find(rest)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(Value::from)
        .unwrap_or_else(|| json!("N/A"));

    let mut citation = Map::new();
    citation.insert("author".into(), json!(author));
    citation.insert("year".into(), year);
    citation.insert("title".into(), json!(title));
    let mut summary = String::new();
    for line in lines {
        if let Some(url) = line.strip_prefix("URL: ") {
            citation.insert("url".into(), json!(url.trim()));
        } else if let Some(text) = line.strip_prefix("Abstract: ") {
            summary = truncate(text.trim(), SUMMARY_CHARS);
        }
    }
    if summary.is_empty() {
        summary = title.clone();
    }

    Some(json!({
        "source": "search results",
        "citation": citation,
        "approach_summary": summary,
        "strengths": [],
        "weaknesses": [],
        "research_gaps": []
    }))
}

/// 文献综述降级：先尝试回收模型写过的综述，否则从检索结果里的论文块拼条目
pub struct ReviewFromSearchResults {
    pub topic: String,
}

impl ReviewFromSearchResults {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into() }
    }

    fn entries(&self, tool_results: &[String]) -> Vec<Value> {
        let mut seen = HashSet::new();
        tool_results
            .iter()
            .flat_map(|r| r.split("\n\n"))
            .filter_map(parse_paper_block)
            .filter(|entry| {
                let title = entry["citation"]["title"].as_str().unwrap_or("").to_lowercase();
                seen.insert(title)
            })
            .take(MAX_DEGRADED_ENTRIES)
            .collect()
    }
}

impl DegradedArtifactBuilder for ReviewFromSearchResults {
    fn build(&self, report: &AttemptReport) -> Value {
        let mut review = salvage_payload(report, ArtifactKind::LiteratureReview).unwrap_or_else(|| {
            let entries = self.entries(&report.tool_results);
            json!({
                "topic_summary": truncate(self.topic.trim(), SUMMARY_CHARS),
                "synthesis": format!(
                    "Literature review was not finalized; {} entries were recovered from search results.",
                    entries.len()
                ),
                "entries": entries,
            })
        });
        tag_degraded(&mut review);
        review
    }
}

/// 方向降级：先尝试回收模型写过的提案，否则用第一个假设构造一个最小提案
pub struct DirectionFromHypothesis {
    pub hypotheses: Value,
    pub synthesis: String,
}

impl DirectionFromHypothesis {
    pub fn new(hypotheses: Value, synthesis: impl Into<String>) -> Self {
        Self {
            hypotheses,
            synthesis: synthesis.into(),
        }
    }

    fn from_first_hypothesis(&self) -> Value {
        let first = self
            .hypotheses
            .get("hypotheses")
            .and_then(Value::as_array)
            .and_then(|h| h.first())
            .cloned()
            .unwrap_or(Value::Null);
        let field = |k: &str| first.get(k).and_then(Value::as_str).unwrap_or("").to_string();

        let name = match field("name") {
            n if n.is_empty() => "direction".to_string(),
            n => n,
        };
        let hypothesis = field("short_hypothesis");
        let rationale = field("rationale");
        let abstract_text = if rationale.is_empty() {
            hypothesis.clone()
        } else {
            format!("{hypothesis} {rationale}")
        };
        json!({
            "Name": name,
            "Title": name.replace('_', " "),
            "Short Hypothesis": hypothesis,
            "Related Work": self.synthesis,
            "Abstract": abstract_text,
            "Experiments": [],
            "Risk Factors and Limitations": ["Direction was not finalized by the model; review before use."],
        })
    }
}

impl DegradedArtifactBuilder for DirectionFromHypothesis {
    fn build(&self, report: &AttemptReport) -> Value {
        let mut direction = salvage_payload(report, ArtifactKind::Direction)
            .unwrap_or_else(|| self.from_first_hypothesis());
        tag_degraded(&mut direction);
        direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::UsageLedger;
    use crate::memory::{Message, MessageHistory};
    use crate::react::loop_::{AttemptOutcome, ExhaustReason};

    fn report(replies: &[&str], tool_results: &[&str]) -> AttemptReport {
        let mut history = MessageHistory::new();
        for r in replies {
            history.push(Message::user("prompt"));
            history.push(Message::assistant(*r));
        }
        AttemptReport {
            outcome: AttemptOutcome::Exhausted {
                reason: ExhaustReason::RoundBudget,
            },
            rounds: Vec::new(),
            tool_results: tool_results.iter().map(|s| s.to_string()).collect(),
            history,
            usage: UsageLedger::new(),
        }
    }

    #[test]
    fn test_review_from_paper_blocks() {
        let results = [
            "1: Attention Is All You Need. Vaswani, Shazeer. NeurIPS, 2017.\nURL: https://x.org/1\nAbstract: Transformers.\n\n\
             2: Deep Residual Learning. He, Zhang. CVPR, 2016.",
            "1: Attention Is All You Need. Vaswani, Shazeer. NeurIPS, 2017.",
        ];
        let review = ReviewFromSearchResults::new("transformers").build(&report(&["ACTION: SearchArxiv"], &results));

        assert_eq!(review["degraded"], true);
        let entries = review["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["citation"]["title"], "Attention Is All You Need");
        assert_eq!(entries[0]["citation"]["year"], 2017);
        assert_eq!(entries[0]["citation"]["url"], "https://x.org/1");
        assert_eq!(entries[0]["approach_summary"], "Transformers.");
        assert_eq!(entries[1]["citation"]["author"], "He, Zhang");
    }

    #[test]
    fn test_review_without_results_still_produced() {
        let review = ReviewFromSearchResults::new("t").build(&report(&[], &[]));
        assert_eq!(review["degraded"], true);
        assert_eq!(review["entries"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_salvages_last_written_payload() {
        let reply = "ACTION: FinalizeDirection\nARGUMENTS: {\"direction\": {\"Name\": \"salvaged\"}}";
        let hyps = json!({"hypotheses": [{"name": "first_hyp", "short_hypothesis": "h"}]});
        let direction = DirectionFromHypothesis::new(hyps, "s").build(&report(&[reply], &[]));
        assert_eq!(direction["Name"], "salvaged");
        assert_eq!(direction["degraded"], true);
    }

    #[test]
    fn test_direction_from_first_hypothesis() {
        let hyps = json!({"hypotheses": [
            {"name": "sparse_heads", "short_hypothesis": "Few heads matter.", "rationale": "Ablations show it."},
            {"name": "other", "short_hypothesis": "x"}
        ]});
        let direction = DirectionFromHypothesis::new(hyps, "synthesis text").build(&report(&["no action"], &[]));
        assert_eq!(direction["Name"], "sparse_heads");
        assert_eq!(direction["Title"], "sparse heads");
        assert_eq!(direction["Related Work"], "synthesis text");
        assert_eq!(direction["Abstract"], "Few heads matter. Ablations show it.");
        assert_eq!(direction["degraded"], true);
    }
}
