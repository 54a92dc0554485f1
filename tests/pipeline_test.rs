//! 流水线集成测试：四阶段完整运行、强制最后一轮与降级综述、假设阶段失败

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use ideaforge::core::AgentError;
use ideaforge::llm::ScriptedLlmClient;
use ideaforge::pipeline::{read_json, PipelineSettings, ResearchPipeline};
use ideaforge::tools::{Tool, ToolExecutor, ToolRegistry};
use ideaforge::validation::SchemaValidator;

struct PaperSearch;

#[async_trait]
impl Tool for PaperSearch {
    fn name(&self) -> &str {
        "SearchPapers"
    }

    fn description(&self) -> &str {
        "Search papers"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok("1: Attention Is All You Need. Vaswani, Shazeer. NeurIPS, 2017.\nURL: https://arxiv.org/abs/1706.03762\n\n\
            2: Deep Residual Learning. He, Zhang. CVPR, 2016."
            .to_string())
    }
}

fn review() -> Value {
    json!({
        "topic_summary": "Efficient attention",
        "entries": [{
            "source": "SearchPapers",
            "citation": {"author": "Vaswani", "year": 2017, "title": "Attention Is All You Need"},
            "approach_summary": "Self-attention only",
            "strengths": ["parallel"],
            "weaknesses": ["quadratic cost"],
            "research_gaps": ["long context"]
        }],
        "synthesis": "Long-context efficiency remains open."
    })
}

fn direction() -> Value {
    json!({
        "Name": "linear_memory",
        "Title": "Linear Memory Attention for Long Contexts",
        "Short Hypothesis": "A learned memory makes attention linear without quality loss.",
        "Related Work": "Sparse and low-rank attention trade quality for speed.",
        "Abstract": "We propose a learned memory bank that summarizes past tokens so each query attends to a fixed number of slots.",
        "Experiments": ["Compare perplexity on PG-19 against Longformer"],
        "Risk Factors and Limitations": ["Memory may lose rare details"]
    })
}

fn finalize(action: &str, key: &str, payload: &Value) -> String {
    format!("ACTION: {action}\nARGUMENTS: {}", json!({ key: payload }))
}

fn settings(literature_reflections: usize) -> PipelineSettings {
    PipelineSettings {
        literature_reflections,
        direction_reflections: 3,
        max_hypotheses: 10,
        force_final_round: true,
        degraded_fallback: true,
    }
}

fn pipeline(llm: Arc<ScriptedLlmClient>, settings: PipelineSettings) -> ResearchPipeline {
    let mut registry = ToolRegistry::new();
    registry.register(PaperSearch);
    ResearchPipeline::new(llm, ToolExecutor::new(registry, 5), settings).with_validator(SchemaValidator::new().unwrap())
}

#[tokio::test]
async fn test_full_pipeline_writes_four_artifacts() {
    let hypotheses = json!({
        "gaps": ["long context"],
        "hypotheses": [{"name": "linear_memory", "short_hypothesis": "Memory slots suffice.", "rationale": "r"}]
    });
    let plan = json!({
        "proposal_ref": {"name": "linear_memory", "title": "Linear Memory Attention"},
        "metrics": [{"name": "perplexity", "description": "PG-19 perplexity", "primary": true}],
        "baselines": [{"name": "Longformer", "description": "sparse attention"}],
        "datasets": [{"name": "PG-19", "description": "books"}],
        "implementation_steps": [{"order": 1, "step": "implement", "description": "memory layer"}],
        "min_config": {"hardware": "1x A100"}
    });
    let llm = Arc::new(ScriptedLlmClient::new([
        "ACTION: SearchPapers\nARGUMENTS: {\"query\": \"efficient attention\"}".to_string(),
        finalize("FinalizeLiteratureReview", "literature_review", &review()),
        format!("```json\n{}\n```", hypotheses),
        finalize("FinalizeDirection", "direction", &direction()),
        plan.to_string(),
    ]));

    let dir = TempDir::new().unwrap();
    let paths = pipeline(llm.clone(), settings(5))
        .run_full("Efficient attention", "attention", dir.path())
        .await
        .unwrap();

    assert_eq!(paths.literature_review, dir.path().join("attention.lit_review.json"));
    assert_eq!(read_json(&paths.literature_review).unwrap(), review());
    assert_eq!(read_json(&paths.hypotheses).unwrap(), hypotheses);
    assert_eq!(read_json(&paths.direction).unwrap(), direction());
    assert_eq!(read_json(&paths.experiment_plan).unwrap(), plan);
    assert_eq!(llm.call_count(), 5);

    // 方向阶段看到综述的 synthesis 与假设列表
    let direction_prompt = llm.prompt_at(3).unwrap();
    assert!(direction_prompt.contains("Long-context efficiency remains open."));
    assert!(direction_prompt.contains("- linear_memory: Memory slots suffice."));
}

#[tokio::test]
async fn test_forced_final_round_then_degraded_review() {
    let llm = Arc::new(ScriptedLlmClient::new([
        "ACTION: SearchPapers\nARGUMENTS: {\"query\": \"attention\"}",
        "ACTION: SearchPapers\nARGUMENTS: {\"query\": \"more attention\"}",
    ]));
    let phase = pipeline(llm.clone(), settings(2))
        .literature_review("Efficient attention")
        .await
        .unwrap();

    assert!(llm.prompt_at(1).unwrap().contains("Do NOT call any search tool"));
    assert!(phase.degraded);
    assert_eq!(phase.artifact["degraded"], true);
    let entries = phase.artifact["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["citation"]["title"], "Attention Is All You Need");
    assert_eq!(entries[0]["citation"]["url"], "https://arxiv.org/abs/1706.03762");
}

#[tokio::test]
async fn test_exhausted_phase_fails_without_fallback() {
    let llm = Arc::new(ScriptedLlmClient::new(["nothing useful", "still nothing"]));
    let mut s = settings(3);
    s.degraded_fallback = false;
    let err = pipeline(llm, s).literature_review("t").await.unwrap_err();
    assert!(matches!(err, AgentError::PhaseIncomplete { .. }));
}

#[tokio::test]
async fn test_hypotheses_without_required_keys_fail() {
    let llm = Arc::new(ScriptedLlmClient::new(["{\"ideas\": []}"]));
    let err = pipeline(llm.clone(), settings(3)).hypotheses(&review()).await.unwrap_err();
    assert!(matches!(err, AgentError::PhaseIncomplete { .. }));
    // 假设数量被限制在 [5, 20]
    let mut s = settings(3);
    s.max_hypotheses = 50;
    let llm = Arc::new(ScriptedLlmClient::new(["{\"gaps\": [], \"hypotheses\": []}"]));
    pipeline(llm.clone(), s).hypotheses(&review()).await.unwrap();
    assert!(llm.prompt_at(0).unwrap().contains("at most 20 testable hypotheses"));
}

#[tokio::test]
async fn test_direction_falls_back_to_first_hypothesis() {
    let hypotheses = json!({"gaps": [], "hypotheses": [{"name": "memory_slots", "short_hypothesis": "Slots suffice."}]});
    let llm = Arc::new(ScriptedLlmClient::new(["hmm", "ACTION: FinalizeDirection\nARGUMENTS: {\"direction\": {}}", "x"]));
    let phase = pipeline(llm, settings(3))
        .direction(&review(), &hypotheses, Some("memory_slots"))
        .await
        .unwrap();
    assert!(phase.degraded);
    assert_eq!(phase.artifact["Name"], "memory_slots");
}
