//! 提示词模板
//!
//! 反思循环每个任务由两段固定文本（system + 首轮 prompt）加上按轮生成的反思 / 最后一轮模板组成；
//! 单次调用的阶段（假设、实验计划、新颖性评分、假设扩展）各有一对 system + user 文本。

use serde_json::Value;

use crate::react::ArtifactKind;
use crate::tools::ToolRegistry;

/// 一个反思循环任务的固定提示
#[derive(Debug, Clone)]
pub struct TaskPrompts {
    pub system: String,
    pub initial: String,
}

fn action_names(registry: &ToolRegistry, kind: ArtifactKind) -> String {
    registry
        .names()
        .into_iter()
        .chain(std::iter::once(kind.finalize_action().to_string()))
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn tool_section(registry: &ToolRegistry, kind: ArtifactKind, finalize_description: &str) -> String {
    let mut section = registry.describe();
    if !section.is_empty() {
        section.push_str("\n\n");
    }
    section.push_str(&format!("- **{}**: {}", kind.finalize_action(), finalize_description));
    section
}

fn response_format(registry: &ToolRegistry, kind: ArtifactKind, payload_example: &str) -> String {
    format!(
        r#"Respond in the following format:

THOUGHT:
<Your reasoning about what to do next>

ACTION:
<The action to take, exactly one of {names}>

ARGUMENTS:
<For a search tool provide {{"query": "your search query"}}. For {finalize} provide {{"{key}": {{ ... }}}} as shown below.>

{finalize} ARGUMENTS:
```json
{payload_example}
```

Ensure the JSON is properly formatted for automatic parsing."#,
        names = action_names(registry, kind),
        finalize = kind.finalize_action(),
        key = kind.payload_key(),
        payload_example = payload_example,
    )
}

const IDEA_FIELDS: &str = r#"The IDEA JSON should include the following fields:
- "Name": A short descriptor of the idea. Lowercase, no spaces, underscores allowed.
- "Title": A catchy and informative title for the proposal.
- "Short Hypothesis": A concise statement of the main hypothesis or research question.
- "Related Work": The most relevant related work and how the proposal clearly distinguishes from it.
- "Abstract": An abstract that summarizes the proposal in conference format (approximately 250 words).
- "Experiments": A list of simple, feasible experiments, with the evaluation metrics you would use.
- "Risk Factors and Limitations": A list of potential risks and limitations of the proposal.
- "References" (optional): structured citations {"author", "year", "title", "url"} for the work you cite."#;

const IDEA_EXAMPLE: &str = r#"{
  "idea": {
    "Name": "...",
    "Title": "...",
    "Short Hypothesis": "...",
    "Related Work": "...",
    "Abstract": "...",
    "Experiments": ["..."],
    "Risk Factors and Limitations": ["..."]
  }
}"#;

/// 创意生成：archive 为已归档的创意，原样列出以避免重复
pub fn idea_task(
    registry: &ToolRegistry,
    topic: &str,
    archive: &[Value],
    system_override: Option<&str>,
) -> TaskPrompts {
    let kind = ArtifactKind::Idea;
    let system = match system_override {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => format!(
            "You are an experienced AI researcher who aims to propose high-impact research ideas resembling exciting grant proposals. \
             Each proposal should stem from a simple and elegant question, observation, or hypothesis about the topic, \
             and must clearly distinguish itself from the existing literature. \
             Ensure the proposal does not require resources beyond what an academic lab could afford.\n\n\
             You have access to the following tools:\n\n{tools}\n\n{format}\n\n\
             Note: perform at least one literature search before finalizing your idea.",
            tools = tool_section(registry, kind, IDEA_FIELDS),
            format = response_format(registry, kind, IDEA_EXAMPLE),
        ),
    };

    let previous = archive
        .iter()
        .map(|a| serde_json::to_string(a).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n\n");
    let initial = format!(
        "{topic}\n\nHere are the proposals that you have already generated:\n\n'''\n{previous}\n'''\n\n\
         Begin by generating an interestingly new high-level research proposal that differs from what you have previously proposed."
    );
    TaskPrompts { system, initial }
}

const LIT_REVIEW_EXAMPLE: &str = r#"{
  "literature_review": {
    "topic_summary": "...",
    "entries": [
      {
        "source": "SearchSemanticScholar",
        "citation": {"author": "...", "year": 2023, "title": "...", "url": "..."},
        "approach_summary": "...",
        "strengths": ["..."],
        "weaknesses": ["..."],
        "research_gaps": ["..."]
      }
    ],
    "synthesis": "..."
  }
}"#;

/// 文献综述阶段
pub fn literature_review_task(registry: &ToolRegistry, topic: &str) -> TaskPrompts {
    let kind = ArtifactKind::LiteratureReview;
    let system = format!(
        "You are a meticulous research assistant building a structured literature review. \
         Search for the most relevant papers, then summarize each one with its approach, strengths, weaknesses and open research gaps. \
         Only cite papers that appeared in your search results.\n\n\
         You have access to the following tools:\n\n{tools}\n\n{format}",
        tools = tool_section(
            registry,
            kind,
            "Finalize the review with a topic summary, at least one entry per relevant paper, and a synthesis of the open gaps."
        ),
        format = response_format(registry, kind, LIT_REVIEW_EXAMPLE),
    );
    let initial = format!(
        "Research topic:\n\n{topic}\n\n\
         Start the literature review. Search for the key papers on this topic before finalizing."
    );
    TaskPrompts { system, initial }
}

const DIRECTION_EXAMPLE: &str = r#"{
  "direction": {
    "Name": "...",
    "Title": "...",
    "Short Hypothesis": "...",
    "Related Work": "...",
    "Abstract": "...",
    "Experiments": ["..."],
    "Risk Factors and Limitations": ["..."]
  }
}"#;

/// 方向选择阶段
pub fn direction_task(registry: &ToolRegistry, synthesis: &str, hypotheses_list: &str) -> TaskPrompts {
    let kind = ArtifactKind::Direction;
    let system = format!(
        "You are a senior researcher choosing one concrete research direction and writing a detailed proposal for it. \
         Pick the hypothesis with the best balance of novelty, impact and feasibility, check the literature if needed, \
         and finalize a proposal in the same format as a research idea.\n\n{fields}\n\n\
         You have access to the following tools:\n\n{tools}\n\n{format}",
        fields = IDEA_FIELDS,
        tools = tool_section(registry, kind, "Finalize the chosen direction as a full proposal."),
        format = response_format(registry, kind, DIRECTION_EXAMPLE),
    );
    let initial = format!(
        "Literature review synthesis:\n\n{synthesis}\n\nCandidate hypotheses:\n{hypotheses_list}\n\n\
         Choose the most promising direction and develop it into a detailed proposal."
    );
    TaskPrompts { system, initial }
}

/// 第 2 轮起的反思提示；round 从 1 计
pub fn reflection_prompt(kind: ArtifactKind, round: usize, total: usize, feedback: &str) -> String {
    let feedback = if feedback.trim().is_empty() { "No new results." } else { feedback };
    let focus = match kind {
        ArtifactKind::LiteratureReview => {
            "Consider whether the review covers the key papers and whether every entry is grounded in search results."
        }
        _ => {
            "In your thoughts, first carefully consider the quality, novelty, and feasibility of the proposal you just created. \
             Ensure the proposal is clear and concise, and the JSON is in the correct format. \
             Stick to the spirit of the original idea unless there are glaring issues."
        }
    };
    format!(
        "Round {round}/{total}.\n\n{focus}\n\n\
         If you have new information from tools, such as literature search results, incorporate it and refine your {kind} accordingly.\n\n\
         Results from your last action (if any):\n\n{feedback}\n"
    )
}

/// 强制终结的最后一轮：不允许再调用检索工具
pub fn final_round_prompt(kind: ArtifactKind, round: usize, total: usize, feedback: &str) -> String {
    let feedback = if feedback.trim().is_empty() { "No new results." } else { feedback };
    format!(
        "Round {round}/{total}. This is your LAST round.\n\n\
         You must now finalize your {kind} using the {action} action. Do NOT call any search tool.\n\
         Reply with ACTION: {action} and ARGUMENTS containing {{\"{key}\": {{ ... }}}}.\n\n\
         Results from your last action (if any):\n\n{feedback}\n",
        action = kind.finalize_action(),
        key = kind.payload_key(),
    )
}

/// 假设阶段（单次调用）
pub fn hypotheses_prompt(lit_review_json: &str, max_hypotheses: usize) -> (String, String) {
    let system = "You are a research advisor. Output only a valid JSON object with keys 'gaps' and 'hypotheses', no other text or markdown.".to_string();
    let prompt = format!(
        "Here is a structured literature review:\n\n{lit_review_json}\n\n\
         Identify the most important research gaps, then propose at most {max_hypotheses} testable hypotheses that address them.\n\n\
         Return a JSON object of the form:\n\
         {{\"gaps\": [\"...\"], \"hypotheses\": [{{\"name\": \"short_snake_case_id\", \"short_hypothesis\": \"...\", \"rationale\": \"...\", \"addresses_gap\": \"...\"}}]}}"
    );
    (system, prompt)
}

/// 实验计划阶段（单次调用）
pub fn experiment_plan_prompt(direction_json: &str) -> (String, String) {
    let system = "You are a research methodologist. Output only a valid JSON object with the exact structure requested \
                  (proposal_ref, metrics, baselines, datasets, implementation_steps, min_config). No markdown, no explanation."
        .to_string();
    let prompt = format!(
        "Here is the research proposal:\n\n{direction_json}\n\n\
         Write a concrete experiment plan as a JSON object:\n\
         {{\n  \"proposal_ref\": {{\"name\": \"...\", \"title\": \"...\"}},\n  \
         \"metrics\": [{{\"name\": \"...\", \"description\": \"...\", \"primary\": true}}],\n  \
         \"baselines\": [{{\"name\": \"...\", \"description\": \"...\", \"source\": \"...\"}}],\n  \
         \"datasets\": [{{\"name\": \"...\", \"description\": \"...\", \"size_or_source\": \"...\", \"license_or_access\": \"...\"}}],\n  \
         \"implementation_steps\": [{{\"order\": 1, \"step\": \"...\", \"description\": \"...\", \"deliverables\": \"...\"}}],\n  \
         \"min_config\": {{\"hardware\": \"...\", \"min_data\": \"...\", \"framework\": \"...\", \"estimated_time\": \"...\"}}\n}}"
    );
    (system, prompt)
}

/// 新颖性评分（单次调用）
pub fn novelty_prompt(idea: &Value) -> (String, String) {
    let system = r#"You are an expert scientific reviewer specializing in assessing the novelty of research proposals.
Given a research idea, evaluate its novelty on a scale from 0.0 to 1.0 where:
  0.0 = completely derivative, already well-explored in the literature
  0.5 = moderately novel, has some new angles but builds heavily on existing work
  1.0 = highly novel, proposes a genuinely new direction or insight

Respond ONLY with a JSON object in this exact format:
```json
{"score": <float>, "reasoning": "<one-paragraph explanation>"}
```"#
        .to_string();
    let field = |k: &str| idea.get(k).and_then(Value::as_str).unwrap_or("").to_string();
    let prompt = format!(
        "Please evaluate the novelty of the following research idea:\n\n\
         Title: {}\n\nShort Hypothesis: {}\n\nAbstract: {}\n\nRelated Work: {}\n",
        field("Title"),
        field("Short Hypothesis"),
        field("Abstract"),
        field("Related Work"),
    );
    (system, prompt)
}

const EXPANSION_SYSTEM: &str = "You are a research advisor. Output only a valid JSON array, no other text.";

/// 从研究主题扩展子假设
pub fn expansion_from_topic(topic: &str, max_sub: usize) -> (String, String) {
    let prompt = format!(
        "Research topic:\n\n{}\n\n\
         Propose between 5 and {max_sub} distinct sub-hypotheses that could each be researched independently.\n\
         Return a JSON array of objects: [{{\"Name\": \"short_snake_case_id\", \"Short Hypothesis\": \"...\"}}]",
        topic.trim()
    );
    (EXPANSION_SYSTEM.to_string(), prompt)
}

/// 从已有创意扩展理论变体
pub fn expansion_from_idea(title: &str, short_hypothesis: &str, max_sub: usize) -> (String, String) {
    let prompt = format!(
        "Research idea:\n\nTitle: {title}\nShort Hypothesis: {short_hypothesis}\n\n\
         Propose between 5 and {max_sub} sub-hypotheses or theory variants of this idea that could each be tested on their own.\n\
         Return a JSON array of objects: [{{\"Name\": \"short_snake_case_id\", \"Short Hypothesis\": \"...\"}}]"
    );
    (EXPANSION_SYSTEM.to_string(), prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_idea_task_lists_archive_and_actions() {
        let registry = ToolRegistry::new();
        let archive = vec![json!({"Name": "first_idea"})];
        let task = idea_task(&registry, "Topic: sparse models", &archive, None);
        assert!(task.initial.starts_with("Topic: sparse models"));
        assert!(task.initial.contains("{\"Name\":\"first_idea\"}"));
        assert!(task.system.contains("exactly one of \"FinalizeIdea\""));

        let task = idea_task(&registry, "t", &[], Some("custom system"));
        assert_eq!(task.system, "custom system");
    }

    #[test]
    fn test_final_round_forbids_search() {
        let p = final_round_prompt(ArtifactKind::LiteratureReview, 5, 5, "");
        assert!(p.contains("LAST round"));
        assert!(p.contains("FinalizeLiteratureReview"));
        assert!(p.contains("\"literature_review\""));
        assert!(p.contains("No new results."));
    }

    #[test]
    fn test_reflection_carries_feedback() {
        let p = reflection_prompt(ArtifactKind::Idea, 2, 5, "1: Some Paper. A. NeurIPS, 2020.");
        assert!(p.starts_with("Round 2/5."));
        assert!(p.contains("1: Some Paper."));
    }
}
