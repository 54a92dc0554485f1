//! 产物 schema 校验（jsonschema，Draft 7）
//!
//! 每种产物一个 schema：idea（方向提案复用同一 schema）、文献综述、假设集、实验计划。
//! validate 返回全部错误信息，供反思循环拼进下一轮反馈。

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::react::ArtifactKind;

fn string_or_int() -> Value {
    json!({"oneOf": [{"type": "string"}, {"type": "integer"}]})
}

fn citation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "author": {"type": "string"},
            "year": string_or_int(),
            "title": {"type": "string"},
            "url": {"type": "string"},
            "doi": {"type": "string"}
        },
        "required": ["author", "year", "title"]
    })
}

/// 研究创意（以及方向提案）
pub fn idea_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "Name": {"type": "string", "minLength": 1},
            "Title": {"type": "string", "minLength": 5},
            "Short Hypothesis": {"type": "string", "minLength": 10},
            "Related Work": {"type": "string", "minLength": 10},
            "Abstract": {"type": "string", "minLength": 50},
            "Experiments": {
                "oneOf": [
                    {"type": "string", "minLength": 20},
                    {
                        "type": "array",
                        "items": {"oneOf": [{"type": "string"}, {"type": "object"}]},
                        "minItems": 1
                    }
                ]
            },
            "Risk Factors and Limitations": {
                "oneOf": [
                    {"type": "string", "minLength": 10},
                    {"type": "array", "items": {"type": "string"}, "minItems": 1}
                ]
            },
            "References": {"type": "array", "items": citation_schema()}
        },
        "required": [
            "Name",
            "Title",
            "Short Hypothesis",
            "Related Work",
            "Abstract",
            "Experiments",
            "Risk Factors and Limitations"
        ]
    })
}

pub fn literature_review_schema() -> Value {
    let string_list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "topic_summary": {"type": "string", "minLength": 1},
            "entries": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "source": {"type": "string", "minLength": 1},
                        "citation": citation_schema(),
                        "approach_summary": {"type": "string", "minLength": 1},
                        "strengths": string_list,
                        "weaknesses": string_list,
                        "research_gaps": string_list
                    },
                    "required": ["source", "citation", "approach_summary", "strengths", "weaknesses", "research_gaps"]
                }
            },
            "synthesis": {"type": "string", "minLength": 1}
        },
        "required": ["topic_summary", "entries", "synthesis"]
    })
}

pub fn hypotheses_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "gaps": {"type": "array"},
            "hypotheses": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "minLength": 1},
                        "short_hypothesis": {"type": "string", "minLength": 1}
                    },
                    "required": ["name", "short_hypothesis"]
                }
            }
        },
        "required": ["gaps", "hypotheses"]
    })
}

pub fn experiment_plan_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "proposal_ref": {
                "type": "object",
                "properties": {"name": {"type": "string"}, "title": {"type": "string"}},
                "required": ["name", "title"]
            },
            "metrics": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "primary": {"type": "boolean"}
                    },
                    "required": ["name", "description", "primary"]
                }
            },
            "baselines": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "source": {"type": "string"},
                        "citation": {"type": "string"}
                    },
                    "required": ["name", "description"]
                }
            },
            "datasets": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "size_or_source": {"type": "string"},
                        "license_or_access": {"type": "string"}
                    },
                    "required": ["name", "description"]
                }
            },
            "implementation_steps": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "order": {"type": "integer"},
                        "step": {"type": "string"},
                        "description": {"type": "string"},
                        "deliverables": {"type": "string"}
                    },
                    "required": ["order", "step", "description"]
                }
            },
            "min_config": {
                "type": "object",
                "properties": {
                    "hardware": {"type": "string"},
                    "min_data": {"type": "string"},
                    "framework": {"type": "string"},
                    "estimated_time": {"type": "string"}
                }
            }
        },
        "required": ["proposal_ref", "metrics", "baselines", "datasets", "implementation_steps", "min_config"]
    })
}

/// 编译后的全部产物 schema
pub struct SchemaValidator {
    validators: HashMap<ArtifactKind, Validator>,
}

impl SchemaValidator {
    pub fn new() -> Result<Self, AgentError> {
        let idea = idea_schema();
        let schemas = [
            (ArtifactKind::Idea, &idea),
            (ArtifactKind::Direction, &idea),
            (ArtifactKind::LiteratureReview, &literature_review_schema()),
            (ArtifactKind::Hypotheses, &hypotheses_schema()),
            (ArtifactKind::ExperimentPlan, &experiment_plan_schema()),
        ]
        .into_iter()
        .map(|(kind, schema)| {
            jsonschema::validator_for(schema)
                .map(|v| (kind, v))
                .map_err(|e| AgentError::Config(format!("invalid {} schema: {}", kind, e)))
        })
        .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { validators: schemas })
    }

    /// 校验产物；失败时返回全部错误信息，每条带 `[路径]` 前缀
    pub fn validate(&self, kind: ArtifactKind, payload: &Value) -> Result<(), Vec<String>> {
        let Some(validator) = self.validators.get(&kind) else {
            return Ok(());
        };
        let mut located: Vec<(Vec<Result<usize, String>>, String)> = validator
            .iter_errors(payload)
            .map(|e| {
                let segments = path_segments(e.instance_path().as_str());
                (segments, e.to_string())
            })
            .collect();
        if located.is_empty() {
            return Ok(());
        }
        // 按实例路径排序，数组下标按数值比较
        located.sort();
        Err(located
            .into_iter()
            .map(|(segments, message)| format!("[{}] {}", display_path(&segments), message))
            .collect())
    }
}

/// JSON Pointer 拆段；能解析为数字的段视为数组下标
fn path_segments(pointer: &str) -> Vec<Result<usize, String>> {
    pointer
        .split('/')
        .skip(1)
        .map(|raw| {
            let segment = raw.replace("~1", "/").replace("~0", "~");
            segment.parse::<usize>().map_err(|_| segment)
        })
        .collect()
}

/// `entries -> 1 -> citation`；根节点写作 `(root)`
fn display_path(segments: &[Result<usize, String>]) -> String {
    if segments.is_empty() {
        return "(root)".to_string();
    }
    segments
        .iter()
        .map(|s| match s {
            Ok(index) => index.to_string(),
            Err(name) => name.clone(),
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_idea() -> Value {
        json!({
            "Name": "sparse_probe",
            "Title": "Sparse Probing of Reasoning Circuits",
            "Short Hypothesis": "Reasoning is localized in a few attention heads.",
            "Related Work": "Prior probing work studies dense representations only.",
            "Abstract": "We propose sparse probes that isolate the attention heads responsible for multi-step reasoning in transformers.",
            "Experiments": ["Train probes on GSM8K activations", "Ablate selected heads"],
            "Risk Factors and Limitations": "Probes may overfit small datasets."
        })
    }

    #[test]
    fn test_valid_idea_passes() {
        let v = SchemaValidator::new().unwrap();
        assert!(v.validate(ArtifactKind::Idea, &valid_idea()).is_ok());
        assert!(v.validate(ArtifactKind::Direction, &valid_idea()).is_ok());
    }

    #[test]
    fn test_missing_field_reported_by_name() {
        let v = SchemaValidator::new().unwrap();
        let mut idea = valid_idea();
        idea.as_object_mut().unwrap().remove("Abstract");
        let errors = v.validate(ArtifactKind::Idea, &idea).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("[(root)] "));
        assert!(errors[0].contains("Abstract"));
        assert!(errors[0].contains("required"));
    }

    #[test]
    fn test_experiments_string_too_short() {
        let v = SchemaValidator::new().unwrap();
        let mut idea = valid_idea();
        idea["Experiments"] = json!("too short");
        assert!(v.validate(ArtifactKind::Idea, &idea).is_err());
    }

    #[test]
    fn test_literature_review_needs_entry() {
        let v = SchemaValidator::new().unwrap();
        let review = json!({"topic_summary": "t", "entries": [], "synthesis": "s"});
        assert!(v.validate(ArtifactKind::LiteratureReview, &review).is_err());

        let review = json!({
            "topic_summary": "t",
            "entries": [{
                "source": "Semantic Scholar",
                "citation": {"author": "Ada", "year": 2021, "title": "T"},
                "approach_summary": "a",
                "strengths": [], "weaknesses": [], "research_gaps": ["g"]
            }],
            "synthesis": "s"
        });
        assert!(v.validate(ArtifactKind::LiteratureReview, &review).is_ok());
    }

    #[test]
    fn test_nested_errors_carry_location_sorted() {
        let v = SchemaValidator::new().unwrap();
        let entry = |year: Value| {
            let mut citation = json!({"author": "Ada", "title": "T"});
            if !year.is_null() {
                citation["year"] = year;
            }
            json!({
                "source": "OpenAlex",
                "citation": citation,
                "approach_summary": "a",
                "strengths": [], "weaknesses": [], "research_gaps": []
            })
        };
        let mut entries: Vec<Value> = (0..11).map(|_| entry(json!(2020))).collect();
        entries[1] = entry(Value::Null);
        entries[10] = entry(Value::Null);
        let review = json!({"topic_summary": "t", "entries": entries});

        let errors = v.validate(ArtifactKind::LiteratureReview, &review).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("[(root)] "));
        assert!(errors[0].contains("synthesis"));
        assert!(errors[1].starts_with("[entries -> 1 -> citation] "));
        assert!(errors[1].contains("\"year\" is a required property"));
        assert!(errors[2].starts_with("[entries -> 10 -> citation] "));
    }

    #[test]
    fn test_hypotheses_and_plan() {
        let v = SchemaValidator::new().unwrap();
        let hyps = json!({"gaps": ["g1"], "hypotheses": [{"name": "h1", "short_hypothesis": "x"}]});
        assert!(v.validate(ArtifactKind::Hypotheses, &hyps).is_ok());
        assert!(v
            .validate(ArtifactKind::Hypotheses, &json!({"gaps": [], "hypotheses": []}))
            .is_err());

        let plan = json!({
            "proposal_ref": {"name": "n", "title": "t"},
            "metrics": [{"name": "acc", "description": "accuracy", "primary": true}],
            "baselines": [], "datasets": [],
            "implementation_steps": [{"order": 1, "step": "s", "description": "d"}],
            "min_config": {}
        });
        assert!(v.validate(ArtifactKind::ExperimentPlan, &plan).is_ok());
    }
}
