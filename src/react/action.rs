//! 动作模型：产物类型、解析结果与封闭的动作分派枚举
//!
//! 模型每轮回复被解析为 ParsedAction（名称 + 原始参数文本），再按当前产物类型与工具表
//! 一次性解析为 Action：检索工具、终结动作或未知动作。循环内只对 Action 做 match。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tools::ToolRegistry;

/// 产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Idea,
    LiteratureReview,
    Hypotheses,
    Direction,
    ExperimentPlan,
}

impl ArtifactKind {
    /// 由反思循环驱动（有终结动作）的产物类型，按解析优先级排列
    pub const LOOP_DRIVEN: [ArtifactKind; 3] = [
        ArtifactKind::LiteratureReview,
        ArtifactKind::Direction,
        ArtifactKind::Idea,
    ];

    /// 终结动作名
    pub fn finalize_action(self) -> &'static str {
        match self {
            ArtifactKind::Idea => "FinalizeIdea",
            ArtifactKind::LiteratureReview => "FinalizeLiteratureReview",
            ArtifactKind::Hypotheses => "FinalizeHypotheses",
            ArtifactKind::Direction => "FinalizeDirection",
            ArtifactKind::ExperimentPlan => "FinalizeExperimentPlan",
        }
    }

    /// 终结参数中承载产物的键，如 {"idea": {...}}
    pub fn payload_key(self) -> &'static str {
        match self {
            ArtifactKind::Idea => "idea",
            ArtifactKind::LiteratureReview => "literature_review",
            ArtifactKind::Hypotheses => "hypotheses",
            ArtifactKind::Direction => "direction",
            ArtifactKind::ExperimentPlan => "experiment_plan",
        }
    }

    /// 输出文件后缀（流水线阶段）
    pub fn file_suffix(self) -> &'static str {
        match self {
            ArtifactKind::Idea => "ideas",
            ArtifactKind::LiteratureReview => "lit_review",
            ArtifactKind::Hypotheses => "hypotheses",
            ArtifactKind::Direction => "direction",
            ArtifactKind::ExperimentPlan => "experiment_plan",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::Idea => "idea",
            ArtifactKind::LiteratureReview => "literature review",
            ArtifactKind::Hypotheses => "hypotheses",
            ArtifactKind::Direction => "direction",
            ArtifactKind::ExperimentPlan => "experiment plan",
        };
        f.write_str(label)
    }
}

/// 单轮回复的解析结果，产生后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub name: String,
    pub raw_arguments: String,
}

/// 解析后的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// 已注册的检索工具
    Search(String),
    /// 当前产物类型的终结动作
    Finalize(ArtifactKind),
    /// 工具表与终结动作都不认识的名字
    Unknown(String),
}

impl Action {
    pub fn resolve(name: &str, kind: ArtifactKind, registry: &ToolRegistry) -> Self {
        if name == kind.finalize_action() {
            Action::Finalize(kind)
        } else if registry.get(name).is_some() {
            Action::Search(name.to_string())
        } else {
            Action::Unknown(name.to_string())
        }
    }
}
