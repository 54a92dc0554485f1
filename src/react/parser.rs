//! 回复解析：从一段自由文本中提取唯一的 (动作名, 参数文本)
//!
//! 动作识别按级联顺序进行，第一个成功者胜出：
//! 1. 严格标记：行首的 `ACTION:`、`**ACTION:**`，或 JSON 风格的 `"ACTION": "..."`
//! 2. 逐行回退：行首（可带列表符号）`ACTION` 加冒号
//! 3. 已知名称：在全文中按优先级查找已知动作名（终结动作先于检索动作），允许 "Search arXiv" 这类带空格写法
//! 4. 结构推断：取第一个完整 JSON 对象，按签名键推断动作
//!
//! 参数文本取 `ARGUMENTS:` 之后到下一个段落标记为止；没有标记时回退到带签名键的 JSON 对象。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::LoopSignal;
use crate::react::action::{ArtifactKind, ParsedAction};
use crate::react::arguments::{decode, extract_outermost_json_object, strip_json_fence};
use crate::tools::ToolRegistry;

/// 结构推断用的签名键，按优先级排列；`query` 对应默认检索动作
pub const SIGNATURE_KEYS: [&str; 4] = ["literature_review", "direction", "idea", "query"];

/// 未注册也能被识别的检索动作名
pub const BUILTIN_SEARCH_ACTIONS: [&str; 5] = [
    "SearchArxiv",
    "SearchTavily",
    "SearchSemanticScholar",
    "SearchPubMed",
    "SearchOpenAlex",
];

/// 诊断预览的最大字符数
pub const PREVIEW_CHARS: usize = 2000;

fn strict_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"(?is)(?:^|\n)[ \t]*\*\*ACTION:?\*\*:?[ \t]*(.*?)\s*(?:\*\*ARGUMENTS|ARGUMENTS\s*:|\z)",
            r"(?is)(?:^|\n)[ \t]*ACTION:[ \t]*(.*?)\s*(?:\*\*ARGUMENTS|ARGUMENTS\s*:|\z)",
            r#"(?i)"ACTION"\s*:\s*"([^"]*)""#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:[-*>#]+\s*)*ACTION\s*\**\s*:\s*(.+)$").expect("valid regex")
    })
}

fn arguments_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?im)^[ \t]*(?:[-*>#]+[ \t]*)*(?:\*\*)?ARGUMENTS[ \t]*(?:\*\*)?[ \t]*:[ \t]*(?:\*\*)?|"ARGUMENTS"\s*:\s*"#,
        )
        .expect("valid regex")
    })
}

fn action_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?im)^[ \t]*(?:[-*>#]+[ \t]*)*(?:\*\*)?ACTION\b|"ACTION"\s*:"#).expect("valid regex")
    })
}

fn section_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*(?:\*\*)?(?:THOUGHT|ACTION|ARGUMENTS)(?:\*\*)?\s*:").expect("valid regex")
    })
}

/// 为动作名生成匹配正则：驼峰边界处允许空白，整体按词边界、忽略大小写
fn known_name_pattern(name: &str) -> Option<Regex> {
    let mut pattern = String::from(r"(?i)\b");
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() && prev_lower {
            pattern.push_str(r"\s*");
        }
        pattern.push_str(&regex::escape(&c.to_string()));
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
    }
    pattern.push_str(r"\b");
    Regex::new(&pattern).ok()
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// 取候选文本的第一行非空内容，去掉 markdown 强调、反引号、引号与末尾标点
fn clean_candidate(raw: &str) -> Option<String> {
    raw.lines()
        .map(|l| {
            l.trim_matches(|c: char| {
                c.is_whitespace() || matches!(c, '*' | '`' | '"' | '\'' | '<' | '>' | '.' | ':')
            })
        })
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        p.push_str("\n... [truncated]");
    }
    p
}

/// 回复解析器；已知名称目录 = 终结动作 + 已注册工具 + 内置检索动作名
#[derive(Debug)]
pub struct ResponseParser {
    known: Vec<(String, Regex)>,
    default_search: String,
}

impl ResponseParser {
    pub fn new<S: AsRef<str>>(tool_names: &[S]) -> Self {
        let mut names: Vec<String> = ArtifactKind::LOOP_DRIVEN
            .iter()
            .map(|k| k.finalize_action().to_string())
            .collect();
        for name in tool_names
            .iter()
            .map(|n| n.as_ref())
            .chain(BUILTIN_SEARCH_ACTIONS.iter().copied())
        {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        let known = names
            .into_iter()
            .filter_map(|n| known_name_pattern(&n).map(|re| (n, re)))
            .collect();

        let default_search = tool_names
            .first()
            .map(|n| n.as_ref().to_string())
            .unwrap_or_else(|| BUILTIN_SEARCH_ACTIONS[0].to_string());

        Self { known, default_search }
    }

    pub fn for_registry(registry: &ToolRegistry) -> Self {
        Self::new(&registry.names())
    }

    /// 解析一轮回复
    pub fn parse(&self, text: &str) -> Result<ParsedAction, LoopSignal> {
        let text = text.trim();
        let Some(name) = self.find_action(text) else {
            tracing::debug!(
                len = text.len(),
                preview = %preview(text),
                "Could not find ACTION in response"
            );
            return Err(LoopSignal::NoActionFound {
                len: text.len(),
                preview: preview(text),
            });
        };
        Ok(ParsedAction {
            name,
            raw_arguments: extract_arguments(text),
        })
    }

    fn find_action(&self, text: &str) -> Option<String> {
        strict_markers(text)
            .or_else(|| line_anchored(text))
            .map(|candidate| self.canonicalize(&candidate))
            .or_else(|| self.known_name(text))
            .or_else(|| self.structural(text))
    }

    fn canonicalize(&self, candidate: &str) -> String {
        let key = normalize(candidate);
        self.known
            .iter()
            .find(|(name, _)| normalize(name) == key)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| candidate.to_string())
    }

    fn known_name(&self, text: &str) -> Option<String> {
        self.known
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.clone())
    }

    fn structural(&self, text: &str) -> Option<String> {
        let candidate = extract_outermost_json_object(text)?;
        let Ok(Value::Object(obj)) = decode(candidate) else {
            return None;
        };
        let key = SIGNATURE_KEYS.iter().find(|k| obj.contains_key(**k))?;
        Some(match *key {
            "literature_review" => ArtifactKind::LiteratureReview.finalize_action().to_string(),
            "direction" => ArtifactKind::Direction.finalize_action().to_string(),
            "idea" => ArtifactKind::Idea.finalize_action().to_string(),
            _ => self.default_search.clone(),
        })
    }
}

fn strict_markers(text: &str) -> Option<String> {
    strict_patterns()
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|c| c.get(1).and_then(|m| clean_candidate(m.as_str())))
        .next()
}

fn line_anchored(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line_pattern().captures(line))
        .filter_map(|c| c.get(1).and_then(|m| clean_candidate(m.as_str())))
        .next()
}

/// 提取参数文本：行首 ARGUMENTS 标记之后到下一个段落标记（或文本末尾），并去掉 ```json 围栏
pub fn extract_arguments(text: &str) -> String {
    // 只认 ACTION 之后的标记；THOUGHT 里恰好以 Arguments: 开头的行不算
    let action_at = action_marker().find(text).map(|m| m.start()).unwrap_or(0);
    let marker = arguments_marker()
        .find_iter(text)
        .find(|m| m.start() >= action_at)
        .or_else(|| arguments_marker().find(text));
    if let Some(m) = marker {
        let rest = &text[m.end()..];
        let end = section_marker()
            .find(rest)
            .map(|s| s.start())
            .unwrap_or(rest.len());
        let body = strip_json_fence(rest[..end].trim()).trim();
        if !body.is_empty() {
            return body.to_string();
        }
    }

    // 无标记：接受带签名键的第一个 JSON 对象
    if let Some(candidate) = extract_outermost_json_object(text) {
        if let Ok(Value::Object(obj)) = decode(candidate) {
            if SIGNATURE_KEYS.iter().any(|k| obj.contains_key(*k)) {
                return candidate.to_string();
            }
        }
    }
    String::new()
}
