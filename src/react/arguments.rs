//! 参数解码：把模型给出的参数文本（可能夹在散文或 markdown 里、带常见 JSON 错误）转为 JSON 值
//!
//! 顺序：直接解析 → 去掉 ```json 围栏后解析（含尾逗号修复）→ 用括号配平扫描截取最外层对象再解析（含修复）。
//! 围栏只在直接解析失败后才剥，字符串值里带围栏的合法 JSON 原样解码。
//! 全部失败返回 MalformedArguments，保留原文用于诊断。对合法 JSON 的解码不改变其语义内容。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::LoopSignal;

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").expect("valid regex"))
}

/// 若文本中含 ```json 围栏，返回围栏内部；否则原样返回。以 `{` / `[` 开头的文本视为裸 JSON，不剥
pub fn strip_json_fence(text: &str) -> &str {
    if text.trim_start().starts_with(|c| c == '{' || c == '[') {
        return text;
    }
    json_fence()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// 截取第一个完整的 `{...}`（从第一个 `{` 起，按括号配平；字符串字面量内的括号与转义引号不计）
pub fn extract_outermost_json_object(text: &str) -> Option<&str> {
    extract_balanced(text, '{', '}')
}

/// 截取第一个完整的 `[...]`
pub fn extract_first_json_array(text: &str) -> Option<&str> {
    extract_balanced(text, '[', ']')
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (offset, c) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let end = start + offset + c.len_utf8();
                return Some(&text[start..end]);
            }
        }
    }
    None
}

/// 去掉 `}` / `]` 之前的尾逗号；字符串字面量内的内容不动
pub fn repair_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_with_repair(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(v) => Ok(v),
        Err(e) => {
            let repaired = repair_trailing_commas(text);
            if repaired != text {
                if let Ok(v) = serde_json::from_str(&repaired) {
                    return Ok(v);
                }
            }
            Err(e)
        }
    }
}

/// 解码参数文本
pub fn decode(text: &str) -> Result<Value, LoopSignal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LoopSignal::MalformedArguments {
            raw: text.to_string(),
            reason: "no arguments given".to_string(),
        });
    }
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    let body = strip_json_fence(trimmed).trim();
    let first_err = match parse_with_repair(body) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    // 围栏正则可能停在字符串值里的 ```，此时再对整段文本做配平扫描
    let mut candidates = vec![body];
    if body != trimmed {
        candidates.push(trimmed);
    }
    for source in candidates {
        if let Some(candidate) = extract_outermost_json_object(source) {
            if let Ok(v) = parse_with_repair(candidate) {
                return Ok(v);
            }
        }
    }

    Err(LoopSignal::MalformedArguments {
        raw: text.to_string(),
        reason: first_err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_plain_and_fenced() {
        assert_eq!(decode(r#"{"query": "graph nets"}"#).unwrap(), json!({"query": "graph nets"}));
        let fenced = "```json\n{\"query\": \"graph nets\"}\n```";
        assert_eq!(decode(fenced).unwrap(), json!({"query": "graph nets"}));
    }

    #[test]
    fn test_fence_inside_string_value_kept() {
        let idea = json!({"idea": {"Experiments": "Use config:\n```json\n{\"lr\": 0.1}\n```\nthen sweep."}});
        let raw = serde_json::to_string(&idea).unwrap();
        assert_eq!(decode(&raw).unwrap(), idea);
        assert_eq!(strip_json_fence(&raw), raw);

        // 外层也有围栏时，围栏正则会停在字符串里的 ```，回退到配平扫描
        let fenced = format!("Payload:\n```json\n{raw}\n```");
        assert_eq!(decode(&fenced).unwrap(), idea);
    }

    #[test]
    fn test_trailing_comma_repair_keeps_other_content() {
        let raw = r#"{"idea": {"Title": "a, b,", "Tags": ["x", "y",],},}"#;
        assert_eq!(
            decode(raw).unwrap(),
            json!({"idea": {"Title": "a, b,", "Tags": ["x", "y"]}})
        );
        assert_eq!(repair_trailing_commas(r#"{"t": ",}"}"#), r#"{"t": ",}"}"#);
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let raw = "Sure, here you go: {\"query\": \"sparse attention\",} hope it helps";
        assert_eq!(decode(raw).unwrap(), json!({"query": "sparse attention"}));
    }

    #[test]
    fn test_balanced_scan_ignores_braces_in_strings() {
        let text = r#"prefix {"a": "contains \" and } inside", "b": {"c": 1}} suffix {"z": 2}"#;
        assert_eq!(
            extract_outermost_json_object(text),
            Some(r#"{"a": "contains \" and } inside", "b": {"c": 1}}"#)
        );
        assert_eq!(extract_outermost_json_object("no braces"), None);
        assert_eq!(extract_outermost_json_object("{\"open\": 1"), None);
    }

    #[test]
    fn test_array_extraction() {
        let text = "Here: [{\"Name\": \"a]\"}, [1, 2]] trailing ]";
        assert_eq!(extract_first_json_array(text), Some("[{\"Name\": \"a]\"}, [1, 2]]"));
    }

    #[test]
    fn test_malformed_preserves_raw() {
        match decode("{query: unquoted") {
            Err(LoopSignal::MalformedArguments { raw, .. }) => assert_eq!(raw, "{query: unquoted"),
            other => panic!("Expected MalformedArguments, got {:?}", other),
        }
        assert!(matches!(decode("   "), Err(LoopSignal::MalformedArguments { .. })));
    }
}
