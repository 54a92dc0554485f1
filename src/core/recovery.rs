//! 错误恢复引擎
//!
//! 根据 LoopSignal 类型返回 RecoveryAction，供反思循环决定是注入纠正提示重试，还是放弃本次 attempt。

use crate::core::{LoopSignal, RecoveryAction};

/// 恢复时所需的循环上下文
#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext<'a> {
    /// 当前产物类型的终结动作名（如 FinalizeIdea）
    pub finalize_action: &'a str,
    /// 本次 attempt 是否已经用掉了唯一一次解析重试
    pub parse_retried: bool,
}

/// 语义化错误恢复：将信号映射为下一轮反馈文本，或放弃
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, signal: &LoopSignal, ctx: RecoveryContext<'_>) -> RecoveryAction {
        match signal {
            LoopSignal::NoActionFound { .. } if ctx.parse_retried => RecoveryAction::Abandon,
            LoopSignal::NoActionFound { .. } => RecoveryAction::RetryWithPrompt(format!(
                "Your previous response could not be parsed. You must reply with exactly the lines \
                 'ACTION:' and 'ARGUMENTS:' (with the action name and JSON arguments). Try again.\n\n\
                 Expected format:\n\nACTION:\n<action name, e.g. {action}>\n\nARGUMENTS:\n{{ ... JSON ... }}",
                action = ctx.finalize_action
            )),
            LoopSignal::MalformedArguments { reason, .. } => RecoveryAction::RetryWithPrompt(format!(
                "Your ARGUMENTS could not be decoded as JSON ({reason}). \
                 Provide a single valid JSON object after 'ARGUMENTS:' with no trailing commas or comments."
            )),
            LoopSignal::MissingPayload { action, key } => RecoveryAction::RetryWithPrompt(format!(
                "Missing '{key}' key in {action} arguments. \
                 Wrap the payload as {{\"{key}\": {{ ... }}}} and call {action} again."
            )),
            LoopSignal::ValidationFailed { errors } => RecoveryAction::RetryWithPrompt(format!(
                "The artifact you just proposed has validation errors:\n\n{}\n\n\
                 Please fix the issues and finalize again using the {} action. \
                 Make sure all required fields are present and correctly formatted.",
                errors.join("\n"),
                ctx.finalize_action
            )),
            LoopSignal::ToolFailed { .. } => RecoveryAction::RetryWithPrompt(signal.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(parse_retried: bool) -> RecoveryContext<'static> {
        RecoveryContext {
            finalize_action: "FinalizeIdea",
            parse_retried,
        }
    }

    #[test]
    fn test_first_parse_failure_retries_with_format() {
        let engine = RecoveryEngine::new();
        let signal = LoopSignal::NoActionFound {
            len: 5,
            preview: "hello".to_string(),
        };
        match engine.handle(&signal, ctx(false)) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("ACTION:"));
                assert!(msg.contains("ARGUMENTS:"));
                assert!(msg.contains("FinalizeIdea"));
            }
            other => panic!("Expected RetryWithPrompt, got {:?}", other),
        }
    }

    #[test]
    fn test_second_parse_failure_abandons() {
        let engine = RecoveryEngine::new();
        let signal = LoopSignal::NoActionFound {
            len: 0,
            preview: String::new(),
        };
        assert_eq!(engine.handle(&signal, ctx(true)), RecoveryAction::Abandon);
    }

    #[test]
    fn test_validation_errors_listed() {
        let engine = RecoveryEngine::new();
        let signal = LoopSignal::ValidationFailed {
            errors: vec![
                "\"Title\" is a required property".to_string(),
                "\"Abstract\" is a required property".to_string(),
            ],
        };
        match engine.handle(&signal, ctx(true)) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("\"Title\" is a required property"));
                assert!(msg.contains("\"Abstract\" is a required property"));
            }
            other => panic!("Expected RetryWithPrompt, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_failure_becomes_feedback() {
        let engine = RecoveryEngine::new();
        let signal = LoopSignal::ToolFailed {
            tool: "SearchOpenAlex".to_string(),
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(
            engine.handle(&signal, ctx(false)),
            RecoveryAction::RetryWithPrompt("Error using tool SearchOpenAlex: HTTP 503".to_string())
        );
    }
}
