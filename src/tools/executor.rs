//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时或失败时转为 LoopSignal::ToolFailed（由反思循环转成反馈，从不中止循环）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::LoopSignal;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将失败映射为可恢复信号
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具；空结果记为 "No results."
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, LoopSignal> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) if content.trim().is_empty() => Ok("No results.".to_string()),
            Ok(Ok(content)) => Ok(content),
            Ok(Err(reason)) => Err(LoopSignal::ToolFailed {
                tool: tool_name.to_string(),
                reason,
            }),
            Err(_) => Err(LoopSignal::ToolFailed {
                tool: tool_name.to_string(),
                reason: format!("timed out after {}s", self.timeout.as_secs_f32()),
            }),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "SearchSlow"
        }
        fn description(&self) -> &str {
            "never answers in time"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "SearchBroken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("HTTP 503".into())
        }
    }

    #[tokio::test]
    async fn test_timeout_and_failure_become_signals() {
        let mut registry = ToolRegistry::new();
        registry.register(Slow);
        registry.register(Broken);
        let executor = ToolExecutor::with_timeout(registry, Duration::from_millis(20));

        match executor.execute("SearchSlow", json!({"query": "q"})).await {
            Err(LoopSignal::ToolFailed { tool, reason }) => {
                assert_eq!(tool, "SearchSlow");
                assert!(reason.contains("timed out"));
            }
            other => panic!("Expected ToolFailed, got {:?}", other),
        }

        let err = executor.execute("SearchBroken", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Error using tool SearchBroken: HTTP 503");
    }
}
