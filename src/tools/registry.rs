//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按注册顺序保存与查找。
//! 注册顺序有意义：提示词中的工具列表按此顺序展示，第一个工具也是 `{"query": ...}` 推断时的默认检索动作。
//! 终结动作（FinalizeIdea 等）不在注册表中，由反思循环单独处理。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称，即模型在 ACTION 中使用的动作名
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认返回空对象，表示参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；失败返回错误文本（会作为下一轮反馈交给模型）
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按注册顺序存储 Arc<dyn Tool>；同名重复注册时替换原工具并保留位置
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 生成提示词中的工具说明段：每个工具一段，含参数 schema
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| {
                let schema = serde_json::to_string(&t.parameters_schema()).unwrap_or_default();
                format!("- **{}**: {}\n  Arguments schema: {}", t.name(), t.description(), schema)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(self.1.to_string())
        }
    }

    #[tokio::test]
    async fn test_order_preserved_and_replace_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("SearchOpenAlex", "v1"));
        registry.register(Named("SearchSemanticScholar", "s2"));
        registry.register(Named("SearchOpenAlex", "v2"));

        assert_eq!(registry.names(), vec!["SearchOpenAlex", "SearchSemanticScholar"]);
        assert_eq!(
            registry.execute("SearchOpenAlex", Value::Null).await.unwrap(),
            "v2"
        );
        assert!(registry.execute("Nope", Value::Null).await.is_err());
    }

    #[test]
    fn test_describe_lists_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("SearchOpenAlex", ""));
        let text = registry.describe();
        assert!(text.contains("**SearchOpenAlex**: test tool"));
        assert!(text.contains("\"type\":\"object\""));
    }
}
