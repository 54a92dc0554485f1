//! 检索工具参数的 JSON Schema（schemars 自动生成）
//!
//! 生成的 schema 通过 Tool::parameters_schema 拼入 system prompt，减少模型输出格式错误；
//! 同一结构也用于反序列化模型给出的参数。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// 检索工具参数：`{"query": "..."}`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchArguments {
    /// 检索关键词或自然语言查询
    pub query: String,
}

impl SearchArguments {
    /// 从模型参数解析；缺少 query 或为空时返回错误文本
    pub fn from_value(args: Value) -> Result<Self, String> {
        let parsed: SearchArguments =
            serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))?;
        if parsed.query.trim().is_empty() {
            return Err("empty query".to_string());
        }
        Ok(parsed)
    }
}

pub fn search_arguments_schema() -> Value {
    serde_json::to_value(schema_for!(SearchArguments)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_requires_query() {
        let schema = search_arguments_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["query"]["type"], "string");
    }

    #[test]
    fn test_from_value() {
        assert_eq!(
            SearchArguments::from_value(json!({"query": "llm agents"})).unwrap().query,
            "llm agents"
        );
        assert!(SearchArguments::from_value(json!({"q": "x"})).is_err());
        assert!(SearchArguments::from_value(json!({"query": "  "})).is_err());
    }
}
