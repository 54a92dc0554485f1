//! Semantic Scholar 检索工具
//!
//! GET /graph/v1/paper/search；若设置了 S2_API_KEY 则带 X-API-KEY 头。结果按引用数降序。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::papers::{format_papers, PaperRecord};
use crate::tools::schema::{search_arguments_schema, SearchArguments};
use crate::tools::Tool;

const S2_SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const S2_FIELDS: &str = "title,authors,venue,year,abstract,citationCount,url";

#[derive(Debug, Deserialize)]
struct S2Response {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    venue: Option<String>,
    year: Option<i64>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    citation_count: Option<u64>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

fn to_records(response: S2Response) -> Vec<PaperRecord> {
    let mut papers: Vec<PaperRecord> = response
        .data
        .into_iter()
        .map(|p| PaperRecord {
            title: p.title.unwrap_or_else(|| "Unknown Title".to_string()),
            authors: p.authors.into_iter().filter_map(|a| a.name).collect(),
            venue: p.venue.filter(|v| !v.is_empty()),
            year: p.year,
            citations: p.citation_count,
            url: p.url,
            abstract_text: p.abstract_text,
        })
        .collect();
    papers.sort_by(|a, b| b.citations.unwrap_or(0).cmp(&a.citations.unwrap_or(0)));
    papers
}

/// SearchSemanticScholar 工具
pub struct SemanticScholarTool {
    client: Client,
    api_key: Option<String>,
    max_results: usize,
}

impl SemanticScholarTool {
    pub fn new(timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("ideaforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        if std::env::var("S2_API_KEY").is_err() {
            tracing::warn!("No S2_API_KEY found; Semantic Scholar requests use the shared rate limit");
        }
        Self {
            client,
            api_key: std::env::var("S2_API_KEY").ok(),
            max_results,
        }
    }
}

#[async_trait]
impl Tool for SemanticScholarTool {
    fn name(&self) -> &str {
        "SearchSemanticScholar"
    }

    fn description(&self) -> &str {
        "Search for relevant literature using Semantic Scholar. Provide a search query to find relevant papers."
    }

    fn parameters_schema(&self) -> Value {
        search_arguments_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args = SearchArguments::from_value(args)?;
        let limit = self.max_results.to_string();
        let mut request = self
            .client
            .get(S2_SEARCH_URL)
            .query(&[("query", args.query.as_str()), ("limit", limit.as_str()), ("fields", S2_FIELDS)]);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let body: S2Response = response.json().await.map_err(|e| e.to_string())?;

        Ok(format_papers(&to_records(body)).unwrap_or_else(|| "No papers found.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_sorted_by_citations() {
        let body: S2Response = serde_json::from_value(serde_json::json!({
            "total": 2,
            "data": [
                {"title": "Low", "authors": [{"name": "A"}], "year": 2020, "citationCount": 3},
                {"title": "High", "authors": [], "venue": "", "citationCount": 90, "abstract": null}
            ]
        }))
        .unwrap();
        let records = to_records(body);
        assert_eq!(records[0].title, "High");
        assert_eq!(records[0].venue, None);
        assert_eq!(records[1].authors, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_query_rejected_before_request() {
        let tool = SemanticScholarTool::new(1, 5);
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("invalid arguments"));
    }
}
