//! arXiv 检索工具
//!
//! GET https://export.arxiv.org/api/query，返回 Atom feed。只取每个 `<entry>` 的
//! title / summary / published / id / author name 几个平铺字段，用正则截取即可。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::tools::papers::{format_papers, PaperRecord};
use crate::tools::schema::{search_arguments_schema, SearchArguments};
use crate::tools::Tool;

const ARXIV_URL: &str = "https://export.arxiv.org/api/query";

fn entry_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").expect("valid regex"))
}

fn author_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<author\b[^>]*>.*?<name>(.*?)</name>").expect("valid regex"))
}

fn field_patterns() -> &'static [(&'static str, Regex)] {
    static RE: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RE.get_or_init(|| {
        ["title", "summary", "published", "id"]
            .into_iter()
            .map(|tag| {
                let re = Regex::new(&format!(r"(?s)<{tag}\b[^>]*>(.*?)</{tag}>")).expect("valid regex");
                (tag, re)
            })
            .collect()
    })
}

/// 反转义 XML 实体并把换行、连续空白压成单个空格
fn clean_text(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn field(entry: &str, tag: &str) -> Option<String> {
    field_patterns()
        .iter()
        .find(|(t, _)| *t == tag)
        .and_then(|(_, re)| re.captures(entry))
        .and_then(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|s| !s.is_empty())
}

/// Atom feed → 论文记录
fn parse_feed(xml: &str) -> Vec<PaperRecord> {
    entry_pattern()
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let entry = m.as_str();
            PaperRecord {
                title: field(entry, "title").unwrap_or_else(|| "Unknown Title".to_string()),
                authors: author_pattern()
                    .captures_iter(entry)
                    .filter_map(|a| a.get(1).map(|n| clean_text(n.as_str())))
                    .filter(|n| !n.is_empty())
                    .collect(),
                venue: Some("arXiv".to_string()),
                year: field(entry, "published").and_then(|p| p.get(..4).and_then(|y| y.parse().ok())),
                citations: None,
                url: field(entry, "id"),
                abstract_text: field(entry, "summary"),
            }
        })
        .collect()
}

/// SearchArxiv 工具
pub struct ArxivTool {
    client: Client,
    max_results: usize,
}

impl ArxivTool {
    pub fn new(timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("ideaforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_results: max_results.min(50),
        }
    }
}

#[async_trait]
impl Tool for ArxivTool {
    fn name(&self) -> &str {
        "SearchArxiv"
    }

    fn description(&self) -> &str {
        "Search for relevant papers on arXiv. Provide a search query to find recent preprints and publications."
    }

    fn parameters_schema(&self) -> Value {
        search_arguments_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args = SearchArguments::from_value(args)?;
        let search_query = format!("all:{}", args.query);
        let max_results = self.max_results.to_string();
        let params = [
            ("search_query", search_query.as_str()),
            ("start", "0"),
            ("max_results", max_results.as_str()),
            ("sortBy", "relevance"),
            ("sortOrder", "descending"),
        ];

        let xml = self
            .client
            .get(ARXIV_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .text()
            .await
            .map_err(|e| e.to_string())?;

        Ok(format_papers(&parse_feed(&xml)).unwrap_or_else(|| "No papers found on arXiv.".to_string()))
    }
}
