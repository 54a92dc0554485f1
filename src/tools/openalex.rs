//! OpenAlex 检索工具
//!
//! GET https://api.openalex.org/works?search=...；设置 OPENALEX_MAILTO 时进入 polite pool。
//! OpenAlex 的摘要是倒排索引（abstract_inverted_index），这里还原成正文。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::papers::{format_papers, PaperRecord};
use crate::tools::schema::{search_arguments_schema, SearchArguments};
use crate::tools::Tool;

const OPENALEX_URL: &str = "https://api.openalex.org/works";

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i64>,
    doi: Option<String>,
    cited_by_count: Option<u64>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
    primary_location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    display_name: Option<String>,
}

/// 倒排索引还原为摘要文本
fn rebuild_abstract(index: &BTreeMap<String, Vec<usize>>) -> String {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    positioned.sort_by_key(|(p, _)| *p);
    positioned.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
}

fn to_records(response: WorksResponse) -> Vec<PaperRecord> {
    response
        .results
        .into_iter()
        .map(|w| {
            let url = w.doi.or(w.id).map(|u| {
                if u.starts_with("http") {
                    u
                } else {
                    format!("https://openalex.org/{}", u)
                }
            });
            PaperRecord {
                title: w
                    .title
                    .or(w.display_name)
                    .unwrap_or_else(|| "Unknown Title".to_string()),
                authors: w
                    .authorships
                    .into_iter()
                    .filter_map(|a| a.author.and_then(|a| a.display_name))
                    .collect(),
                venue: w
                    .primary_location
                    .and_then(|l| l.source)
                    .and_then(|s| s.display_name)
                    .or_else(|| Some("OpenAlex".to_string())),
                year: w.publication_year,
                citations: w.cited_by_count,
                url,
                abstract_text: w.abstract_inverted_index.as_ref().map(rebuild_abstract),
            }
        })
        .collect()
}

/// SearchOpenAlex 工具
pub struct OpenAlexTool {
    client: Client,
    mailto: Option<String>,
    max_results: usize,
}

impl OpenAlexTool {
    pub fn new(timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("ideaforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            mailto: std::env::var("OPENALEX_MAILTO").ok().filter(|m| !m.is_empty()),
            max_results: max_results.min(25),
        }
    }
}

#[async_trait]
impl Tool for OpenAlexTool {
    fn name(&self) -> &str {
        "SearchOpenAlex"
    }

    fn description(&self) -> &str {
        "Search for relevant literature using OpenAlex. Provide a search query for broad academic coverage with DOI and citations."
    }

    fn parameters_schema(&self) -> Value {
        search_arguments_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args = SearchArguments::from_value(args)?;
        let per_page = self.max_results.to_string();
        let mut params = vec![("search", args.query.as_str()), ("per_page", per_page.as_str())];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.as_str()));
        }

        let response = self
            .client
            .get(OPENALEX_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let body: WorksResponse = response.json().await.map_err(|e| e.to_string())?;

        Ok(format_papers(&to_records(body)).unwrap_or_else(|| "No papers found on OpenAlex.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstract_rebuilt_in_order() {
        let mut index = BTreeMap::new();
        index.insert("world".to_string(), vec![1]);
        index.insert("hello".to_string(), vec![0, 2]);
        assert_eq!(rebuild_abstract(&index), "hello world hello");
    }

    #[test]
    fn test_work_to_record() {
        let body: WorksResponse = serde_json::from_value(serde_json::json!({
            "results": [{
                "id": "W123",
                "display_name": "Graph Transformers",
                "publication_year": 2022,
                "cited_by_count": 7,
                "authorships": [{"author": {"display_name": "Ada"}}, {"author": null}],
                "abstract_inverted_index": {"We": [0], "study": [1]}
            }]
        }))
        .unwrap();
        let records = to_records(body);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.title, "Graph Transformers");
        assert_eq!(r.authors, vec!["Ada".to_string()]);
        assert_eq!(r.url.as_deref(), Some("https://openalex.org/W123"));
        assert_eq!(r.abstract_text.as_deref(), Some("We study"));
        assert_eq!(r.venue.as_deref(), Some("OpenAlex"));
    }
}
