//! 检索结果的统一表示与文本渲染
//!
//! 各检索源把结果转成 PaperRecord，再渲染成带编号的论文块交给模型：
//!
//! ```text
//! 1: Title. Author A, Author B. Venue, 2023.
//! URL: https://...
//! Citations: 42
//! Abstract: ...
//! ```

/// 一篇论文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<i64>,
    pub citations: Option<u64>,
    pub url: Option<String>,
    pub abstract_text: Option<String>,
}

impl PaperRecord {
    pub fn authors_line(&self) -> String {
        if self.authors.is_empty() {
            "Unknown".to_string()
        } else {
            self.authors.join(", ")
        }
    }

    fn render(&self, index: usize) -> String {
        let year = self.year.map(|y| y.to_string()).unwrap_or_else(|| "N/A".to_string());
        let mut block = format!(
            "{}: {}. {}. {}, {}.",
            index,
            self.title,
            self.authors_line(),
            self.venue.as_deref().unwrap_or("Unknown Venue"),
            year
        );
        if let Some(url) = &self.url {
            block.push_str(&format!("\nURL: {}", url));
        }
        if let Some(c) = self.citations {
            block.push_str(&format!("\nCitations: {}", c));
        }
        block.push_str(&format!(
            "\nAbstract: {}",
            self.abstract_text.as_deref().unwrap_or("No abstract available.")
        ));
        block
    }
}

/// 渲染为编号论文块，块之间空一行；空列表返回 None
pub fn format_papers(papers: &[PaperRecord]) -> Option<String> {
    if papers.is_empty() {
        return None;
    }
    Some(
        papers
            .iter()
            .enumerate()
            .map(|(i, p)| p.render(i + 1))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}
