//! 工具层：注册表、执行器（超时 + 审计日志）与文献检索工具

pub mod arxiv;
pub mod executor;
pub mod openalex;
pub mod papers;
pub mod registry;
pub mod schema;
pub mod semantic_scholar;

pub use arxiv::ArxivTool;
pub use executor::ToolExecutor;
pub use openalex::OpenAlexTool;
pub use papers::{format_papers, PaperRecord};
pub use registry::{Tool, ToolRegistry};
pub use schema::{search_arguments_schema, SearchArguments};
pub use semantic_scholar::SemanticScholarTool;

use crate::config::ToolsSection;

/// 按 [tools] 配置创建默认注册表（Semantic Scholar、arXiv、OpenAlex 依次注册）
pub fn create_registry(section: &ToolsSection) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if section.semantic_scholar {
        registry.register(SemanticScholarTool::new(section.search_timeout_secs, section.max_results));
    }
    if section.arxiv {
        registry.register(ArxivTool::new(section.search_timeout_secs, section.max_results));
    }
    if section.openalex {
        registry.register(OpenAlexTool::new(section.search_timeout_secs, section.max_results));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_includes_arxiv() {
        let registry = create_registry(&ToolsSection::default());
        assert_eq!(registry.names(), vec!["SearchSemanticScholar", "SearchArxiv", "SearchOpenAlex"]);

        let section = ToolsSection {
            semantic_scholar: false,
            openalex: false,
            ..ToolsSection::default()
        };
        assert_eq!(create_registry(&section).names(), vec!["SearchArxiv"]);
    }
}
