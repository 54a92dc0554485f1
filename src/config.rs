//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `IDEAFORGE__*` 覆盖（双下划线表示嵌套，如 `IDEAFORGE__LLM__PROVIDER=openai`）。
//! 命令行参数最后覆盖（见 main.rs）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub generation: GenerationSection,
    pub pipeline: PipelineSection,
    pub tools: ToolsSection,
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / ollama
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-2024-05-13".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

/// [llm.retry] 段：仅对限流 / 超时 / 5xx 生效
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

/// [generation] 段：创意生成的 attempt / 轮次预算与断点
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    #[serde(default = "default_num_reflections")]
    pub num_reflections: usize,
    /// 每完成 N 个 attempt 写一次断点
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default)]
    pub novelty_scoring: bool,
    /// 评分用模型，未设置时沿用 [llm].model
    pub novelty_model: Option<String>,
    #[serde(default)]
    pub resume: bool,
    /// 替换默认 system 提示
    pub system_prompt_override: Option<String>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            max_generations: default_max_generations(),
            num_reflections: default_num_reflections(),
            checkpoint_interval: default_checkpoint_interval(),
            validate: true,
            novelty_scoring: false,
            novelty_model: None,
            resume: false,
            system_prompt_override: None,
        }
    }
}

fn default_max_generations() -> usize {
    20
}

fn default_num_reflections() -> usize {
    5
}

fn default_checkpoint_interval() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// [pipeline] 段：四阶段流水线
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_literature_reflections")]
    pub literature_reflections: usize,
    #[serde(default = "default_direction_reflections")]
    pub direction_reflections: usize,
    /// 假设数量上限，实际取值夹在 [5, 20]
    #[serde(default = "default_max_hypotheses")]
    pub max_hypotheses: usize,
    #[serde(default = "default_true")]
    pub force_final_round: bool,
    #[serde(default = "default_true")]
    pub degraded_fallback: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            literature_reflections: default_literature_reflections(),
            direction_reflections: default_direction_reflections(),
            max_hypotheses: default_max_hypotheses(),
            force_final_round: true,
            degraded_fallback: true,
        }
    }
}

fn default_literature_reflections() -> usize {
    5
}

fn default_direction_reflections() -> usize {
    3
}

fn default_max_hypotheses() -> usize {
    10
}

/// [tools] 段：工具超时与检索源开关
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub semantic_scholar: bool,
    #[serde(default = "default_true")]
    pub arxiv: bool,
    #[serde(default = "default_true")]
    pub openalex: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// 检索 HTTP 请求超时（秒）
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            semantic_scholar: true,
            arxiv: true,
            openalex: true,
            max_results: default_max_results(),
            search_timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_results() -> usize {
    10
}

fn default_search_timeout_secs() -> u64 {
    15
}

/// 从 config 目录加载配置，环境变量 IDEAFORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 IDEAFORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("IDEAFORGE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_files() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.generation.num_reflections, 5);
        assert_eq!(cfg.generation.checkpoint_interval, 5);
        assert!(cfg.generation.validate);
        assert!(cfg.pipeline.force_final_round);
        assert_eq!(cfg.llm.retry.max_attempts, 8);
        assert!(cfg.tools.arxiv);
    }

    #[test]
    fn test_user_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[generation]\nmax_generations = 3\nnum_reflections = 2\n\n[llm]\nprovider = \"ollama\"\nmodel = \"llama3\""
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.generation.max_generations, 3);
        assert_eq!(cfg.generation.num_reflections, 2);
        assert_eq!(cfg.llm.provider, "ollama");
        // 未出现的键保持默认
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }
}
