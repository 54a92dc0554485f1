//! Ideaforge - Rust 科研创意生成器
//!
//! 入口：解析命令行、加载配置、初始化日志，然后运行创意生成、完整流水线、单个阶段或假设扩展。
//! 产物路径打印到 stdout，日志写 stderr。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use ideaforge::config::{load_config, AppConfig};
use ideaforge::core::{AgentError, GenerationOrchestrator, LlmNoveltyScorer, OrchestratorSettings};
use ideaforge::llm::{create_client, LlmClient, UsageLedger};
use ideaforge::memory::write_json_atomic;
use ideaforge::pipeline::{
    artifact_path, expand_hypotheses, read_json, read_text, stem_of, write_phase, ExpansionSource, PipelineSettings,
    ResearchPipeline,
};
use ideaforge::react::ArtifactKind;
use ideaforge::tools::{create_registry, ToolExecutor};
use ideaforge::validation::SchemaValidator;

#[derive(Parser)]
#[command(name = "ideaforge")]
#[command(about = "Research idea generator with reflection rounds, literature search and resumable runs", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (TOML), layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model identifier, overrides [llm].model
    #[arg(short, long, global = true, env = "IDEAFORGE_MODEL")]
    model: Option<String>,

    /// Skip schema validation of finalized artifacts
    #[arg(long, global = true)]
    no_validate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OutputDir {
    /// Directory for phase artifacts
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Explicit output file (overrides --output-dir)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate research ideas from a topic file
    Ideas {
        /// Markdown file describing the research topic
        topic: PathBuf,

        /// Output JSON file (default: topic path with .json extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of idea attempts
        #[arg(long)]
        max_generations: Option<usize>,

        /// Reflection rounds per attempt
        #[arg(long)]
        num_reflections: Option<usize>,

        /// Resume from <output>.checkpoint.json
        #[arg(long)]
        resume: bool,

        /// Score each finalized idea for novelty
        #[arg(long)]
        novelty: bool,

        /// Model used for novelty scoring (default: main model)
        #[arg(long)]
        novelty_model: Option<String>,
    },

    /// Run all four research phases
    Pipeline {
        topic: PathBuf,

        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        /// Reflection rounds for the literature review phase
        #[arg(long)]
        num_reflections: Option<usize>,
    },

    /// Phase 1: literature review
    LitReview {
        topic: PathBuf,

        #[command(flatten)]
        out: OutputDir,

        #[arg(long)]
        num_reflections: Option<usize>,
    },

    /// Phase 2: gaps and hypotheses from a literature review
    Hypotheses {
        lit_review: PathBuf,

        #[command(flatten)]
        out: OutputDir,
    },

    /// Phase 3: choose a direction from a literature review and hypotheses
    Direction {
        lit_review: PathBuf,
        hypotheses: PathBuf,

        /// Preferred hypothesis name
        #[arg(long)]
        prefer: Option<String>,

        #[command(flatten)]
        out: OutputDir,

        #[arg(long)]
        num_reflections: Option<usize>,
    },

    /// Phase 4: experiment plan for a direction
    ExperimentPlan {
        direction: PathBuf,

        #[command(flatten)]
        out: OutputDir,
    },

    /// Expand a topic or an idea into sub-hypotheses
    Expand {
        /// Topic file to expand
        #[arg(long, conflicts_with = "idea", required_unless_present = "idea")]
        topic: Option<PathBuf>,

        /// Ideas JSON file (array) or single idea object
        #[arg(long)]
        idea: Option<PathBuf>,

        /// Which idea of the array to expand
        #[arg(long, default_value = "0")]
        index: usize,

        /// Maximum sub-hypotheses (clamped to 5-20)
        #[arg(long, default_value = "10")]
        max: usize,

        /// Write the list here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl OutputDir {
    fn resolve(&self, input: &Path, input_kind: ArtifactKind, kind: ArtifactKind) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| artifact_path(&self.output_dir, &stem_of(input, input_kind), kind))
    }
}

fn topic_stem(topic: &Path) -> String {
    topic
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "topic".to_string())
}

fn build_executor(cfg: &AppConfig) -> ToolExecutor {
    ToolExecutor::new(create_registry(&cfg.tools), cfg.tools.tool_timeout_secs)
}

fn build_pipeline(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> anyhow::Result<ResearchPipeline> {
    let pipeline = ResearchPipeline::new(llm, build_executor(cfg), PipelineSettings::from(&cfg.pipeline));
    Ok(if cfg.generation.validate {
        pipeline.with_validator(SchemaValidator::new()?)
    } else {
        pipeline
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    if let Some(model) = &cli.model {
        cfg.llm.model = model.clone();
    }
    if cli.no_validate {
        cfg.generation.validate = false;
    }

    match cli.command {
        Commands::Ideas {
            topic,
            output,
            max_generations,
            num_reflections,
            resume,
            novelty,
            novelty_model,
        } => {
            let topic_text = read_text(&topic)?;
            tracing::info!(path = %topic.display(), chars = topic_text.len(), "Loaded topic");
            let output = output.unwrap_or_else(|| topic.with_extension("json"));

            if let Some(n) = max_generations {
                cfg.generation.max_generations = n;
            }
            if let Some(n) = num_reflections {
                cfg.generation.num_reflections = n;
            }
            cfg.generation.resume |= resume;
            cfg.generation.novelty_scoring |= novelty;
            if novelty_model.is_some() {
                cfg.generation.novelty_model = novelty_model;
            }

            let llm = create_client(&cfg.llm, None)?;
            let mut orchestrator =
                GenerationOrchestrator::new(llm, build_executor(&cfg), OrchestratorSettings::from(&cfg.generation));
            if cfg.generation.validate {
                orchestrator = orchestrator.with_validator(SchemaValidator::new()?);
            }
            if cfg.generation.novelty_scoring {
                let judge = create_client(&cfg.llm, cfg.generation.novelty_model.as_deref())?;
                orchestrator = orchestrator.with_scorer(Box::new(LlmNoveltyScorer::new(judge)));
            }

            let report = orchestrator
                .run(&topic_text, &output)
                .await
                .context("Idea generation failed")?;
            println!("{}", output.display());
            tracing::info!(ideas = report.archive.len(), cost_usd = report.usage.total_cost(), "Done");
        }

        Commands::Pipeline {
            topic,
            output_dir,
            num_reflections,
        } => {
            let topic_text = read_text(&topic)?;
            if let Some(n) = num_reflections {
                cfg.pipeline.literature_reflections = n;
            }
            let pipeline = build_pipeline(&cfg, create_client(&cfg.llm, None)?)?;
            let paths = pipeline
                .run_full(&topic_text, &topic_stem(&topic), &output_dir)
                .await
                .context("Research pipeline failed")?;
            for path in [&paths.literature_review, &paths.hypotheses, &paths.direction, &paths.experiment_plan] {
                println!("{}", path.display());
            }
        }

        Commands::LitReview {
            topic,
            out,
            num_reflections,
        } => {
            let topic_text = read_text(&topic)?;
            if let Some(n) = num_reflections {
                cfg.pipeline.literature_reflections = n;
            }
            let output = out
                .output
                .clone()
                .unwrap_or_else(|| artifact_path(&out.output_dir, &topic_stem(&topic), ArtifactKind::LiteratureReview));
            let pipeline = build_pipeline(&cfg, create_client(&cfg.llm, None)?)?;
            let phase = pipeline.literature_review(&topic_text).await?;
            finish_phase(&output, &phase)?;
        }

        Commands::Hypotheses { lit_review, out } => {
            let review = read_json(&lit_review)?;
            let output = out.resolve(&lit_review, ArtifactKind::LiteratureReview, ArtifactKind::Hypotheses);
            let pipeline = build_pipeline(&cfg, create_client(&cfg.llm, None)?)?;
            let phase = pipeline.hypotheses(&review).await?;
            finish_phase(&output, &phase)?;
        }

        Commands::Direction {
            lit_review,
            hypotheses,
            prefer,
            out,
            num_reflections,
        } => {
            let review = read_json(&lit_review)?;
            let hyps = read_json(&hypotheses)?;
            if let Some(n) = num_reflections {
                cfg.pipeline.direction_reflections = n;
            }
            let output = out.resolve(&hypotheses, ArtifactKind::Hypotheses, ArtifactKind::Direction);
            let pipeline = build_pipeline(&cfg, create_client(&cfg.llm, None)?)?;
            let phase = pipeline.direction(&review, &hyps, prefer.as_deref()).await?;
            finish_phase(&output, &phase)?;
        }

        Commands::ExperimentPlan { direction, out } => {
            let proposal = read_json(&direction)?;
            let output = out.resolve(&direction, ArtifactKind::Direction, ArtifactKind::ExperimentPlan);
            let pipeline = build_pipeline(&cfg, create_client(&cfg.llm, None)?)?;
            let phase = pipeline.experiment_plan(&proposal).await?;
            finish_phase(&output, &phase)?;
        }

        Commands::Expand {
            topic,
            idea,
            index,
            max,
            output,
        } => {
            let llm = create_client(&cfg.llm, None)?;
            let mut usage = UsageLedger::new();
            let items = match (topic, idea) {
                (Some(topic), _) => {
                    let text = read_text(&topic)?;
                    expand_hypotheses(llm.as_ref(), ExpansionSource::Topic(&text), max, &mut usage).await?
                }
                (None, Some(idea_path)) => {
                    let ideas = read_json(&idea_path)?;
                    let idea = match &ideas {
                        Value::Array(list) => list
                            .get(index)
                            .cloned()
                            .with_context(|| format!("{} has no idea at index {}", idea_path.display(), index))?,
                        other => other.clone(),
                    };
                    expand_hypotheses(llm.as_ref(), ExpansionSource::Idea(&idea), max, &mut usage).await?
                }
                (None, None) => anyhow::bail!("either --topic or --idea is required"),
            };
            usage.log_summary();
            match output {
                Some(path) => {
                    write_json_atomic(&path, &items)?;
                    println!("{}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&items)?),
            }
        }
    }
    Ok(())
}

fn finish_phase(output: &Path, phase: &ideaforge::pipeline::PhaseOutput) -> anyhow::Result<()> {
    let mut usage = UsageLedger::new();
    write_phase(output, phase, &mut usage)?;
    usage.log_summary();
    println!("{}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    ideaforge::observability::init(cli.verbose);

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<AgentError>() {
            Some(AgentError::MissingInput(path)) => {
                eprintln!("Error: input file not found: {}", path.display());
                std::process::exit(1);
            }
            _ => Err(e),
        },
    }
}
