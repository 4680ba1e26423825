//! # Saransh CLI (`saransh`)
//!
//! Command-line front end for the article pipeline and the agent
//! orchestrator. Every command prints JSON on stdout; logs go to stderr.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `saransh chunk <file>` | Fixed-size chunks of a text file |
//! | `saransh analyze <file>` | Deterministic (or `--ai` enriched) analysis |
//! | `saransh process <file>` | Full article pipeline |
//! | `saransh agents list` | Registered stages as `{name, description}` objects |
//! | `saransh agents run <context.json>` | Run stages over a JSON context |
//!
//! ## Examples
//!
//! ```bash
//! saransh chunk article.txt --max-words 200 --overlap 20
//! saransh --config saransh.toml process article.txt --title "Budget 2025" --url https://example.com/budget
//! saransh --config saransh.toml agents run context.json --stages curation,summarization --stats
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use saransh::agents::{AgentOrchestrator, Context};
use saransh::analyzer::AiAnalyzer;
use saransh::client::ResilientClient;
use saransh::config::{self, Config};
use saransh::deadline::Deadline;
use saransh::logging;
use saransh::models::Article;
use saransh::openai::create_backend;
use saransh::pipeline::ContentPipeline;
use saransh::store::memory::InMemoryVectorStore;
use saransh::store::VectorStore;
use saransh_core::{analysis, chunk};

/// Saransh: news article chunking, analysis, and AI agents.
#[derive(Parser)]
#[command(name = "saransh", version, about = "News article chunking, analysis, and AI agents")]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used when
    /// omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a text file into fixed-size overlapping chunks.
    Chunk {
        file: PathBuf,

        /// Words per chunk. Defaults to `chunking.max_words`.
        #[arg(long)]
        max_words: Option<usize>,

        /// Words shared by consecutive chunks. Defaults to `chunking.overlap_words`.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Compute text metrics for a file.
    Analyze {
        file: PathBuf,

        /// Add model-derived fields (requires a configured llm provider).
        #[arg(long)]
        ai: bool,
    },

    /// Run the full article pipeline on a file.
    Process {
        file: PathBuf,

        #[arg(long)]
        title: String,

        /// Canonical URL; also used as the article id.
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "unknown")]
        source: String,

        /// Stop issuing external calls after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Inspect and run agent stages.
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    /// List registered stages.
    List,

    /// Run stages over a JSON object context.
    Run {
        context: PathBuf,

        /// Comma-separated stage names. Defaults to `agents.default_pipeline`.
        #[arg(long, value_delimiter = ',')]
        stages: Vec<String>,

        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Include per-stage execution counters in the output.
        #[arg(long)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    logging::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Chunk {
            file,
            max_words,
            overlap,
        } => {
            let text = read_text(&file)?;
            let chunks = chunk::chunk_text(
                &text,
                max_words.unwrap_or(cfg.chunking.max_words),
                overlap.unwrap_or(cfg.chunking.overlap_words),
            )?;
            print_json(&chunks)?;
        }
        Commands::Analyze { file, ai } => {
            let text = read_text(&file)?;
            let record = if ai {
                let analyzer = AiAnalyzer::new(build_client(&cfg)?, cfg.analysis.clone());
                analyzer.analyze(&text).await?
            } else {
                analysis::analyze(&text)
            };
            print_json(&record)?;
        }
        Commands::Process {
            file,
            title,
            url,
            source,
            timeout_secs,
        } => {
            let mut article = Article::new(url, title, read_text(&file)?);
            article.source = source;

            let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
            let pipeline = ContentPipeline::new(build_client(&cfg)?, &cfg, Some(store))?;
            let processed = pipeline.process(&article, deadline(timeout_secs)).await;
            print_json(&processed)?;
        }
        Commands::Agents { action } => {
            let orchestrator = AgentOrchestrator::from_config(&build_client(&cfg)?, &cfg);
            match action {
                AgentsAction::List => {
                    let stages: Vec<Value> = orchestrator
                        .registry()
                        .stages()
                        .map(|stage| json!({"name": stage.name(), "description": stage.description()}))
                        .collect();
                    print_json(&stages)?;
                }
                AgentsAction::Run {
                    context,
                    stages,
                    timeout_secs,
                    stats,
                } => {
                    let context = read_context(&context)?;
                    let order = if stages.is_empty() {
                        orchestrator.default_pipeline().to_vec()
                    } else {
                        stages
                    };
                    let run = orchestrator
                        .run_stages(context, &order, deadline(timeout_secs))
                        .await;
                    if stats {
                        print_json(&json!({ "run": run, "stats": orchestrator.get_stats() }))?;
                    } else {
                        print_json(&run)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_client(cfg: &Config) -> Result<ResilientClient> {
    let backend = create_backend(&cfg.llm)?;
    Ok(ResilientClient::from_config(backend, cfg))
}

fn deadline(timeout_secs: Option<u64>) -> Option<Deadline> {
    timeout_secs.map(|s| Deadline::after(Duration::from_secs(s)))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_context(path: &Path) -> Result<Context> {
    let raw = read_text(path)?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
