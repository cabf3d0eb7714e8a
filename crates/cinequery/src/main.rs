//! cinequery - conversational assistant over a movie and series collection.
//!
//! Thin CLI over `cinequery-core`: loads configuration, builds the schema
//! catalog once, then drives single questions or an interactive chat
//! session through the turn engine.

use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cinequery_core::{
    ChatMessage, Config, NullProgress, OpenAiOracle, Oracle, ProgressSink, SchemaCatalog,
    ToolRuntime, Toolbox, TurnEngine, TurnOutcome, TurnPhase,
};

#[derive(Parser)]
#[command(name = "cinequery")]
#[command(about = "Ask questions about a movie and series collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a config file (default: ~/.config/cinequery/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of SQLite sources (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Maximum planning passes per question (overrides the config file)
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Print per-phase progress while a question runs
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        question: String,
    },

    /// Interactive chat session with conversation history
    Chat,

    /// Print the schema catalog as the planner sees it
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.turn.max_iterations = max_iterations;
    }

    let catalog = build_catalog(&config);

    match cli.command {
        Commands::Catalog => {
            println!("{}", catalog.render_for_prompt());
            Ok(())
        }
        Commands::Ask { question } => {
            let engine = build_engine(&config, Arc::clone(&catalog))?;
            let outcome = engine
                .run_turn(&question, Vec::new(), &catalog, progress(cli.verbose).as_ref())
                .await;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Chat => {
            let engine = build_engine(&config, Arc::clone(&catalog))?;
            chat_loop(&engine, &catalog, cli.verbose).await
        }
    }
}

/// A failed catalog build degrades to an unavailable catalog instead of
/// aborting: the other three tools still work without structured sources.
fn build_catalog(config: &Config) -> Arc<SchemaCatalog> {
    let catalog = match SchemaCatalog::build(&config.data_dir, &config.tag_column) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "catalog unavailable, continuing without structured sources");
            SchemaCatalog::unavailable(&config.data_dir, e.to_string())
        }
    };
    Arc::new(catalog)
}

fn build_engine(config: &Config, catalog: Arc<SchemaCatalog>) -> Result<TurnEngine> {
    if config.oracle.api_key.is_empty() {
        anyhow::bail!(
            "no API key configured; set CINEQUERY_API_KEY or OPENAI_API_KEY, or add it to the config file"
        );
    }

    let oracle: Arc<dyn Oracle> = Arc::new(
        OpenAiOracle::new(
            &config.oracle.base_url,
            &config.oracle.chat_model,
            &config.oracle.api_key,
            config.oracle.timeout(),
        )
        .context("failed to build oracle client")?,
    );
    let tools: Arc<dyn ToolRuntime> = Arc::new(
        Toolbox::new(config, catalog).context("failed to build tool adapters")?,
    );

    Ok(TurnEngine::new(oracle, tools, config.turn.max_iterations))
}

fn progress(verbose: bool) -> Box<dyn ProgressSink> {
    if verbose {
        Box::new(CliProgress)
    } else {
        Box::new(NullProgress)
    }
}

struct CliProgress;

impl ProgressSink for CliProgress {
    fn on_phase(&self, phase: &TurnPhase) {
        let line = match phase {
            TurnPhase::Planning { iteration } => format!("planning (pass {})", iteration + 1),
            TurnPhase::Executing { tools } if tools.is_empty() => {
                "executing (no tools selected)".to_string()
            }
            TurnPhase::Executing { tools } => format!("executing: {}", tools.join(", ")),
            TurnPhase::Evaluating { iteration } => format!("evaluating (pass {iteration})"),
            TurnPhase::Synthesizing => "synthesizing answer".to_string(),
            TurnPhase::Done => return,
        };
        eprintln!("{} {}", "·".dimmed(), line.dimmed());
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("{}", outcome.answer);
    if !outcome.sources_used.is_empty() {
        println!(
            "\n{} {}",
            "sources:".dimmed(),
            outcome.sources_used.join(", ").dimmed()
        );
    }
    println!(
        "{} {:.0}% ({} pass{})",
        "confidence:".dimmed(),
        outcome.confidence * 100.0,
        outcome.iterations,
        if outcome.iterations == 1 { "" } else { "es" }
    );
}

async fn chat_loop(
    engine: &TurnEngine,
    catalog: &SchemaCatalog,
    verbose: bool,
) -> Result<()> {
    println!(
        "{}",
        "cinequery chat - ask about the collection (\"exit\" to quit)".bold()
    );

    let stdin = std::io::stdin();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let outcome = engine
            .run_turn(question, history.clone(), catalog, progress(verbose).as_ref())
            .await;
        print_outcome(&outcome);
        println!();

        history.push(ChatMessage::user(question));
        history.push(ChatMessage::assistant(outcome.answer));
    }

    Ok(())
}
