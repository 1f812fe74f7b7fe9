//! CLI command definitions for exercise-forge.
//!
//! `generate` wires the configured model, syntax checker and history store
//! into a [`GenerationOrchestrator`] and prints the outcome as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::config::ForgeConfig;
use crate::exercise::{GenerationOrchestrator, PromptBuilder, Topic};
use crate::history::{HistoryStore, InMemoryHistoryStore, SqliteHistoryStore};

/// Programming exercise generator backed by an LLM.
#[derive(Parser)]
#[command(name = "exercise-forge")]
#[command(about = "Generate validated Python programming exercises with an LLM")]
#[command(version)]
#[command(
    long_about = "exercise-forge asks a language model for a Python exercise on a topic, checks the code's syntax and imports without running it, and retries until a valid exercise comes back.\n\nExample usage:\n  exercise-forge generate --topic Correlation --context \"exam scores\" --user-id alice"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate one exercise.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// List the topics with dedicated prompt clauses.
    Topics,
}

/// Arguments for the generate command.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Topic key or label (e.g. "Correlation", "nmi"); free text is accepted.
    #[arg(short, long)]
    pub topic: String,

    /// Context the exercise should be set in (e.g. "exam scores").
    #[arg(short, long)]
    pub context: String,

    /// User whose chat history seeds the conversation and receives the result.
    #[arg(short, long)]
    pub user_id: Option<String>,

    /// Model provider: gemini or litellm.
    #[arg(long, env = "FORGE_PROVIDER")]
    pub provider: Option<String>,

    /// Maximum attempts before giving up (0 = unbounded).
    #[arg(long, env = "FORGE_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// SQLite database for chat history.
    #[arg(long, env = "FORGE_HISTORY_DB")]
    pub history_db: Option<PathBuf>,

    /// Seed for prompt phrasing choices.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Topics => {
            print!("{}", topics_listing());
            Ok(())
        }
    }
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = ForgeConfig::from_env()?;
    if let Some(provider) = &args.provider {
        config.provider = provider.parse()?;
    }
    if let Some(max_attempts) = args.max_attempts {
        config = config.with_max_attempts(max_attempts);
    }
    if let Some(path) = args.history_db.clone() {
        config = config.with_history_db(path);
    }

    let llm = config.build_provider()?;

    let validator = config.syntax_validator();
    if !validator.is_available().await {
        anyhow::bail!(
            "Python interpreter '{}' is not available; set FORGE_PYTHON",
            validator.interpreter().display()
        );
    }

    let history: Arc<dyn HistoryStore> = match &config.history_db {
        Some(path) => Arc::new(SqliteHistoryStore::open(&path.to_string_lossy()).await?),
        None => Arc::new(InMemoryHistoryStore::new()),
    };

    let mut orchestrator = GenerationOrchestrator::new(
        llm,
        Arc::new(validator),
        history,
        config.orchestrator_config(),
    );
    if let Some(seed) = args.seed {
        orchestrator = orchestrator.with_prompt_builder(PromptBuilder::new().with_seed(seed));
    }

    let topic = Topic::parse(&args.topic);
    info!(
        provider = %config.provider,
        topic = %topic,
        max_attempts = ?config.max_attempts,
        "Starting generation"
    );

    let outcome = orchestrator
        .generate(&topic, &args.context, args.user_id.as_deref())
        .await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        anyhow::bail!("{}", outcome.message);
    }
    Ok(())
}

fn topics_listing() -> String {
    Topic::all()
        .iter()
        .map(|t| format!("{:<18} {}\n", t.key(), t.label()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_command_args() {
        let args = vec![
            "exercise-forge",
            "generate",
            "--topic",
            "Correlation",
            "--context",
            "exam scores",
            "--user-id",
            "alice",
            "--max-attempts",
            "3",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.topic, "Correlation");
                assert_eq!(args.context, "exam scores");
                assert_eq!(args.user_id.as_deref(), Some("alice"));
                assert_eq!(args.max_attempts, Some(3));
                assert!(args.seed.is_none());
            }
            _ => panic!("Expected Generate command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_generate_requires_topic_and_context() {
        assert!(Cli::try_parse_from(["exercise-forge", "generate", "--topic", "NMI"]).is_err());
        assert!(Cli::try_parse_from(["exercise-forge", "gen", "-t", "NMI", "-c", "genes"]).is_ok());
    }

    #[test]
    fn test_topics_command() {
        let cli = Cli::try_parse_from(["exercise-forge", "topics", "--log-level", "debug"])
            .expect("should parse");
        assert!(matches!(cli.command, Commands::Topics));
        assert_eq!(cli.log_level, "debug");

        let listing = topics_listing();
        assert_eq!(listing.lines().count(), Topic::all().len());
        assert!(listing.contains("NMI (Normalised Mutual Information)"));
    }
}
