// askdb - Command-Line Entry Point

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use askdb::commands::{run_command, ReplCommand};
use askdb::models::settings::{EmbeddingProviderKind, SettingsUpdate};
use askdb::state::AppState;
use askdb::storage::config::ConfigService;

/// Ask questions about a database in plain language
#[derive(Parser, Debug)]
#[command(name = "askdb", version)]
#[command(about = "Conversational natural-language querying over a relational database")]
struct Cli {
    /// Config file (default: ~/.askdb/config.json)
    #[arg(long, env = "ASKDB_CONFIG")]
    config: Option<PathBuf>,

    /// Chat model used for every call
    #[arg(long)]
    model: Option<String>,

    /// Query a local SQLite file instead of PostgreSQL
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Reference text appended to the system prompt
    #[arg(long)]
    reference_file: Option<PathBuf>,

    /// Where the reference index is stored
    #[arg(long)]
    vector_dir: Option<PathBuf>,

    /// Embedding provider for the reference index (tfidf or openai)
    #[arg(long)]
    embedding: Option<EmbeddingProviderKind>,

    /// Whole-turn deadline in seconds
    #[arg(long)]
    turn_timeout: Option<u64>,

    /// Log file for tracing output
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn settings_update(&self) -> SettingsUpdate {
        SettingsUpdate {
            model: self.model.clone(),
            reference_file: self.reference_file.clone(),
            vector_dir: self.vector_dir.clone(),
            embedding_provider: self.embedding,
            turn_timeout_secs: self.turn_timeout,
            log_file: self.log_file.clone(),
            sqlite_path: self.sqlite.clone(),
            ..Default::default()
        }
    }
}

fn init_logging(path: &std::path::Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let service = match &cli.config {
        Some(path) => ConfigService::open(path),
        None => ConfigService::new(),
    }
    .context("failed to load configuration")?;

    // Flags override the file for this run only
    let mut config = service.get_config_clone();
    config.apply_update(cli.settings_update());
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    init_logging(&config.log_file)?;
    tracing::info!(
        config = %service.path().display(),
        model = %config.model,
        "askdb starting"
    );

    let mut state = AppState::initialize(config)
        .await
        .context("failed to start session")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("askdb {}", env!("CARGO_PKG_VERSION"));
    println!("Type a question, or :help for commands.");

    loop {
        println!("{}", state.banner());
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match run_command(&mut state, ReplCommand::parse(&line)).await {
            Some(output) if output.is_empty() => {}
            Some(output) => println!("{}\n", output),
            None => break,
        }
    }

    tracing::info!(
        session = %state.session().id(),
        tokens = state.session().total_tokens(),
        "askdb exiting"
    );
    Ok(())
}
