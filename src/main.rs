//! Agent Log Tail - stream per-agent JSONL status logs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_log_tail::config::{ConfigLoader, TailConfig};
use agent_log_tail::display;
use agent_log_tail::watcher::{LogDirectory, LogTailWatcher};

#[derive(Parser)]
#[command(
    name = "agent-log-tail",
    about = "Stream status updates appended to per-agent JSONL logs",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that locates a team directory.
#[derive(Args)]
struct Location {
    /// Team whose logs to use.
    #[arg(short, long)]
    team: Option<String>,
    /// Directory holding one subdirectory per team.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Config file to load instead of the default search paths.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Location {
    fn resolve(&self) -> Result<TailConfig, String> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::with_path(path.clone()),
            None => ConfigLoader::new(),
        };
        let mut config = loader.load().map_err(|e| e.to_string())?;
        if let Some(team) = &self.team {
            config.team.clone_from(team);
        }
        if let Some(root) = &self.root {
            config.log_root.clone_from(root);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Tail sources and print every appended status line until Ctrl-C.
    Watch {
        #[command(flatten)]
        location: Location,
        /// Also watch every source that already has a log.
        #[arg(long)]
        all: bool,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
        /// Print payloads without truncation.
        #[arg(long)]
        raw: bool,
        /// Source (agent) names to watch.
        sources: Vec<String>,
    },
    /// Print the log path for a source.
    Path {
        #[command(flatten)]
        location: Location,
        /// Source (agent) name.
        source: String,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Watch {
            location,
            all,
            json,
            raw,
            sources,
        } => run_watch(&location, all, json, raw, sources).await,
        Commands::Path { location, source } => run_path(&location, &source),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_path(location: &Location, source: &str) -> Result<(), String> {
    let config = location.resolve()?;
    let directory =
        LogDirectory::for_team(&config.log_root, &config.team).map_err(|e| e.to_string())?;
    let path = directory.source_path(source).map_err(|e| e.to_string())?;
    println!("{}", path.display());
    Ok(())
}

async fn run_watch(
    location: &Location,
    all: bool,
    json: bool,
    raw: bool,
    mut sources: Vec<String>,
) -> Result<(), String> {
    let config = location.resolve()?;
    let watcher = LogTailWatcher::from_config(&config).map_err(|e| e.to_string())?;
    watcher.ensure_storage_ready().map_err(|e| e.to_string())?;

    if all {
        sources.extend(watcher.directory().discover_sources());
    }
    sources.sort();
    sources.dedup();
    if sources.is_empty() {
        return Err("no sources given (name some, or pass --all)".to_string());
    }

    let mut updates = watcher.subscribe_updates();
    let mut errors = watcher.subscribe_errors();

    for source in &sources {
        watcher.start_watching(source);
    }
    tracing::info!(
        team = %config.team,
        path = %watcher.directory().path().display(),
        sources = ?watcher.watched_sources(),
        "Watching source logs"
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
        }
        shutdown.cancel();
    });

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            update = updates.recv() => match update {
                Ok(event) if json => display::print_json(&event),
                Ok(event) => display::print_update(&event, raw),
                Err(RecvError::Lagged(skipped)) => display::print_lagged("update", skipped),
                Err(RecvError::Closed) => break,
            },

            error = errors.recv() => match error {
                Ok(event) if json => display::print_json(&event),
                Ok(event) => display::print_error_event(&event),
                Err(RecvError::Lagged(skipped)) => display::print_lagged("error", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    watcher.stop();
    Ok(())
}
