//! Corpus-Tally main entry point
//!
//! Loads the configuration, starts the pipeline and reads shell commands from
//! stdin until `stop`, end of input or Ctrl-C.

use anyhow::{bail, Context};
use clap::Parser;
use corpus_tally::config::{load_config_with_hash, Config};
use corpus_tally::shell::{execute, parse_line, Outcome};
use corpus_tally::App;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./config.properties", "./config.toml"];

/// Corpus-Tally: concurrent keyword counting over directories and web pages
#[derive(Parser, Debug)]
#[command(name = "corpus-tally")]
#[command(version)]
#[command(about = "Counts keywords across directory and web corpora", long_about = None)]
struct Cli {
    /// Path to a TOML or .properties configuration file
    /// (default: ./config.properties, then ./config.toml)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load(cli.config.as_deref())?;
    let app = App::new(config).context("Failed to build the pipeline")?;
    app.start().await;

    let result = shell(&app).await;
    app.stop().await;
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence over the flags when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("corpus_tally=info,warn"),
                1 => EnvFilter::new("corpus_tally=debug,info"),
                2 => EnvFilter::new("corpus_tally=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the explicit config, or the first default one that loads
fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
    };

    for path in &candidates {
        tracing::info!("Loading configuration from: {}", path.display());
        match load_config_with_hash(path) {
            Ok((config, hash)) => {
                tracing::info!("Configuration loaded successfully (hash: {})", hash);
                return Ok(config);
            }
            Err(e) => tracing::error!("Failed to load {}: {}", path.display(), e),
        }
    }

    bail!("no usable configuration (tried {:?})", candidates)
}

async fn shell(app: &App) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e.render());
                continue;
            }
        };

        // `get` blocks until its corpus completes, so Ctrl-C must still get through
        let outcome = tokio::select! {
            outcome = execute(app, command) => outcome,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
        };
        match outcome {
            Ok(Outcome::Continue(message)) => println!("{}", message),
            Ok(Outcome::Exit) => return Ok(()),
            Err(e) => println!("error: {}", e),
        }
    }
}
