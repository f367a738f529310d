//! agstream - agent protocol stream tool.
//!
//! Replays captured SSE responses through a real agent session offline, or
//! decodes them event by event.

mod replay;

use agstream_util::log::{self, LogConfig, LogLevel};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agstream")]
#[command(author, version, about = "Replay and inspect agent protocol event streams", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also append logs to the default log file
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a captured SSE stream through an agent session
    Replay {
        /// Captured response body
        file: PathBuf,
        /// Bytes per chunk handed to the framer
        #[arg(long, default_value_t = replay::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Agent config file (JSONC)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Frame and decode a captured SSE stream, one line per event
    Decode {
        /// Captured response body
        file: PathBuf,
    },
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = match cli.log_level.as_deref() {
        Some(name) => LogLevel::parse(name)
            .ok_or_else(|| anyhow::anyhow!("unknown log level: {name}"))?,
        None if cli.verbose => LogLevel::Debug,
        None => LogLevel::Warn,
    };

    let config = LogConfig {
        print: true,
        level,
        include_location: cli.verbose,
        file: cli.log_file.then(log::default_log_path).flatten(),
    };
    log::init(&config)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::Replay {
            file,
            chunk_size,
            config,
            json,
        } => replay::run_replay(&file, chunk_size, config.as_deref(), json).await,
        Commands::Decode { file } => replay::run_decode(&file).await,
    }
}
