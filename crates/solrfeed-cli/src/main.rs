//! solrfeed - Stream tab-delimited records into Solr collections
//!
//! Reads `name\tvalue\t...` lines from stdin (or a file), batches them and
//! posts each batch to Solr's JSON update handler with a synchronous commit.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use solrfeed_core::{ProgressContext, Verbosity, init_logging};

mod cmd;
mod config;
mod input;

use config::{Config, Overrides, Settings};

#[derive(Parser)]
#[command(name = "solrfeed")]
#[command(about = "Stream tab-delimited records into Solr collections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./solrfeed.toml or ~/.config/solrfeed/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Documents per batch (one HTTP request each)
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Parallel publisher threads (1 = publish in input order)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Request timeout in seconds (default: none)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Connect timeout in seconds (default: none)
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            chunk_size: self.chunk_size,
            workers: self.workers,
            request_timeout: self.timeout,
            connect_timeout: self.connect_timeout,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Index records into a collection
    Index(cmd::index::IndexArgs),
    /// Index relation synonyms, adding a line-number `id` to each record
    Relsyn(cmd::index::RelsynArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug, the spinner shows the running count
    //   non-TTY: info unless --quiet/--debug, logs carry the running count
    let multi = progress.is_tty().then(|| progress.multi());
    let quiet = cli.quiet || (progress.is_tty() && !cli.debug);
    init_logging(Verbosity::from_flags(quiet, cli.debug), multi);

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Command::Index(args) => cmd::index::run(args, &settings, &progress),
        Command::Relsyn(args) => cmd::index::run_relsyn(args, &settings, &progress),
        Command::Config => {
            cmd::show_config(&settings);
            ExitCode::SUCCESS
        }
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.resolve(&cli.overrides())
}
