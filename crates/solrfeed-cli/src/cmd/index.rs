//! Index subcommands - stream tab-delimited records into a Solr collection

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::Args;
use solrfeed_core::{
    INTERRUPTED_EXIT_CODE, SharedProgress, fmt_count, install_signal_handlers, shutdown_flag,
};
use solrfeed_index::pipeline::Decorator;
use solrfeed_index::{CollectionTarget, Pipeline, PipelineError, SolrPublisher, with_sequence_id};

use crate::config::Settings;
use crate::input::open_input;

/// Exit status when the pipeline fails
const EXIT_FAILURE: u8 = 1;
/// Exit status when input or client setup fails
const EXIT_USAGE: u8 = 2;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Solr host
    pub host: String,

    /// Solr port
    pub port: u16,

    /// Target collection
    pub collection: String,

    /// Read records from this file instead of stdin (.gz is decompressed)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RelsynArgs {
    /// Solr host
    pub host: String,

    /// Solr port
    pub port: u16,

    /// Read records from this file instead of stdin (.gz is decompressed)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

/// Index records as-is into the named collection.
pub fn run(args: IndexArgs, settings: &Settings, progress: &SharedProgress) -> ExitCode {
    let target = CollectionTarget::new(args.host, args.port, args.collection);
    execute(target, args.input, None, settings, progress)
}

/// Index records into the relsyn collection, keyed by line number.
pub fn run_relsyn(args: RelsynArgs, settings: &Settings, progress: &SharedProgress) -> ExitCode {
    let target = CollectionTarget::new(args.host, args.port, settings.relsyn_collection.clone());
    execute(
        target,
        args.input,
        Some(&with_sequence_id),
        settings,
        progress,
    )
}

fn execute(
    target: CollectionTarget,
    input: Option<PathBuf>,
    decorate: Option<Decorator<'_>>,
    settings: &Settings,
    progress: &SharedProgress,
) -> ExitCode {
    if let Err(e) = install_signal_handlers() {
        log::warn!("Cannot install signal handlers: {e}");
    }
    ExitCode::from(index(
        target,
        input,
        decorate,
        settings,
        progress,
        shutdown_flag(),
    ))
}

/// Index `input` into `target`, stopping between batches once `stop` is set.
/// Returns the process exit status.
fn index(
    target: CollectionTarget,
    input: Option<PathBuf>,
    decorate: Option<Decorator<'_>>,
    settings: &Settings,
    progress: &SharedProgress,
    stop: &AtomicBool,
) -> u8 {
    let reader = match open_input(input.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e:#}");
            return EXIT_USAGE;
        }
    };

    let label = target.to_string();
    let publisher = match SolrPublisher::new(target, &settings.http) {
        Ok(p) => p,
        Err(e) => {
            log::error!("{e}");
            return EXIT_USAGE;
        }
    };

    log::info!(
        "Indexing into {label}: chunk_size={}, workers={}",
        settings.pipeline.chunk_size,
        settings.pipeline.workers
    );

    let pb = progress.counter_line("index");
    pb.set_message(label);

    let mut pipeline = Pipeline::new(&publisher, settings.pipeline)
        .progress(pb.clone())
        .stop_flag(stop);
    if let Some(decorate) = decorate {
        pipeline = pipeline.decorate(decorate);
    }

    match pipeline.run(reader) {
        Ok(summary) => {
            if progress.is_tty() {
                progress.println(format!(
                    "Indexed {} documents in {} batches ({:.1}s)",
                    fmt_count(summary.documents),
                    fmt_count(summary.batches),
                    summary.elapsed.as_secs_f64()
                ));
            } else {
                summary.log();
            }
            0
        }
        Err(PipelineError::Interrupted) => {
            pb.abandon();
            log::warn!(
                "Interrupted; {} documents already indexed remain in the collection",
                fmt_count(pb.position())
            );
            INTERRUPTED_EXIT_CODE
        }
        Err(e) => {
            pb.abandon();
            log::error!("Indexing failed: {e}");
            log::error!(
                "{} documents from earlier batches remain in the collection",
                fmt_count(pb.position())
            );
            EXIT_FAILURE
        }
    }
}
