//! rustpfa command-line interface.
//!
//! Reads events as JSON, runs the particle flow reconstruction chain and
//! writes one summary per event.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::{info, warn};
use rustpfa_algorithms::{reconstruct_events, PfaSettings, ReconstructionSummary};
use rustpfa_core::{DetectorGeometry, Event, EventRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reconstruction error: {0}")]
    Core(#[from] rustpfa_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Particle flow calorimeter clustering and track association.
#[derive(Parser)]
#[command(name = "rustpfa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct the events of a JSON file
    Process {
        /// Input JSON file holding an array of events
        input: PathBuf,

        /// Detector geometry JSON file
        #[arg(short, long)]
        geometry: PathBuf,

        /// Algorithm settings JSON file; defaults are used when absent
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Output JSON file; stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of worker threads (0 lets rayon decide)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about an event file
    Info {
        /// Input JSON file holding an array of events
        input: PathBuf,
    },

    /// Print the default algorithm settings as JSON
    Defaults,
}

/// Per-event entry of the output file.
#[derive(Debug, Serialize)]
struct EventOutput {
    event: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ReconstructionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Runs the chain over an event file and returns the per-event outputs.
///
/// Configuration errors abort the run; any other failure is recorded for
/// its event only.
fn process(
    input: &Path,
    geometry: &Path,
    settings: Option<&Path>,
    verbose: bool,
) -> Result<Vec<EventOutput>> {
    let records: Vec<EventRecord> = read_json(input)?;
    let geometry: DetectorGeometry = read_json(geometry)?;
    let settings: PfaSettings = match settings {
        Some(path) => read_json(path)?,
        None => PfaSettings::default(),
    };
    settings.validate()?;

    if verbose {
        eprintln!("Processing {} event(s) from {}", records.len(), input.display());
    }

    let start = Instant::now();
    let results = reconstruct_events(&records, &geometry, &settings);

    let mut outputs = Vec::with_capacity(results.len());
    for (event, result) in results.into_iter().enumerate() {
        match result {
            Ok(summary) => outputs.push(EventOutput {
                event,
                summary: Some(summary),
                error: None,
            }),
            Err(err) if err.is_configuration() => return Err(err.into()),
            Err(err) => outputs.push(EventOutput {
                event,
                summary: None,
                error: Some(err.to_string()),
            }),
        }
    }

    let n_failed = outputs.iter().filter(|o| o.error.is_some()).count();
    if n_failed > 0 {
        warn!("{} of {} events failed", n_failed, outputs.len());
    }
    let n_clusters: usize = outputs
        .iter()
        .filter_map(|o| o.summary.as_ref())
        .map(|s| s.clusters.len())
        .sum();
    info!(
        "reconstructed {} events into {} clusters in {:.2?}",
        outputs.len() - n_failed,
        n_clusters,
        start.elapsed()
    );
    if verbose {
        eprintln!(
            "Done: {} clusters, {} failed event(s), {:.3}s",
            n_clusters,
            n_failed,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(outputs)
}

/// Human-readable overview of an event file.
fn describe(records: &[EventRecord]) -> Result<String> {
    let mut text = format!("Events: {}\n", records.len());
    let mut total_hits = 0usize;
    let mut total_tracks = 0usize;

    for (index, record) in records.iter().enumerate() {
        let event = Event::from_record(record)?;
        total_hits += event.hits().len();
        total_tracks += event.tracks().len();

        let layers = match event.ordered_calo_hits() {
            Ok(ordered) => match (ordered.inner_layer(), ordered.outer_layer()) {
                (Some(inner), Some(outer)) => format!("layers {}..={}", inner, outer),
                _ => "no layers".to_string(),
            },
            Err(err) => format!("unusable: {}", err),
        };
        let energy: f32 = event.hits().iter().map(|(_, hit)| hit.hadronic_energy()).sum();
        text.push_str(&format!(
            "  event {}: {} hits, {} tracks, {:.3} GeV hadronic, {}\n",
            index,
            event.hits().len(),
            event.tracks().len(),
            energy,
            layers
        ));
    }

    text.push_str(&format!("Total hits: {}\nTotal tracks: {}\n", total_hits, total_tracks));
    if !records.is_empty() {
        text.push_str(&format!(
            "Mean hits per event: {:.1}\n",
            total_hits as f64 / records.len() as f64
        ));
    }
    Ok(text)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            geometry,
            settings,
            output,
            threads,
            verbose,
        } => {
            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()?;
            }
            let outputs = process(&input, &geometry, settings.as_deref(), verbose)?;
            write_json(&outputs, output.as_deref())?;
            if verbose {
                if let Some(path) = &output {
                    eprintln!("Wrote output to: {}", path.display());
                }
            }
        }

        Commands::Info { input } => {
            let records: Vec<EventRecord> = read_json(&input)?;
            print!("{}", describe(&records)?);
        }

        Commands::Defaults => {
            write_json(&PfaSettings::default(), None)?;
        }
    }

    Ok(())
}
