//! BWM Recorder: live EEG band-power recording
//!
//! Signal flow: sample source → window buffer → Welch band powers → CSV file
//! and live viewer process.

mod cli;
mod session;
mod viewer;

use anyhow::Result;
use bwm_simulation::{EegSimConfig, SimulatedEegSource, StreamConfig};
use clap::Parser;
use cli::{Cli, Command, RecordArgs};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the viewer's stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().into_command() {
        Command::Record(args) => record(args).await,
        Command::Viewer(args) => viewer::run_viewer(args.to_config()).await,
    }
}

async fn record(args: RecordArgs) -> Result<()> {
    let config = args.resolve_config()?;
    let output = args.output_path();

    let source = SimulatedEegSource::new(StreamConfig {
        eeg_config: EegSimConfig {
            sampling_rate: config.acquisition.sampling_rate,
            channel_count: config.acquisition.channel_count,
            seed: args.seed,
            ..EegSimConfig::default()
        },
        speed: args.speed,
        ..StreamConfig::default()
    })?;

    let report = session::run_session(&config, &output, Box::new(source)).await?;
    info!(
        session_id = %report.session_id,
        output = %report.output.display(),
        records = report.records_written,
        rejected = report.stats.batches_rejected,
        "Saved"
    );
    Ok(())
}
