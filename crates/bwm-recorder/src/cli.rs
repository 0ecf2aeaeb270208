//! Command line interface

use anyhow::{Context, Result};
use bwm_processing::{MonitorConfig, MonitorProfile, ViewerConfig};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "bwm-recorder", version, about = "Record EEG band powers to CSV with a live viewer")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default `record` command
    #[command(flatten)]
    pub record: RecordArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record a session (default)
    Record(RecordArgs),
    /// Consumer process fed JSON lines on stdin
    Viewer(ViewerArgs),
}

impl Cli {
    /// Selected command, `record` when none was given
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Record(self.record))
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct RecordArgs {
    /// Recording duration in seconds [default: 300]
    #[arg(long)]
    pub duration: Option<f64>,

    /// Analysis window length in seconds [default: 1.0]
    #[arg(long)]
    pub window: Option<f64>,

    /// Fraction of each window kept for the next, in [0, 1) [default: 0.2]
    #[arg(long)]
    pub overlap: Option<f64>,

    /// Channels per sample [default: 4]
    #[arg(long)]
    pub channels: Option<usize>,

    /// Sampling rate in Hz [default: 256]
    #[arg(long = "sampling-rate")]
    pub sampling_rate: Option<f64>,

    /// CSV output file [default: data/brainwaves_<timestamp>.csv]
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Do not spawn the viewer process
    #[arg(long = "no-viewer")]
    pub no_viewer: bool,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for the simulated source
    #[arg(long)]
    pub seed: Option<u64>,

    /// Simulated playback speed (1.0 = real time)
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
}

#[derive(Debug, Clone, Args)]
pub struct ViewerArgs {
    /// Values kept per band
    #[arg(long, default_value_t = 200)]
    pub history: usize,

    /// Render tick in milliseconds
    #[arg(long = "tick-ms", default_value_t = 50)]
    pub tick_ms: u64,
}

impl ViewerArgs {
    pub fn to_config(&self) -> ViewerConfig {
        ViewerConfig {
            enabled: true,
            history_len: self.history,
            tick_ms: self.tick_ms,
        }
    }
}

impl RecordArgs {
    /// Configuration file (or the default preset) with flag overrides applied
    pub fn resolve_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => MonitorConfig::default(),
        };

        let mut customized = false;
        if let Some(duration) = self.duration {
            config.session.recording_duration_secs = duration;
        }
        if let Some(window) = self.window {
            config.window.duration_secs = window;
            customized = true;
        }
        if let Some(overlap) = self.overlap {
            config.window.overlap = overlap;
            customized = true;
        }
        if let Some(channels) = self.channels {
            config.acquisition.channel_count = channels;
        }
        if let Some(rate) = self.sampling_rate {
            config.acquisition.sampling_rate = rate;
        }
        if self.no_viewer {
            config.viewer.enabled = false;
        }
        if customized {
            config.profile = MonitorProfile::Custom;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => default_output_path(Path::new("data"), Local::now()),
        }
    }
}

/// `<dir>/brainwaves_<YYYY-MM-DD_HH-MM-SS>.csv`, or the bare file name when
/// `dir` does not exist
pub fn default_output_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let file_name = format!("brainwaves_{}.csv", now.format("%Y-%m-%d_%H-%M-%S"));
    if dir.is_dir() {
        dir.join(file_name)
    } else {
        PathBuf::from(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["bwm-recorder"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).into_command()
    }

    #[test]
    fn test_record_is_default() {
        match parse(&["--duration", "10", "--no-viewer"]) {
            Command::Record(args) => {
                assert_eq!(args.duration, Some(10.0));
                assert!(args.no_viewer);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_viewer_subcommand() {
        match parse(&["viewer", "--history", "50", "--tick-ms", "20"]) {
            Command::Viewer(args) => {
                let config = args.to_config();
                assert_eq!(config.history_len, 50);
                assert_eq!(config.tick_ms, 20);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flag_overrides() {
        let args = RecordArgs {
            duration: Some(30.0),
            overlap: Some(0.0),
            channels: Some(2),
            no_viewer: true,
            ..RecordArgs::default()
        };

        let config = args.resolve_config().unwrap();
        assert_eq!(config.session.recording_duration_secs, 30.0);
        assert_eq!(config.retained_samples(), 0);
        assert_eq!(config.acquisition.channel_count, 2);
        assert_eq!(config.profile, MonitorProfile::Custom);
        assert!(!config.viewer.enabled);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = RecordArgs {
            overlap: Some(1.5),
            ..RecordArgs::default()
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        std::fs::write(&path, MonitorConfig::sliding().to_json().unwrap()).unwrap();

        let args = RecordArgs {
            config: Some(path),
            duration: Some(5.0),
            ..RecordArgs::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.profile, MonitorProfile::Sliding);
        assert_eq!(config.window_capacity(), 512);
        assert_eq!(config.session.recording_duration_secs, 5.0);
    }

    #[test]
    fn test_default_output_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let inside = default_output_path(dir.path(), now);
        assert_eq!(inside, dir.path().join("brainwaves_2024-03-09_14-05-07.csv"));

        let fallback = default_output_path(&dir.path().join("missing"), now);
        assert_eq!(fallback, PathBuf::from("brainwaves_2024-03-09_14-05-07.csv"));
    }
}
