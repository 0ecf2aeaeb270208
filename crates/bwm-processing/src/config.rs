//! Configuration management for monitoring sessions

use bwm_core::{config_error, BandSet, BwmError, BwmResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Configuration name/profile
    pub name: String,
    /// Windowing profile the values were derived from
    pub profile: MonitorProfile,
    pub acquisition: AcquisitionConfig,
    pub window: WindowConfig,
    /// Bands reported for every window, in column order
    pub bands: BandSet,
    pub session: SessionConfig,
    pub viewer: ViewerConfig,
}

/// Windowing profiles for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorProfile {
    /// One-second windows keeping 20% overlap
    Standard,
    /// Heavily overlapping windows for smoother live display
    Sliding,
    /// Non-overlapping windows, each sample analysed once
    Disjoint,
    /// Custom profile
    Custom,
}

/// Properties of the incoming sample stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Channels per sample row
    pub channel_count: usize,
}

/// Analysis window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in seconds
    pub duration_secs: f64,
    /// Fraction of a full window kept for the next one, in `[0, 1)`
    pub overlap: f64,
}

/// Session timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recording stops after this many seconds
    pub recording_duration_secs: f64,
    /// Settling time after connecting, before the recording clock starts
    pub stabilization_secs: f64,
    /// Control loop polling interval
    pub poll_interval_ms: u64,
    /// How long the consumer process may take to exit before it is killed
    pub consumer_grace_ms: u64,
}

/// Live display consumer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Spawn the consumer process
    pub enabled: bool,
    /// Values kept per band
    pub history_len: usize,
    /// Render tick in milliseconds
    pub tick_ms: u64,
}

impl MonitorConfig {
    /// Four-channel 256 Hz headband, one-second windows, 20% overlap
    pub fn muse() -> Self {
        MonitorConfig {
            name: "Muse headband".to_string(),
            profile: MonitorProfile::Standard,
            acquisition: AcquisitionConfig {
                sampling_rate: 256.0,
                channel_count: 4,
            },
            window: WindowConfig {
                duration_secs: 1.0,
                overlap: 0.2,
            },
            bands: BandSet::eeg(),
            session: SessionConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }

    /// Two-second windows advancing by a tenth of a window
    pub fn sliding() -> Self {
        let mut config = Self::muse();
        config.name = "Sliding".to_string();
        config.profile = MonitorProfile::Sliding;
        config.window = WindowConfig {
            duration_secs: 2.0,
            overlap: 0.9,
        };
        config
    }

    /// Consume-and-reset windows
    pub fn disjoint() -> Self {
        let mut config = Self::muse();
        config.name = "Disjoint".to_string();
        config.profile = MonitorProfile::Disjoint;
        config.window.overlap = 0.0;
        config
    }

    /// Create configuration suitable for given profile
    pub fn for_profile(profile: MonitorProfile) -> Self {
        match profile {
            MonitorProfile::Standard => Self::muse(),
            MonitorProfile::Sliding => Self::sliding(),
            MonitorProfile::Disjoint => Self::disjoint(),
            MonitorProfile::Custom => Self::muse(), // Default to standard
        }
    }

    /// Validate entire configuration
    pub fn validate(&self) -> BwmResult<()> {
        let acq = &self.acquisition;
        if !(acq.sampling_rate.is_finite() && acq.sampling_rate >= 1.0) {
            return Err(config_error!("Sampling rate must be at least 1 Hz, got {}", acq.sampling_rate));
        }

        if acq.channel_count == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "Channel count must be greater than 0".to_string(),
            });
        }

        if !(self.window.duration_secs.is_finite() && self.window.duration_secs > 0.0) {
            return Err(BwmError::InvalidConfig {
                reason: "Window duration must be positive".to_string(),
            });
        }

        if self.window_capacity() == 0 {
            return Err(BwmError::InvalidConfig {
                reason: format!(
                    "Window of {}s holds no samples at {} Hz",
                    self.window.duration_secs, acq.sampling_rate
                ),
            });
        }

        if !(0.0..1.0).contains(&self.window.overlap) {
            return Err(config_error!("Overlap must be in [0, 1), got {}", self.window.overlap));
        }

        if !(self.session.recording_duration_secs.is_finite()
            && self.session.recording_duration_secs > 0.0)
        {
            return Err(BwmError::InvalidConfig {
                reason: "Recording duration must be positive".to_string(),
            });
        }

        if !(self.session.stabilization_secs.is_finite() && self.session.stabilization_secs >= 0.0) {
            return Err(BwmError::InvalidConfig {
                reason: "Stabilization time must not be negative".to_string(),
            });
        }

        for (name, secs) in [
            ("Recording duration", self.session.recording_duration_secs),
            ("Stabilization time", self.session.stabilization_secs),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(config_error!("{} of {}s is out of range", name, secs));
            }
        }

        if self.session.poll_interval_ms == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "Poll interval must be greater than 0".to_string(),
            });
        }

        if self.viewer.history_len == 0 || self.viewer.tick_ms == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "Viewer history and tick must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Samples per analysis window
    pub fn window_capacity(&self) -> usize {
        let capacity = (self.acquisition.sampling_rate * self.window.duration_secs).round();
        if capacity.is_finite() && capacity > 0.0 {
            capacity as usize
        } else {
            0
        }
    }

    /// Samples carried over from one full window into the next
    pub fn retained_samples(&self) -> usize {
        let capacity = self.window_capacity();
        let retained = (capacity as f64 * self.window.overlap).round() as usize;
        // At least one new sample per window
        retained.min(capacity.saturating_sub(1))
    }

    /// New samples needed between consecutive windows
    pub fn window_hop(&self) -> usize {
        self.window_capacity() - self.retained_samples()
    }

    pub fn recording_duration(&self) -> Duration {
        Duration::from_secs_f64(self.session.recording_duration_secs)
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_secs_f64(self.session.stabilization_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.session.poll_interval_ms)
    }

    pub fn consumer_grace(&self) -> Duration {
        Duration::from_millis(self.session.consumer_grace_ms)
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> BwmResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BwmError::InvalidConfig {
            reason: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> BwmResult<Self> {
        serde_json::from_str(json).map_err(|e| BwmError::InvalidConfig {
            reason: format!("Failed to deserialize configuration: {}", e),
        })
    }

    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> BwmResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| BwmError::InvalidConfig {
            reason: format!("Cannot read {}: {}", path.display(), e),
        })?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::muse()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            recording_duration_secs: 300.0,
            stabilization_secs: 2.0,
            poll_interval_ms: 1000,
            consumer_grace_ms: 2000,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            enabled: true,
            history_len: 200,
            tick_ms: 50,
        }
    }
}
