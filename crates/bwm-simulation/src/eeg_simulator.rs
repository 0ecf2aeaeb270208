//! EEG signal simulator with band rhythms, noise and irregular batching

use crate::signal_patterns::StatePattern;
use bwm_core::{BwmError, BwmResult, SampleBatch};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Configuration for EEG simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EegSimConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Number of channels to simulate
    pub channel_count: usize,
    /// Brain-state pattern to generate
    pub pattern: StatePattern,
    /// Noise configuration
    pub noise: NoiseConfig,
    /// Rows per delivered batch
    pub batch: BatchShape,
    /// Timestamp of the first sample, in seconds
    pub start_time: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

/// Noise configuration for realistic EEG simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation in microvolts (0.0 = no noise)
    pub gaussian_std: f64,
    /// Power line interference frequency (50/60Hz)
    pub powerline_freq: Option<f64>,
    /// Power line interference amplitude
    pub powerline_amp: f64,
}

/// Range of rows per batch; sizes are drawn uniformly from it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchShape {
    pub min_rows: usize,
    pub max_rows: usize,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 2.0,
            powerline_freq: Some(50.0),
            powerline_amp: 0.5,
        }
    }
}

impl Default for EegSimConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 256.0,
            channel_count: 4,
            pattern: StatePattern::default(),
            noise: NoiseConfig::default(),
            // Headband packets carry 12 samples; jitter around that
            batch: BatchShape {
                min_rows: 1,
                max_rows: 24,
            },
            start_time: 0.0,
            seed: None,
        }
    }
}

impl EegSimConfig {
    pub fn validate(&self) -> BwmResult<()> {
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(BwmError::InvalidConfig {
                reason: format!("simulated sampling rate {} is not positive", self.sampling_rate),
            });
        }

        if self.channel_count == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "simulated channel count must be greater than 0".to_string(),
            });
        }

        if self.batch.min_rows == 0 || self.batch.min_rows > self.batch.max_rows {
            return Err(BwmError::InvalidConfig {
                reason: format!(
                    "invalid batch shape {}..={}",
                    self.batch.min_rows, self.batch.max_rows
                ),
            });
        }

        Ok(())
    }
}

/// EEG signal simulator
pub struct EegSimulator {
    config: EegSimConfig,
    rng: rand::rngs::StdRng,
    normal_dist: Normal<f64>,
    /// Per-channel phase offsets so channels are correlated but not identical
    channel_phases: Vec<f64>,
    /// Index of the next sample to generate
    sample_index: u64,
}

impl EegSimulator {
    /// Create new EEG simulator with configuration
    pub fn new(config: EegSimConfig) -> BwmResult<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let normal_dist = Normal::new(0.0, config.noise.gaussian_std)
            .map_err(|e| BwmError::InvalidConfig {
                reason: format!("Failed to create normal distribution: {}", e),
            })?;

        let channel_phases = (0..config.channel_count)
            .map(|_| rng.gen_range(0.0..0.5))
            .collect();

        Ok(EegSimulator {
            config,
            rng,
            normal_dist,
            channel_phases,
            sample_index: 0,
        })
    }

    /// Generate exactly `rows` consecutive samples
    pub fn generate(&mut self, rows: usize) -> BwmResult<SampleBatch> {
        let channels = self.config.channel_count;
        let dt = 1.0 / self.config.sampling_rate;
        let mut timestamps = Vec::with_capacity(rows);
        let mut samples = Vec::with_capacity(rows * channels);

        for _ in 0..rows {
            let time = self.sample_index as f64 * dt;
            let oscillations = self.config.pattern.state_at_time(time).oscillations();

            for ch in 0..channels {
                let phase = self.channel_phases[ch];
                let mut value: f64 = oscillations.iter().map(|o| o.value_at(time, phase)).sum();

                value += self.normal_dist.sample(&mut self.rng);

                if let Some(freq) = self.config.noise.powerline_freq {
                    value += self.config.noise.powerline_amp
                        * (2.0 * std::f64::consts::PI * freq * time).sin();
                }

                samples.push(value);
            }

            timestamps.push(self.config.start_time + time);
            self.sample_index += 1;
        }

        SampleBatch::new(timestamps, samples, channels)
    }

    /// Generate one batch with a size drawn from the configured shape
    pub fn next_batch(&mut self) -> BwmResult<SampleBatch> {
        let rows = self
            .rng
            .gen_range(self.config.batch.min_rows..=self.config.batch.max_rows);
        self.generate(rows)
    }

    pub fn config(&self) -> &EegSimConfig {
        &self.config
    }
}
