//! SampleBatch: one delivery of timestamped multi-channel readings

use crate::error::{BwmError, BwmResult};
use serde::{Deserialize, Serialize};

/// A batch of samples as delivered by a sample source
///
/// Samples are stored row-major (interleaved channels):
/// `[s0_ch0, s0_ch1, .., s1_ch0, s1_ch1, ..]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    /// Per-sample timestamps in seconds, chronologically increasing
    pub timestamps: Vec<f64>,
    /// Interleaved readings, `timestamps.len() * channel_count` values
    pub samples: Vec<f64>,
    /// Number of channels per row
    pub channel_count: usize,
}

impl SampleBatch {
    /// Create a batch, checking that the sample matrix matches the timestamps
    pub fn new(timestamps: Vec<f64>, samples: Vec<f64>, channel_count: usize) -> BwmResult<Self> {
        let batch = SampleBatch {
            timestamps,
            samples,
            channel_count,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Build a batch from one row per sample
    pub fn from_rows(timestamps: Vec<f64>, rows: &[Vec<f64>]) -> BwmResult<Self> {
        let channel_count = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != channel_count) {
            return Err(BwmError::ChannelMismatch {
                expected: channel_count,
                actual: bad.len(),
            });
        }

        let samples = rows.iter().flatten().copied().collect();
        Self::new(timestamps, samples, channel_count)
    }

    /// Check the shape invariants
    ///
    /// Fields are public so sources can build batches without copying; this
    /// is re-run by every consumer that depends on the shape.
    pub fn validate(&self) -> BwmResult<()> {
        if self.channel_count == 0 {
            return Err(BwmError::InvalidBatch {
                reason: "batch has zero channels".to_string(),
            });
        }

        if self.samples.len() % self.channel_count != 0 {
            return Err(BwmError::InvalidBatch {
                reason: format!(
                    "{} values cannot be split into rows of {} channels",
                    self.samples.len(),
                    self.channel_count
                ),
            });
        }

        let rows = self.samples.len() / self.channel_count;
        if rows != self.timestamps.len() {
            return Err(BwmError::LengthMismatch {
                timestamps: self.timestamps.len(),
                rows,
            });
        }

        Ok(())
    }

    /// Number of sample rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the batch carries no samples
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Get one row (all channels of one sample)
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.channel_count)?;
        self.samples.get(start..start + self.channel_count)
    }

    /// Timestamp of the newest sample
    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
}
