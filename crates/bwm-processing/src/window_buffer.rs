//! Fixed-capacity multi-channel window accumulator
//!
//! Absorbs batches of any size and reports, once per crossing of capacity,
//! that a full chronologically contiguous window is available.

use bwm_core::{BwmError, BwmResult, SampleBatch};

/// Sliding accumulator of the most recent `capacity` sample rows
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    /// Row-major `capacity * channels` sample matrix
    data: Vec<f64>,
    timestamps: Vec<f64>,
    capacity: usize,
    channels: usize,
    /// Write cursor, always in `0..=capacity`
    ptr: usize,
}

/// Borrowed view of the filled rows of a [`WindowBuffer`]
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a> {
    samples: &'a [f64],
    timestamps: &'a [f64],
    channels: usize,
}

/// Result of one [`WindowBuffer::add`] call
#[derive(Debug, Clone, Copy)]
pub struct AddOutcome<'a> {
    /// True only on the call that filled the buffer
    pub is_full: bool,
    /// Filled rows, exactly `capacity` of them when `is_full`
    pub window: WindowView<'a>,
    /// Timestamp of the newest stored row
    pub last_timestamp: Option<f64>,
}

impl WindowBuffer {
    /// Create a buffer holding `capacity` rows of `channels` values
    pub fn new(capacity: usize, channels: usize) -> BwmResult<Self> {
        if capacity == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "window capacity must be greater than 0".to_string(),
            });
        }

        if channels == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "window must have at least one channel".to_string(),
            });
        }

        Ok(WindowBuffer {
            data: vec![0.0; capacity * channels],
            timestamps: vec![0.0; capacity],
            capacity,
            channels,
            ptr: 0,
        })
    }

    /// Create a buffer sized for `duration_secs` of signal at `sampling_rate`
    pub fn with_duration(sampling_rate: f64, duration_secs: f64, channels: usize) -> BwmResult<Self> {
        let capacity = (sampling_rate * duration_secs).round();
        if !capacity.is_finite() || capacity < 1.0 {
            return Err(BwmError::InvalidConfig {
                reason: format!(
                    "window of {}s at {}Hz holds no samples",
                    duration_secs, sampling_rate
                ),
            });
        }

        Self::new(capacity as usize, channels)
    }

    /// Append a batch, evicting the oldest rows on overflow
    ///
    /// A malformed batch is rejected before any state changes.
    pub fn add(&mut self, batch: &SampleBatch) -> BwmResult<AddOutcome<'_>> {
        batch.validate()?;
        if batch.channel_count != self.channels {
            return Err(BwmError::ChannelMismatch {
                expected: self.channels,
                actual: batch.channel_count,
            });
        }

        let was_full = self.ptr == self.capacity;
        let incoming = batch.len();
        let ch = self.channels;

        if incoming >= self.capacity {
            // Only the newest `capacity` rows of the batch survive
            let skip = incoming - self.capacity;
            self.data.copy_from_slice(&batch.samples[skip * ch..]);
            self.timestamps.copy_from_slice(&batch.timestamps[skip..]);
            self.ptr = self.capacity;
        } else {
            if self.ptr + incoming > self.capacity {
                self.shift_left(self.ptr + incoming - self.capacity);
            }

            let end = self.ptr + incoming;
            self.data[self.ptr * ch..end * ch].copy_from_slice(&batch.samples);
            self.timestamps[self.ptr..end].copy_from_slice(&batch.timestamps);
            self.ptr = end;
        }

        Ok(AddOutcome {
            is_full: !was_full && self.ptr == self.capacity,
            window: self.window(),
            last_timestamp: self.last_timestamp(),
        })
    }

    /// Keep only the newest `rows` rows, moved to the front
    ///
    /// Used after a full window to decide how much overlaps into the next one.
    pub fn retain_latest(&mut self, rows: usize) {
        let rows = rows.min(self.ptr);
        self.shift_left(self.ptr - rows);
    }

    /// Drop all rows
    pub fn clear(&mut self) {
        self.ptr = 0;
    }

    /// Filled rows in chronological order
    pub fn window(&self) -> WindowView<'_> {
        WindowView {
            samples: &self.data[..self.ptr * self.channels],
            timestamps: &self.timestamps[..self.ptr],
            channels: self.channels,
        }
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.ptr.checked_sub(1).map(|i| self.timestamps[i])
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of filled rows
    pub fn len(&self) -> usize {
        self.ptr
    }

    pub fn is_empty(&self) -> bool {
        self.ptr == 0
    }

    pub fn is_full(&self) -> bool {
        self.ptr == self.capacity
    }

    fn shift_left(&mut self, rows: usize) {
        let rows = rows.min(self.ptr);
        if rows == 0 {
            return;
        }

        let ch = self.channels;
        self.data.copy_within(rows * ch..self.ptr * ch, 0);
        self.timestamps.copy_within(rows..self.ptr, 0);
        self.ptr -= rows;
    }
}

impl<'a> WindowView<'a> {
    /// Number of rows in the view
    pub fn rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Row-major sample values
    pub fn samples(&self) -> &'a [f64] {
        self.samples
    }

    pub fn timestamps(&self) -> &'a [f64] {
        self.timestamps
    }

    pub fn row(&self, index: usize) -> Option<&'a [f64]> {
        let start = index.checked_mul(self.channels)?;
        self.samples.get(start..start + self.channels)
    }

    /// Copy one channel out as a contiguous signal
    pub fn channel(&self, channel: usize) -> Option<Vec<f64>> {
        if channel >= self.channels {
            return None;
        }

        Some(
            self.samples
                .iter()
                .skip(channel)
                .step_by(self.channels)
                .copied()
                .collect(),
        )
    }
}
