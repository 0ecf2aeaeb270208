//! Ingestion entry point
//!
//! The sample source calls [`IngestionDispatcher::on_batch`] for every
//! delivery. Each full window is estimated, persisted and published, then
//! the window is trimmed down to the configured overlap.

use crate::config::MonitorConfig;
use crate::sink::ResultSink;
use crate::spectral::BandPowerEstimator;
use crate::window_buffer::WindowBuffer;
use bwm_core::{BandPowerResult, BatchCallback, BwmError, BwmResult, SampleBatch};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Dispatcher shared between the source callback and the session
pub type SharedDispatcher = Arc<Mutex<IngestionDispatcher>>;

/// What happened to one delivered batch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Batch absorbed, window not yet full
    Accumulating { buffered: usize },
    /// Batch completed a window
    WindowReady(BandPowerResult),
    /// Batch was malformed and dropped; the buffer is unchanged
    Rejected(BwmError),
    /// Window was full but could not be estimated; nothing was emitted
    EstimationFailed(BwmError),
}

/// Counters for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub batches_received: u64,
    pub batches_rejected: u64,
    pub samples_received: u64,
    pub windows_completed: u64,
    pub windows_persisted: u64,
    pub windows_published: u64,
    pub persistence_failures: u64,
    pub estimation_failures: u64,
}

/// Owns the window buffer, the estimator and the result sink
pub struct IngestionDispatcher {
    buffer: WindowBuffer,
    estimator: BandPowerEstimator,
    sink: ResultSink,
    /// Rows kept after each full window
    retained: usize,
    stats: DispatchStats,
}

impl IngestionDispatcher {
    /// Build buffer and estimator from configuration
    pub fn new(config: &MonitorConfig, sink: ResultSink) -> BwmResult<Self> {
        config.validate()?;

        let buffer = WindowBuffer::new(config.window_capacity(), config.acquisition.channel_count)?;
        let estimator = BandPowerEstimator::new(config.bands.clone(), config.acquisition.sampling_rate)?;

        Ok(Self::with_parts(buffer, estimator, sink, config.retained_samples()))
    }

    /// Assemble from pre-built parts
    pub fn with_parts(
        buffer: WindowBuffer,
        estimator: BandPowerEstimator,
        sink: ResultSink,
        retained: usize,
    ) -> Self {
        IngestionDispatcher {
            retained: retained.min(buffer.capacity().saturating_sub(1)),
            buffer,
            estimator,
            sink,
            stats: DispatchStats::default(),
        }
    }

    /// Handle one delivered batch
    ///
    /// Never fails: rejected batches and output errors are logged and counted.
    pub fn on_batch(&mut self, batch: &SampleBatch) -> DispatchOutcome {
        self.stats.batches_received += 1;

        let outcome = match self.buffer.add(batch) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.batches_rejected += 1;
                warn!(error = %e, rows = batch.len(), "Rejected sample batch");
                return DispatchOutcome::Rejected(e);
            }
        };
        self.stats.samples_received += batch.len() as u64;

        if !outcome.is_full {
            return DispatchOutcome::Accumulating {
                buffered: outcome.window.rows(),
            };
        }

        let timestamp = outcome.last_timestamp.unwrap_or_default();
        let estimated = self.estimator.estimate(&outcome.window, timestamp);
        self.stats.windows_completed += 1;
        self.buffer.retain_latest(self.retained);

        match estimated {
            Ok(result) => {
                self.emit(&result);
                DispatchOutcome::WindowReady(result)
            }
            Err(e) => {
                self.stats.estimation_failures += 1;
                warn!(error = %e, timestamp, "Skipping window that failed estimation");
                DispatchOutcome::EstimationFailed(e)
            }
        }
    }

    fn emit(&mut self, result: &BandPowerResult) {
        match self.sink.append(result) {
            Ok(()) => self.stats.windows_persisted += 1,
            Err(e) => {
                // One lost row is preferable to losing the live stream
                self.stats.persistence_failures += 1;
                warn!(error = %e, timestamp = result.timestamp, "Dropped record after persistence failure");
            }
        }

        if self.sink.publish(result.clone()) {
            self.stats.windows_published += 1;
        }

        debug!(
            timestamp = result.timestamp,
            dominant = result.dominant_band().unwrap_or("none"),
            "Window ready"
        );
    }

    /// Send the end-of-stream marker to the consumer
    pub fn publish_end_of_stream(&self) -> bool {
        self.sink.publish_end_of_stream()
    }

    /// Flush and close the record sink
    pub fn close(&mut self) -> BwmResult<()> {
        self.sink.close()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    pub fn into_shared(self) -> SharedDispatcher {
        Arc::new(Mutex::new(self))
    }
}

/// Source callback that feeds a shared dispatcher
pub fn shared_callback(dispatcher: &SharedDispatcher) -> BatchCallback {
    let dispatcher = Arc::clone(dispatcher);
    Box::new(move |batch: SampleBatch| match dispatcher.lock() {
        Ok(mut guard) => {
            guard.on_batch(&batch);
        }
        Err(_) => error!("Dispatcher lock poisoned, dropping batch"),
    })
}
