//! Sample source contract
//!
//! Hardware transports and simulators implement [`SampleSource`]. The
//! monitor registers one callback and never pulls samples itself.

use crate::error::BwmResult;
use crate::sample_batch::SampleBatch;
use async_trait::async_trait;

/// Callback invoked once per delivered batch
pub type BatchCallback = Box<dyn FnMut(SampleBatch) + Send + 'static>;

/// Producer of timestamped multi-channel readings
#[async_trait]
pub trait SampleSource: Send {
    /// Register the batch callback and begin delivering
    fn start(&mut self, on_batch: BatchCallback) -> BwmResult<()>;

    /// Wait until the source is connected and streaming
    async fn wait_for_connected(&mut self) -> BwmResult<()>;

    /// Stop delivery; safe to call when never connected or already stopped
    async fn disconnect(&mut self) -> BwmResult<()>;

    /// Number of channels per delivered row
    fn channel_count(&self) -> usize;

    /// Nominal sampling rate in Hz
    fn sampling_rate(&self) -> f64;

    /// Polled by the session loop; `Err` once delivery has stopped for good
    fn health(&self) -> BwmResult<()> {
        Ok(())
    }

    /// Human-readable source name for logs
    fn name(&self) -> &str {
        "sample-source"
    }
}
