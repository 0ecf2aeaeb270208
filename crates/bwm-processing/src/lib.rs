//! BWM-Processing: Streaming-to-windowed band power pipeline
//!
//! Window accumulation, spectral estimation, ingestion dispatch, result
//! persistence and publication, and session shutdown coordination.

pub mod window_buffer;
pub mod spectral;
pub mod sink;
pub mod dispatcher;
pub mod shutdown;
pub mod config;

pub use window_buffer::{AddOutcome, WindowBuffer, WindowView};
pub use spectral::{BandPowerEstimator, Psd, PsdEstimator, WelchPsd};
pub use sink::{CsvRecordWriter, PublishMessage, Publisher, RecordWriter, ResultSink};
pub use dispatcher::{shared_callback, DispatchOutcome, DispatchStats, IngestionDispatcher, SharedDispatcher};
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownState, TeardownGuard};
pub use config::{
    AcquisitionConfig, MonitorConfig, MonitorProfile, SessionConfig, ViewerConfig, WindowConfig,
};
