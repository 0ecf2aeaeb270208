//! BWM-Core: Foundation types for the brainwave monitor
//!
//! Sample batches, frequency bands, band-power results, the sample source
//! contract and the shared error type.

pub mod sample_batch;
pub mod bands;
pub mod source;
pub mod error;

pub use sample_batch::*;
pub use bands::*;
pub use source::{BatchCallback, SampleSource};
pub use error::{BwmError, BwmResult};
