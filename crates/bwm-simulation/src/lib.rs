//! BWM-Simulation: synthetic EEG sources
//!
//! Generates multi-channel EEG-like signals with band rhythms and noise, and
//! streams them through the [`bwm_core::SampleSource`] contract so sessions
//! can run without a headband.

pub mod eeg_simulator;
pub mod signal_patterns;
pub mod simulated_source;

pub use eeg_simulator::*;
pub use signal_patterns::*;
pub use simulated_source::*;
