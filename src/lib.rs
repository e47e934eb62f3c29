//! VibeSense: Automotive Vibration Diagnostics
//!
//! Turns triaxial accelerometer streams from sensor nodes mounted around a
//! vehicle into live severity tracking and run-level fault findings.
//!
//! ## Architecture
//!
//! - **Processing**: per-sensor ring buffers and FFT spectra with strength metrics
//! - **Orders**: wheel / driveshaft / engine order prediction and peak classification
//! - **Live Diagnostics**: hysteresis trackers, source x severity matrix, escalation events
//! - **Findings**: run-level order tracking, localization and persistent-peak analysis
//! - **Pipeline**: bounded ingest queue, frame sources and the processing loop

pub mod config;
pub mod findings;
pub mod live;
pub mod orders;
pub mod phase;
pub mod pipeline;
pub mod processing;
pub mod sanitize;
pub mod strength;
pub mod types;

// Re-export configuration
pub use config::DiagnosticsConfig;

// Re-export commonly used types
pub use types::{
    ConfidenceLabel, LocationHypothesis, MatrixSource, PeakPoint, RunMetadata, RunSample,
    SensorFrame, SensorLocation, StrengthBucket, VibrationSource,
};

// Re-export engines
pub use findings::{Finding, FindingsEngine, RunSummary};
pub use live::{LiveDiagnostics, LiveSnapshot, SensorObservation};
pub use processing::{SignalProcessor, SpectrumPayload};
