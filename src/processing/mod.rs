//! Signal processing module - per-sensor buffering and FFT spectra

mod buffer;
mod fft;
mod processor;

pub use buffer::{SampleBuffer, Versioned};
pub use fft::*;
pub use processor::{IntakeStats, SignalProcessor, SpectrumHandle, SpectrumResult};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sanitize;
use crate::strength::StrengthMetrics;
use crate::types::PeakPoint;

/// Errors in signal processing
///
/// These are plumbing conditions (unknown sensor, not enough samples yet).
/// Malformed sample values never produce an error; they are filtered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Sample chunk is not triaxial: {len} values")]
    ShapeMismatch { len: usize },

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),
}

/// Time-domain summary of one axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AxisMetrics {
    #[serde(serialize_with = "sanitize::finite")]
    pub rms: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub p2p: f64,
    /// Strongest spectral bins of this axis (DC ignored)
    pub peaks: Vec<PeakPoint>,
}

/// Everything derived from one buffer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumPayload {
    pub sensor_id: String,
    pub sample_rate_hz: u32,
    #[serde(serialize_with = "sanitize::finite_vec")]
    pub freq_hz: Vec<f64>,
    #[serde(serialize_with = "sanitize::finite_vec")]
    pub x: Vec<f64>,
    #[serde(serialize_with = "sanitize::finite_vec")]
    pub y: Vec<f64>,
    #[serde(serialize_with = "sanitize::finite_vec")]
    pub z: Vec<f64>,
    /// `sqrt(mean(axis^2))` per bin
    #[serde(serialize_with = "sanitize::finite_vec")]
    pub combined: Vec<f64>,
    /// Smoothed-spectrum peaks with raw amplitudes, strongest first
    pub peaks: Vec<PeakPoint>,
    pub axes: [AxisMetrics; 3],
    /// RMS of the vector magnitude over the buffered window
    #[serde(serialize_with = "sanitize::finite")]
    pub vmag_rms: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub vmag_p2p: f64,
    pub strength: StrengthMetrics,
    pub computed_at: chrono::DateTime<chrono::Utc>,
}
