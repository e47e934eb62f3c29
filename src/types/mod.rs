//! Shared data structures for the vibration diagnostics pipeline
//!
//! - Vocabulary: sources, sensor locations, severity buckets, confidence labels
//! - Run data: incoming `SensorFrame`s and the `RunSample`s a run is built from

mod run;
mod vibration;

pub use run::*;
pub use vibration::*;
