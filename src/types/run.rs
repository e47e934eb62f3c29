//! Frames coming in from sensor nodes and the per-tick samples a run is made of.

use serde::{Deserialize, Serialize};

use super::{SensorLocation, StrengthBucket};
use crate::sanitize;

/// One batch of raw triaxial counts from a sensor node.
///
/// This is the unit the transport layer hands to the core and the line format
/// of `--stdin` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorFrame {
    pub sensor_id: String,
    #[serde(default)]
    pub location: Option<SensorLocation>,
    /// Seconds since run start
    pub t_s: f64,
    pub sample_rate_hz: u32,
    /// Raw accelerometer counts, one `[x, y, z]` triple per sample
    pub samples: Vec<[f64; 3]>,
    /// Vehicle speed at the time of the frame, when known
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    /// Measured engine speed, when an OBD source provides it
    #[serde(default)]
    pub engine_rpm: Option<f64>,
}

/// A spectral peak as stored in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakPoint {
    #[serde(serialize_with = "sanitize::finite")]
    pub hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub amp: f64,
}

impl PeakPoint {
    pub fn new(hz: f64, amp: f64) -> Self {
        Self { hz, amp }
    }
}

/// Per-sensor, per-tick record consumed by phase segmentation and the
/// findings engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSample {
    pub t_s: f64,
    pub sensor_id: String,
    #[serde(default)]
    pub location: Option<SensorLocation>,
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub speed_kmh: Option<f64>,
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub engine_rpm: Option<f64>,
    #[serde(default)]
    pub sample_rate_hz: Option<u32>,
    /// Combined-spectrum peaks, strongest first
    #[serde(default)]
    pub top_peaks: Vec<PeakPoint>,
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub vibration_strength_db: Option<f64>,
    #[serde(default)]
    pub strength_bucket: Option<StrengthBucket>,
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub noise_floor_amp: Option<f64>,
}

impl RunSample {
    /// Speed in m/s when known and positive.
    pub fn speed_mps(&self) -> Option<f64> {
        self.speed_kmh
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|kmh| kmh / 3.6)
    }
}

/// Run-wide references the findings engine needs besides the samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Effective rolling circumference; `None` when the tire is unknown
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub tire_circumference_m: Option<f64>,
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub final_drive_ratio: Option<f64>,
    #[serde(default, serialize_with = "sanitize::finite_opt")]
    pub current_gear_ratio: Option<f64>,
    /// Sensor sample rate as configured on the nodes
    #[serde(default)]
    pub raw_sample_rate_hz: Option<u32>,
}

impl RunMetadata {
    /// Build metadata from a (sanitized) vehicle spec.
    pub fn from_vehicle(
        vehicle: &crate::config::VehicleSpec,
        raw_sample_rate_hz: Option<u32>,
    ) -> Self {
        Self {
            tire_circumference_m: crate::orders::tire_circumference_m(vehicle),
            final_drive_ratio: Some(vehicle.final_drive_ratio).filter(|v| *v > 0.0),
            current_gear_ratio: Some(vehicle.current_gear_ratio).filter(|v| *v > 0.0),
            raw_sample_rate_hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_parses_with_optional_fields_missing() {
        let line = concat!(
            r#"{"sensor_id":"fl","t_s":1.5,"sample_rate_hz":800,"#,
            r#""samples":[[1,2,3],[4,5,6]]}"#
        );
        let frame: SensorFrame = serde_json::from_str(line).expect("parse frame");
        assert_eq!(frame.samples.len(), 2);
        assert!(frame.location.is_none());
        assert!(frame.speed_kmh.is_none());
    }

    #[test]
    fn speed_mps_ignores_non_positive() {
        let mut s = RunSample { speed_kmh: Some(36.0), ..Default::default() };
        assert!((s.speed_mps().unwrap_or_default() - 10.0).abs() < 1e-12);
        s.speed_kmh = Some(0.0);
        assert!(s.speed_mps().is_none());
        s.speed_kmh = Some(f64::NAN);
        assert!(s.speed_mps().is_none());
    }

    #[test]
    fn non_finite_sample_fields_serialize_as_null() {
        let s = RunSample {
            vibration_strength_db: Some(f64::INFINITY),
            ..Default::default()
        };
        let v = serde_json::to_value(&s).expect("serialize");
        assert!(v["vibration_strength_db"].is_null());
    }
}
