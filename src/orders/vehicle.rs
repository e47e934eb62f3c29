//! Vehicle kinematics: tire geometry and rotational order frequencies.

use serde::Serialize;
use tracing::info;

use crate::config::{defaults, VehicleSpec};
use crate::sanitize;

/// Clamp bounds applied to runtime vehicle settings.
const BANDWIDTH_BOUNDS: (f64, f64) = (0.1, 100.0);
const UNCERTAINTY_BOUNDS: (f64, f64) = (0.0, 100.0);
const RATIO_BOUNDS: (f64, f64) = (0.1, 20.0);
const TIRE_WIDTH_BOUNDS: (f64, f64) = (100.0, 500.0);
const TIRE_ASPECT_BOUNDS: (f64, f64) = (10.0, 90.0);
const RIM_BOUNDS: (f64, f64) = (10.0, 30.0);
const DEFLECTION_BOUNDS: (f64, f64) = (0.8, 1.0);
const MIN_ABS_BAND_BOUNDS: (f64, f64) = (0.0, 500.0);
const MAX_HALF_WIDTH_BOUNDS: (f64, f64) = (0.1, 100.0);

/// Replace a non-finite (or, when `positive`, non-positive) value with
/// `fallback`, then clamp into `bounds`.
fn sanitize_field(
    name: &str,
    value: f64,
    fallback: f64,
    positive: bool,
    bounds: (f64, f64),
) -> f64 {
    let usable = value.is_finite() && if positive { value > 0.0 } else { value >= 0.0 };
    let value = if usable { value } else { fallback };
    let clamped = value.clamp(bounds.0, bounds.1);
    if usable && clamped != value {
        info!(setting = name, from = value, to = clamped, "[VehicleSpec] Clamped vehicle setting");
    }
    clamped
}

impl VehicleSpec {
    /// Copy with invalid values replaced by defaults and every field clamped
    /// into its physical range.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        Self {
            tire_width_mm: sanitize_field(
                "tire_width_mm",
                self.tire_width_mm,
                d.tire_width_mm,
                true,
                TIRE_WIDTH_BOUNDS,
            ),
            tire_aspect_pct: sanitize_field(
                "tire_aspect_pct",
                self.tire_aspect_pct,
                d.tire_aspect_pct,
                true,
                TIRE_ASPECT_BOUNDS,
            ),
            rim_in: sanitize_field("rim_in", self.rim_in, d.rim_in, true, RIM_BOUNDS),
            final_drive_ratio: sanitize_field(
                "final_drive_ratio",
                self.final_drive_ratio,
                d.final_drive_ratio,
                true,
                RATIO_BOUNDS,
            ),
            current_gear_ratio: sanitize_field(
                "current_gear_ratio",
                self.current_gear_ratio,
                d.current_gear_ratio,
                true,
                RATIO_BOUNDS,
            ),
            tire_deflection_factor: sanitize_field(
                "tire_deflection_factor",
                self.tire_deflection_factor,
                defaults::TIRE_DEFLECTION_FACTOR,
                true,
                DEFLECTION_BOUNDS,
            ),
            wheel_bandwidth_pct: sanitize_field(
                "wheel_bandwidth_pct",
                self.wheel_bandwidth_pct,
                d.wheel_bandwidth_pct,
                true,
                BANDWIDTH_BOUNDS,
            ),
            driveshaft_bandwidth_pct: sanitize_field(
                "driveshaft_bandwidth_pct",
                self.driveshaft_bandwidth_pct,
                d.driveshaft_bandwidth_pct,
                true,
                BANDWIDTH_BOUNDS,
            ),
            engine_bandwidth_pct: sanitize_field(
                "engine_bandwidth_pct",
                self.engine_bandwidth_pct,
                d.engine_bandwidth_pct,
                true,
                BANDWIDTH_BOUNDS,
            ),
            speed_uncertainty_pct: sanitize_field(
                "speed_uncertainty_pct",
                self.speed_uncertainty_pct,
                d.speed_uncertainty_pct,
                false,
                UNCERTAINTY_BOUNDS,
            ),
            tire_diameter_uncertainty_pct: sanitize_field(
                "tire_diameter_uncertainty_pct",
                self.tire_diameter_uncertainty_pct,
                d.tire_diameter_uncertainty_pct,
                false,
                UNCERTAINTY_BOUNDS,
            ),
            final_drive_uncertainty_pct: sanitize_field(
                "final_drive_uncertainty_pct",
                self.final_drive_uncertainty_pct,
                d.final_drive_uncertainty_pct,
                false,
                UNCERTAINTY_BOUNDS,
            ),
            gear_uncertainty_pct: sanitize_field(
                "gear_uncertainty_pct",
                self.gear_uncertainty_pct,
                d.gear_uncertainty_pct,
                false,
                UNCERTAINTY_BOUNDS,
            ),
            min_abs_band_hz: sanitize_field(
                "min_abs_band_hz",
                self.min_abs_band_hz,
                d.min_abs_band_hz,
                false,
                MIN_ABS_BAND_BOUNDS,
            ),
            max_band_half_width_pct: sanitize_field(
                "max_band_half_width_pct",
                self.max_band_half_width_pct,
                d.max_band_half_width_pct,
                true,
                MAX_HALF_WIDTH_BOUNDS,
            ),
        }
    }
}

/// Unloaded tire circumference from a `width/aspect Rrim` designation.
///
/// `None` when any dimension is missing, non-finite or non-positive.
pub fn tire_circumference_from_dims(width_mm: f64, aspect_pct: f64, rim_in: f64) -> Option<f64> {
    if ![width_mm, aspect_pct, rim_in].iter().all(|v| v.is_finite() && *v > 0.0) {
        return None;
    }
    let sidewall_mm = width_mm * aspect_pct / 100.0;
    let diameter_m = (rim_in * 25.4 + 2.0 * sidewall_mm) / 1000.0;
    Some(std::f64::consts::PI * diameter_m).filter(|c| *c > 0.0)
}

/// Effective rolling circumference of the configured tire, including the
/// loaded-radius deflection factor.
pub fn tire_circumference_m(vehicle: &VehicleSpec) -> Option<f64> {
    let base = tire_circumference_from_dims(
        vehicle.tire_width_mm,
        vehicle.tire_aspect_pct,
        vehicle.rim_in,
    )?;
    let factor = vehicle.tire_deflection_factor;
    let deflection = if factor.is_finite() && factor > 0.0 { factor } else { 1.0 };
    Some(base * deflection)
}

/// Root-sum-square of the positive relative uncertainties.
pub fn combined_relative_uncertainty(parts: &[f64]) -> f64 {
    parts
        .iter()
        .filter(|p| p.is_finite() && **p > 0.0)
        .map(|p| p * p)
        .sum::<f64>()
        .sqrt()
}

/// Fundamental rotational frequencies at one speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleOrders {
    #[serde(serialize_with = "sanitize::finite")]
    pub wheel_hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub drive_hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub engine_hz: f64,
    /// Relative (fractional) uncertainty of each fundamental
    pub wheel_uncertainty: f64,
    pub drive_uncertainty: f64,
    pub engine_uncertainty: f64,
}

/// Wheel, driveshaft and engine fundamentals for `speed_mps`.
///
/// `None` when the speed is unknown or not positive, or when the tire or
/// gearing cannot produce a positive frequency.
pub fn vehicle_orders(speed_mps: f64, vehicle: &VehicleSpec) -> Option<VehicleOrders> {
    if !speed_mps.is_finite() || speed_mps <= 0.0 {
        return None;
    }
    let circumference = tire_circumference_m(vehicle)?;
    let fd = vehicle.final_drive_ratio;
    let gear = vehicle.current_gear_ratio;
    if !fd.is_finite() || fd <= 0.0 || !gear.is_finite() || gear <= 0.0 {
        return None;
    }

    let wheel_hz = speed_mps / circumference;
    let drive_hz = wheel_hz * fd;
    let engine_hz = drive_hz * gear;
    if ![wheel_hz, drive_hz, engine_hz].iter().all(|v| v.is_finite() && *v > 0.0) {
        return None;
    }

    let pct = |v: f64| v.max(0.0) / 100.0;
    let wheel_uncertainty = combined_relative_uncertainty(&[
        pct(vehicle.speed_uncertainty_pct),
        pct(vehicle.tire_diameter_uncertainty_pct),
    ]);
    let drive_uncertainty = combined_relative_uncertainty(&[
        wheel_uncertainty,
        pct(vehicle.final_drive_uncertainty_pct),
    ]);
    let engine_uncertainty =
        combined_relative_uncertainty(&[drive_uncertainty, pct(vehicle.gear_uncertainty_pct)]);

    Some(VehicleOrders {
        wheel_hz,
        drive_hz,
        engine_hz,
        wheel_uncertainty,
        drive_uncertainty,
        engine_uncertainty,
    })
}

/// Engine speed implied by the road speed and gearing.
pub fn engine_rpm_from_speed(speed_mps: f64, vehicle: &VehicleSpec) -> Option<f64> {
    vehicle_orders(speed_mps, vehicle).map(|o| o.engine_hz * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kmh(v: f64) -> f64 {
        v / 3.6
    }

    #[test]
    fn default_tire_circumference() {
        let c = tire_circumference_m(&VehicleSpec::default()).expect("default tire");
        // 285/30 R21: 704.4 mm diameter
        assert!((c - std::f64::consts::PI * 0.7044).abs() < 1e-9);
    }

    #[test]
    fn orders_at_100_kmh() {
        let o = vehicle_orders(kmh(100.0), &VehicleSpec::default()).expect("orders");
        assert!((o.wheel_hz - 12.552).abs() / 12.552 < 1e-4, "wheel {}", o.wheel_hz);
        assert!((o.drive_hz - 38.662).abs() / 38.662 < 1e-4, "drive {}", o.drive_hz);
        assert!((o.engine_hz - 24.743).abs() / 24.743 < 1e-4, "engine {}", o.engine_hz);
    }

    #[test]
    fn undefined_for_non_positive_speed_or_geometry() {
        let spec = VehicleSpec::default();
        assert!(vehicle_orders(0.0, &spec).is_none());
        assert!(vehicle_orders(-3.0, &spec).is_none());
        assert!(vehicle_orders(f64::NAN, &spec).is_none());

        let bad = VehicleSpec { rim_in: 0.0, ..VehicleSpec::default() };
        assert!(vehicle_orders(kmh(80.0), &bad).is_none());
        let bad = VehicleSpec { final_drive_ratio: -1.0, ..VehicleSpec::default() };
        assert!(vehicle_orders(kmh(80.0), &bad).is_none());
    }

    #[test]
    fn uncertainty_accumulates_down_the_driveline() {
        let o = vehicle_orders(kmh(80.0), &VehicleSpec::default()).expect("orders");
        let expected_wheel = (0.006_f64.powi(2) + 0.012_f64.powi(2)).sqrt();
        assert!((o.wheel_uncertainty - expected_wheel).abs() < 1e-12);
        assert!(o.drive_uncertainty > o.wheel_uncertainty);
        assert!(o.engine_uncertainty > o.drive_uncertainty);
    }

    #[test]
    fn sanitized_replaces_and_clamps() {
        let raw = VehicleSpec {
            tire_width_mm: f64::NAN,
            rim_in: 50.0,
            final_drive_ratio: -2.0,
            tire_deflection_factor: 0.5,
            speed_uncertainty_pct: -1.0,
            ..VehicleSpec::default()
        };
        let clean = raw.sanitized();
        assert_eq!(clean.tire_width_mm, defaults::TIRE_WIDTH_MM);
        assert_eq!(clean.rim_in, 30.0);
        assert_eq!(clean.final_drive_ratio, defaults::FINAL_DRIVE_RATIO);
        assert_eq!(clean.tire_deflection_factor, 0.8);
        assert_eq!(clean.speed_uncertainty_pct, defaults::SPEED_UNCERTAINTY_PCT);
    }

    #[test]
    fn deflection_shrinks_circumference() {
        let loaded = VehicleSpec { tire_deflection_factor: 0.97, ..VehicleSpec::default() };
        let free = tire_circumference_m(&VehicleSpec::default()).unwrap_or_default();
        let c = tire_circumference_m(&loaded).unwrap_or_default();
        assert!((c - free * 0.97).abs() < 1e-12);
    }
}
