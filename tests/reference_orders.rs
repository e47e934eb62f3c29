//! Reference Value Tests
//!
//! Pins the numeric anchors the diagnostics depend on: order frequencies for
//! the default vehicle, severity bucket edges, the strength formula, the
//! hysteresis timing and basic spectral peak placement.

use vibesense::config::{OrderConfig, PhaseConfig, StrengthConfig, VehicleSpec};
use vibesense::orders::{classify_peak, tolerance_hz, vehicle_orders, Hypothesis};
use vibesense::phase::{segment_run, DrivingPhase};
use vibesense::processing::{extract_peaks, rfft_frequencies, FftKernel};
use vibesense::strength::{
    bucket_for, severity_from_peak, strength_db, SeverityState, StrengthBucket,
};
use vibesense::RunSample;

fn kmh(v: f64) -> f64 {
    v / 3.6
}

fn assert_rel(actual: f64, expected: f64, rel: f64) {
    let err = (actual - expected).abs() / expected.abs();
    assert!(err <= rel, "expected {expected}, got {actual} (rel err {err:.2e})");
}

// ============================================================================
// Order Frequencies
// ============================================================================

#[test]
fn default_vehicle_orders_at_100_kmh() {
    let orders =
        vehicle_orders(kmh(100.0), &VehicleSpec::default()).expect("default vehicle has orders");
    assert_rel(orders.wheel_hz, 12.552, 1e-4);
    assert_rel(orders.drive_hz, 38.662, 1e-4);
    assert_rel(orders.engine_hz, 24.743, 1e-4);
}

#[test]
fn orders_scale_linearly_with_speed() {
    let vehicle = VehicleSpec::default();
    let slow = vehicle_orders(kmh(50.0), &vehicle).expect("orders at 50");
    let fast = vehicle_orders(kmh(100.0), &vehicle).expect("orders at 100");
    assert_rel(fast.wheel_hz / slow.wheel_hz, 2.0, 1e-12);
    assert_rel(fast.engine_hz / slow.engine_hz, 2.0, 1e-12);
}

#[test]
fn broken_gearing_yields_no_orders() {
    let mut vehicle = VehicleSpec::default();
    vehicle.final_drive_ratio = 0.0;
    assert!(vehicle_orders(kmh(80.0), &vehicle).is_none());

    let vehicle = VehicleSpec { rim_in: -1.0, ..VehicleSpec::default() };
    assert!(vehicle_orders(kmh(80.0), &vehicle).is_none());
    assert!(vehicle_orders(0.0, &VehicleSpec::default()).is_none());
    assert!(vehicle_orders(f64::NAN, &VehicleSpec::default()).is_none());
}

#[test]
fn wheel_path_widens_tolerance_by_sqrt_compliance() {
    let vehicle = VehicleSpec::default();
    let orders = vehicle_orders(kmh(100.0), &vehicle).expect("orders");
    let tolerance = |compliance| {
        tolerance_hz(
            vehicle.wheel_bandwidth_pct,
            orders.wheel_hz,
            orders.wheel_uncertainty,
            compliance,
            &vehicle,
        )
    };
    let rigid = tolerance(1.0);
    let compliant = tolerance(1.5);
    assert_rel(compliant / rigid, 1.5f64.sqrt(), 1e-9);
}

#[test]
fn exact_wheel_peak_classifies_as_wheel_order() {
    let vehicle = VehicleSpec::default();
    let orders = vehicle_orders(kmh(100.0), &vehicle).expect("orders");
    let class = classify_peak(orders.wheel_hz, Some(kmh(100.0)), &vehicle, &OrderConfig::default());
    assert_eq!(class.hypothesis, Hypothesis::Wheel1);
}

// ============================================================================
// Strength and Buckets
// ============================================================================

#[test]
fn bucket_boundaries_are_inclusive_lower_edges() {
    let thresholds = StrengthConfig::default().band_thresholds_db;
    assert_eq!(thresholds, [8.0, 16.0, 26.0, 36.0, 46.0]);

    assert_eq!(bucket_for(7.999, &thresholds), None);
    assert_eq!(bucket_for(8.0, &thresholds), Some(StrengthBucket::L1));
    assert_eq!(bucket_for(16.0, &thresholds), Some(StrengthBucket::L2));
    assert_eq!(bucket_for(25.9, &thresholds), Some(StrengthBucket::L2));
    assert_eq!(bucket_for(26.0, &thresholds), Some(StrengthBucket::L3));
    assert_eq!(bucket_for(36.0, &thresholds), Some(StrengthBucket::L4));
    assert_eq!(bucket_for(46.0, &thresholds), Some(StrengthBucket::L5));
    assert_eq!(bucket_for(120.0, &thresholds), Some(StrengthBucket::L5));
    assert_eq!(bucket_for(f64::NAN, &thresholds), None);
}

#[test]
fn strength_is_zero_at_floor_and_monotonic_above() {
    let cfg = StrengthConfig::default();
    assert!(strength_db(0.01, 0.01, &cfg).abs() < 1e-9);

    let mut prev = f64::NEG_INFINITY;
    for band in [0.01, 0.02, 0.05, 0.1, 0.5, 1.0] {
        let db = strength_db(band, 0.01, &cfg);
        assert!(db > prev, "strength must grow with band level");
        prev = db;
    }
    assert_rel(strength_db(0.1, 0.01, &cfg), 20.0 * (0.1005f64 / 0.0105).log10(), 1e-9);
}

#[test]
fn strength_stays_finite_on_degenerate_input() {
    let cfg = StrengthConfig::default();
    assert!(strength_db(0.05, 0.0, &cfg).is_finite());
    assert!(strength_db(0.0, 0.0, &cfg).abs() < 1e-9);
    assert!(strength_db(f64::NAN, 0.01, &cfg).is_finite());
    assert!(strength_db(0.05, f64::INFINITY, &cfg).is_finite());
}

// ============================================================================
// Hysteresis
// ============================================================================

#[test]
fn escalation_is_immediate_and_demotion_waits_for_decay_ticks() {
    let cfg = StrengthConfig::default();
    let mut state = SeverityState::Quiet;

    let steps = [
        (10.0, StrengthBucket::L1),
        (20.0, StrengthBucket::L2),
        (30.0, StrengthBucket::L3),
    ];
    for (db, expected) in steps {
        let out = severity_from_peak(db, 1, state, &cfg);
        assert!(out.escalated, "{db} dB should escalate");
        assert_eq!(out.bucket, Some(expected));
        state = out.state;
    }

    // Four low ticks hold the bucket, the fifth demotes
    for tick in 1..cfg.decay_ticks {
        let out = severity_from_peak(0.0, 1, state, &cfg);
        assert_eq!(out.bucket, Some(StrengthBucket::L3), "demoted early at tick {tick}");
        assert!(!out.escalated);
        state = out.state;
    }
    let out = severity_from_peak(0.0, 1, state, &cfg);
    assert_eq!(out.bucket, None);
    assert!(!out.escalated);
}

#[test]
fn dip_inside_hysteresis_band_never_demotes() {
    let cfg = StrengthConfig::default();
    let mut state = severity_from_peak(27.0, 1, SeverityState::Quiet, &cfg).state;
    for _ in 0..20 {
        // 25 dB is below the l3 edge but within the 2 dB band
        state = severity_from_peak(25.0, 1, state, &cfg).state;
    }
    assert_eq!(state.bucket(), Some(StrengthBucket::L3));
}

#[test]
fn corroboration_lifts_a_borderline_peak() {
    let cfg = StrengthConfig::default();
    let single = severity_from_peak(14.0, 1, SeverityState::Quiet, &cfg);
    let multi = severity_from_peak(14.0, 2, SeverityState::Quiet, &cfg);
    assert_eq!(single.bucket, Some(StrengthBucket::L1));
    assert_eq!(multi.bucket, Some(StrengthBucket::L2));
}

// ============================================================================
// Phase Segmentation
// ============================================================================

fn sample_at(t_s: f64, speed_kmh: f64) -> RunSample {
    RunSample { t_s, speed_kmh: Some(speed_kmh), ..Default::default() }
}

#[test]
fn identical_samples_form_one_segment() {
    let samples: Vec<RunSample> = (0..10).map(|i| sample_at(f64::from(i), 80.0)).collect();
    let seg = segment_run(&samples, &PhaseConfig::default());
    assert_eq!(seg.segments.len(), 1);
    assert_eq!(seg.segments[0].phase, DrivingPhase::Cruise);
    assert_eq!(seg.segments[0].sample_count, 10);
}

#[test]
fn idle_then_cruise_yields_both_segments() {
    let mut samples: Vec<RunSample> = (0..5).map(|i| sample_at(f64::from(i), 0.0)).collect();
    samples.extend((5..10).map(|i| sample_at(f64::from(i), 60.0)));
    let seg = segment_run(&samples, &PhaseConfig::default());

    let phases: Vec<DrivingPhase> = seg.segments.iter().map(|s| s.phase).collect();
    assert_eq!(phases.first(), Some(&DrivingPhase::Idle));
    assert_eq!(phases.last(), Some(&DrivingPhase::Cruise));
    let covered: usize = seg.segments.iter().map(|s| s.sample_count).sum();
    assert_eq!(covered, samples.len());
}

// ============================================================================
// Spectral Peaks
// ============================================================================

#[test]
fn tone_peak_lands_within_one_bin() {
    let n = 2048;
    let fs = 800.0;
    let tone_hz = 37.3;
    let block: Vec<f64> = (0..n)
        .map(|i| 0.2 * (2.0 * std::f64::consts::PI * tone_hz * i as f64 / fs).sin())
        .collect();
    let amps = FftKernel::new(n).amplitude(&block);
    let freqs = rfft_frequencies(n, fs);

    let peaks = extract_peaks(&freqs, &amps, 3, 1);
    let bin_width = fs / n as f64;
    assert_eq!(peaks.len(), 1);
    assert!((peaks[0].hz - tone_hz).abs() <= bin_width, "peak at {} Hz", peaks[0].hz);
    // Hann scalloping loses at most ~1.4 dB
    assert!(peaks[0].amp > 0.2 * 0.8 && peaks[0].amp < 0.2 * 1.01);
}

#[test]
fn rising_edge_peak_at_last_bin_is_detected() {
    let freqs: Vec<f64> = (0..16).map(f64::from).collect();
    let amps: Vec<f64> = (0..16).map(|i| 0.001 * f64::from(i)).collect();
    let peaks = extract_peaks(&freqs, &amps, 3, 2);
    assert_eq!(peaks.first().map(|p| p.hz), Some(15.0));
}
