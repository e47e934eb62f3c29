//! Order-tracking findings
//!
//! Each wheel, driveshaft and engine order hypothesis is tracked across the
//! run: for every sample the predicted frequency is compared against the
//! nearest recorded peak. Hypotheses with enough coverage and a high enough
//! match rate become findings, scored by [`order_confidence`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::debug;

use super::confidence::{error_score, order_confidence, snr_score, OrderConfidenceInputs};
use super::localization::{detect_diffuse_excitation, summarize_locations, LocationMatchStats};
use super::speed_profile::{speed_bin, speed_bin_label, speed_profile, SpeedPoint};
use super::{
    sample_floor, sample_peaks, AnalysisContext, Finding, FindingKind, FindingSeverity,
    MatchedPoint, OrderEvidence, PhaseEvidence,
};
use crate::config::OrderConfig;
use crate::phase::DrivingPhase;
use crate::strength::strength_db;
use crate::types::{ConfidenceLabel, LocationHypothesis, RunMetadata, RunSample, VibrationSource};

// ============================================================================
// Hypotheses
// ============================================================================

/// Rotating component an order hypothesis refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBase {
    Wheel,
    Driveshaft,
    Engine,
}

/// `order` x the fundamental of `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OrderHypothesis {
    pub base: OrderBase,
    pub order: u32,
}

impl OrderHypothesis {
    pub const ALL: [Self; 6] = [
        Self { base: OrderBase::Wheel, order: 1 },
        Self { base: OrderBase::Wheel, order: 2 },
        Self { base: OrderBase::Driveshaft, order: 1 },
        Self { base: OrderBase::Driveshaft, order: 2 },
        Self { base: OrderBase::Engine, order: 1 },
        Self { base: OrderBase::Engine, order: 2 },
    ];

    fn base_name(self) -> &'static str {
        match self.base {
            OrderBase::Wheel => "wheel",
            OrderBase::Driveshaft => "driveshaft",
            OrderBase::Engine => "engine",
        }
    }

    /// Stable key, e.g. `wheel_1x`.
    pub fn key(self) -> String {
        format!("{}_{}x", self.base_name(), self.order)
    }

    /// Display label, e.g. `1x wheel order`.
    pub fn label(self) -> String {
        format!("{}x {} order", self.order, self.base_name())
    }

    pub fn source(self) -> VibrationSource {
        match self.base {
            OrderBase::Wheel => VibrationSource::WheelTire,
            OrderBase::Driveshaft => VibrationSource::Driveline,
            OrderBase::Engine => VibrationSource::Engine,
        }
    }

    /// Wheel orders reach the sensor through the suspension and drift more.
    pub fn path_compliance(self, cfg: &OrderConfig) -> f64 {
        match self.base {
            OrderBase::Wheel => cfg.wheel_path_compliance,
            OrderBase::Driveshaft | OrderBase::Engine => cfg.rigid_path_compliance,
        }
    }

    /// Predicted frequency for one sample and the reference it came from.
    pub fn predicted_hz(
        self,
        sample: &RunSample,
        metadata: &RunMetadata,
    ) -> Option<(f64, &'static str)> {
        let order = f64::from(self.order);
        let (hz, reference) = match self.base {
            OrderBase::Wheel => (wheel_hz(sample, metadata)?, "speed+tire"),
            OrderBase::Driveshaft => {
                let fd = positive(metadata.final_drive_ratio)?;
                (wheel_hz(sample, metadata)? * fd, "speed+tire+final_drive")
            }
            OrderBase::Engine => {
                let (rpm, reference) = effective_engine_rpm(sample, metadata)?;
                (rpm / 60.0, reference)
            }
        };
        Some((hz * order, reference)).filter(|(hz, _)| hz.is_finite() && *hz > 0.0)
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn wheel_hz(sample: &RunSample, metadata: &RunMetadata) -> Option<f64> {
    let circumference = positive(metadata.tire_circumference_m)?;
    Some(sample.speed_mps()? / circumference)
}

/// Measured engine RPM, or RPM derived from speed and gearing.
pub fn effective_engine_rpm(
    sample: &RunSample,
    metadata: &RunMetadata,
) -> Option<(f64, &'static str)> {
    if let Some(rpm) = positive(sample.engine_rpm) {
        return Some((rpm, "measured_rpm"));
    }
    let fd = positive(metadata.final_drive_ratio)?;
    let gear = positive(metadata.current_gear_ratio)?;
    let rpm = wheel_hz(sample, metadata)? * fd * gear * 60.0;
    Some((rpm, "speed+tire+gearing")).filter(|(rpm, _)| *rpm > 0.0)
}

/// |Pearson r| clamped to [0, 1]; `None` when either side has no variance.
pub fn abs_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let nf = n as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();
    let sum_y2: f64 = y.iter().map(|b| b * b).sum();

    let numerator = nf * sum_xy - sum_x * sum_y;
    let denominator = ((nf * sum_x2 - sum_x.powi(2)) * (nf * sum_y2 - sum_y.powi(2))).sqrt();
    if !denominator.is_finite() || denominator <= 1e-12 {
        return None;
    }
    Some((numerator / denominator).abs().min(1.0))
}

/// Follow-up checks suggested for a source.
pub fn quick_checks(source: VibrationSource) -> Vec<String> {
    let checks: &[&str] = match source {
        VibrationSource::WheelTire => &[
            "Check wheel balance and radial/lateral runout",
            "Inspect tires for flat spots, bulges or uneven wear",
            "Verify wheel bolt torque and hub seating",
        ],
        VibrationSource::Driveline => &[
            "Inspect driveshaft joints and center bearing",
            "Check driveline mounts and fasteners",
        ],
        VibrationSource::Engine => &[
            "Inspect engine and transmission mounts",
            "Check accessory drive and combustion quality",
        ],
        VibrationSource::BodyResonance | VibrationSource::Unknown => {
            &["Perform a general mechanical inspection"]
        }
    };
    checks.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Tracking
// ============================================================================

#[derive(Default)]
struct Tracking {
    possible: usize,
    matched: usize,
    amps: Vec<f64>,
    floors: Vec<f64>,
    rel_errors: Vec<f64>,
    predicted: Vec<f64>,
    measured: Vec<f64>,
    points: Vec<MatchedPoint>,
    references: BTreeSet<&'static str>,
    by_bin: BTreeMap<i64, LocationMatchStats>,
    by_location: BTreeMap<crate::types::SensorLocation, LocationMatchStats>,
    by_phase: BTreeMap<DrivingPhase, LocationMatchStats>,
}

fn track(
    ctx: &AnalysisContext<'_>,
    hypothesis: OrderHypothesis,
    peaks: &[Vec<(f64, f64)>],
) -> Tracking {
    let cfg = &ctx.engine.findings;
    let compliance_scale = hypothesis.path_compliance(&ctx.engine.orders).sqrt();
    let mut t = Tracking::default();

    for (idx, sample) in ctx.samples.iter().enumerate() {
        let sample_peaks = &peaks[idx];
        if sample_peaks.is_empty() {
            continue;
        }
        let Some((predicted, reference)) = hypothesis.predicted_hz(sample, ctx.metadata) else {
            continue;
        };
        let phase = ctx.phases.get(idx).copied();
        let bin = sample.speed_kmh.and_then(|v| speed_bin(v, cfg.speed_bin_width_kmh));

        t.possible += 1;
        t.references.insert(reference);
        if let Some(loc) = sample.location {
            t.by_location.entry(loc).or_default().possible += 1;
        }
        if let Some(bin) = bin {
            t.by_bin.entry(bin).or_default().possible += 1;
        }
        if let Some(phase) = phase {
            t.by_phase.entry(phase).or_default().possible += 1;
        }

        let tolerance = cfg
            .order_tolerance_min_hz
            .max(predicted * cfg.order_tolerance_rel * compliance_scale);
        let Some(&(hz, amp)) = sample_peaks
            .iter()
            .min_by(|a, b| (a.0 - predicted).abs().total_cmp(&(b.0 - predicted).abs()))
        else {
            continue;
        };
        let delta = (hz - predicted).abs();
        if delta > tolerance {
            continue;
        }

        t.matched += 1;
        if let Some(loc) = sample.location {
            t.by_location.entry(loc).or_default().matched += 1;
        }
        if let Some(bin) = bin {
            t.by_bin.entry(bin).or_default().matched += 1;
        }
        if let Some(phase) = phase {
            t.by_phase.entry(phase).or_default().matched += 1;
        }
        let rel_error = delta / predicted.max(1e-9);
        t.rel_errors.push(rel_error);
        t.amps.push(amp);
        t.floors.push(sample_floor(sample).unwrap_or(0.0).max(0.0));
        t.predicted.push(predicted);
        t.measured.push(hz);
        t.points.push(MatchedPoint {
            t_s: sample.t_s,
            speed_kmh: sample.speed_kmh,
            predicted_hz: predicted,
            matched_hz: hz,
            rel_error,
            amp,
            location: sample.location,
            phase,
        });
    }
    t
}

struct EffectiveRate {
    rate: f64,
    focused_bin: Option<i64>,
    per_location_dominant: bool,
}

/// Rescue a diluted global match rate from the highest speed bin, then from
/// the best-covered single location.
fn effective_match_rate(ctx: &AnalysisContext<'_>, t: &Tracking, min_rate: f64) -> EffectiveRate {
    let cfg = &ctx.engine.findings;
    let mut out = EffectiveRate {
        rate: t.matched as f64 / t.possible.max(1) as f64,
        focused_bin: None,
        per_location_dominant: false,
    };
    if out.rate < min_rate {
        if let Some((&bin, stats)) = t.by_bin.iter().next_back() {
            let rate = stats.matched as f64 / stats.possible.max(1) as f64;
            let min_possible = cfg.min_match_points.max(cfg.min_coverage_points / 2);
            if stats.possible >= min_possible
                && stats.matched >= cfg.min_match_points
                && rate >= min_rate
            {
                out.rate = rate;
                out.focused_bin = Some(bin);
            }
        }
    }
    if out.rate < min_rate {
        let best = t
            .by_location
            .values()
            .filter(|s| s.possible >= cfg.min_coverage_points && s.matched >= cfg.min_match_points)
            .map(|s| s.matched as f64 / s.possible.max(1) as f64)
            .fold(0.0, f64::max);
        if best >= min_rate {
            out.rate = best;
            out.per_location_dominant = true;
        }
    }
    out
}

fn phase_evidence(t: &Tracking, min_rate: f64, min_points: usize) -> PhaseEvidence {
    let phases: Vec<DrivingPhase> = t.points.iter().filter_map(|p| p.phase).collect();
    let cruise = phases.iter().filter(|p| **p == DrivingPhase::Cruise).count();
    let cruise_fraction = if phases.is_empty() { 0.0 } else { cruise as f64 / phases.len() as f64 };
    let phases_detected: Vec<DrivingPhase> =
        phases.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

    let mut onset: BTreeMap<DrivingPhase, usize> = BTreeMap::new();
    for p in phases.iter().filter(|p| p.is_transient()) {
        *onset.entry(*p).or_default() += 1;
    }
    let onset_total: usize = onset.values().sum();
    let n_points = t.points.len();
    let dominant_phase = if onset_total > 0 && onset_total >= (n_points / 2).max(2) {
        onset
            .iter()
            .max_by_key(|(_, count)| **count)
            .filter(|(_, count)| **count as f64 / n_points as f64 >= 0.5)
            .map(|(phase, _)| *phase)
    } else {
        None
    };

    let mut per_phase_match_rate = BTreeMap::new();
    let mut phases_with_evidence = 0;
    for (phase, stats) in &t.by_phase {
        let rate = stats.matched as f64 / stats.possible.max(1) as f64;
        per_phase_match_rate.insert(*phase, rate);
        if stats.matched >= min_points && rate >= min_rate {
            phases_with_evidence += 1;
        }
    }

    PhaseEvidence {
        cruise_fraction,
        phases_detected,
        dominant_phase,
        per_phase_match_rate,
        phases_with_evidence,
    }
}

// ============================================================================
// Findings
// ============================================================================

/// Order findings plus every peak frequency an order candidate matched.
#[derive(Debug, Default)]
pub struct OrderAnalysis {
    /// Strongest first, engine aliases suppressed, below-confidence dropped
    pub findings: Vec<Finding>,
    /// Matched peak frequencies of every accepted candidate, including the
    /// ones later dropped for low confidence or the findings cap
    pub claimed_hz: Vec<f64>,
}

/// Order findings for the run.
pub fn build_order_findings(ctx: &AnalysisContext<'_>) -> OrderAnalysis {
    if ctx.metadata.raw_sample_rate_hz.map_or(true, |r| r == 0) {
        return OrderAnalysis::default();
    }
    let cfg = &ctx.engine.findings;
    let peaks: Vec<Vec<(f64, f64)>> = ctx.samples.iter().map(sample_peaks).collect();

    let mut findings = Vec::new();
    for hypothesis in OrderHypothesis::ALL {
        let needs_tire = matches!(hypothesis.base, OrderBase::Wheel | OrderBase::Driveshaft);
        let tire_known = positive(ctx.metadata.tire_circumference_m).is_some();
        if needs_tire && !(ctx.speed_sufficient && tire_known) {
            continue;
        }
        if hypothesis.base == OrderBase::Engine && !ctx.engine_ref_sufficient {
            continue;
        }
        let tracking = track(ctx, hypothesis, &peaks);
        if let Some(finding) = finding_from_tracking(ctx, hypothesis, &tracking) {
            findings.push(finding);
        } else {
            debug!(
                hypothesis = %hypothesis.key(),
                possible = tracking.possible,
                matched = tracking.matched,
                "[Findings] Order hypothesis rejected"
            );
        }
    }

    let claimed_hz = findings
        .iter()
        .flat_map(|f| f.matched_points.iter().map(|p| p.matched_hz))
        .filter(|hz| hz.is_finite() && *hz > 0.0)
        .collect();

    suppress_engine_aliases(&mut findings);
    findings.retain(|f| f.confidence.unwrap_or(0.0) >= cfg.min_confidence);
    findings.truncate(cfg.max_order_findings);
    OrderAnalysis { findings, claimed_hz }
}

fn finding_from_tracking(
    ctx: &AnalysisContext<'_>,
    hypothesis: OrderHypothesis,
    t: &Tracking,
) -> Option<Finding> {
    let cfg = &ctx.engine.findings;
    if t.possible < cfg.min_coverage_points || t.matched < cfg.min_match_points {
        return None;
    }
    let constant_speed = ctx.speed_stats.is_constant(cfg);
    let min_rate = if constant_speed {
        cfg.constant_speed_min_match_rate
    } else {
        cfg.min_match_rate
    };
    let effective = effective_match_rate(ctx, t, min_rate);
    if effective.rate < min_rate {
        return None;
    }
    let global_rate = t.matched as f64 / t.possible.max(1) as f64;
    let phase_ev = phase_evidence(t, min_rate, cfg.min_match_points);

    let mean_amp = if t.amps.is_empty() { 0.0 } else { t.amps.iter().mean() };
    let mean_floor = if t.floors.is_empty() { 0.0 } else { t.floors.iter().mean() };
    let mean_rel_err = if t.rel_errors.is_empty() { 1.0 } else { t.rel_errors.iter().mean() };
    let correlation = if constant_speed || t.points.len() < 3 {
        None
    } else {
        abs_correlation(&t.predicted, &t.measured)
    };

    // Localization
    let source = hypothesis.source();
    let summary = summarize_locations(
        &t.points,
        effective.focused_bin,
        &ctx.connected,
        source,
        cfg,
        &ctx.engine.strength,
    );
    let mut weak = summary.as_ref().map_or(true, |s| s.weak_spatial_separation);
    let dominance_ratio = summary.as_ref().map(|s| s.dominance_ratio);
    let mut localization_confidence = summary.as_ref().map_or(0.05, |s| s.localization_confidence);
    let no_wheel_sensors = summary.as_ref().is_some_and(|s| s.no_wheel_sensors);
    let mut location = summary.as_ref().map_or(LocationHypothesis::Unknown, |s| s.hypothesis());

    // One matching location out of several connected ones is itself spatial
    // evidence: the others saw the same order and stayed quiet.
    let unique: BTreeSet<_> = t.points.iter().filter_map(|p| p.location).collect();
    let n_connected = ctx.connected.len();
    if unique.len() == 1 && n_connected >= 2 && !no_wheel_sensors {
        let extra = (n_connected - 1) as f64;
        localization_confidence = if effective.per_location_dominant {
            (0.50 + 0.15 * extra).min(1.0)
        } else {
            localization_confidence.max((0.40 + 0.10 * extra).min(1.0))
        };
        weak = false;
        if let Some(only) = unique.iter().next() {
            location = LocationHypothesis::Localized { location: *only };
        }
    }

    let compliance = hypothesis.path_compliance(&ctx.engine.orders);
    let mems = cfg.mems_noise_floor_g;
    let err_score = error_score(mean_rel_err, compliance);
    let snr = snr_score(mean_amp, mean_floor, mems);
    let strength = strength_db(mean_amp, mean_floor.max(mems), &ctx.engine.strength);

    let diffuse_penalty = detect_diffuse_excitation(&ctx.connected, &t.by_location, &t.points, cfg);
    if diffuse_penalty.is_some() {
        location = LocationHypothesis::Diffuse;
    }

    let thresholds = &ctx.engine.strength.band_thresholds_db;
    let confidence = order_confidence(&OrderConfidenceInputs {
        match_rate: effective.rate,
        error_score: err_score,
        correlation: correlation.unwrap_or(0.0),
        snr_score: snr,
        strength_db: strength,
        localization_confidence,
        weak_spatial_separation: weak,
        dominance_ratio,
        no_wheel_sensors,
        constant_speed,
        steady_speed: ctx.speed_stats.steady_speed,
        matched: t.matched,
        corroborating_locations: unique.len(),
        phases_with_evidence: phase_ev.phases_with_evidence,
        diffuse_penalty,
        connected_locations: n_connected,
        path_compliance: compliance,
        negligible_db: thresholds[0],
        light_db: thresholds[1],
    });
    let ranking_score = effective.rate * (mean_amp / mean_floor.max(mems)).ln_1p() * err_score;

    let speed_points: Vec<SpeedPoint> = t
        .points
        .iter()
        .filter_map(|p| Some(SpeedPoint { speed_kmh: p.speed_kmh?, amp: p.amp, phase: p.phase }))
        .collect();
    let mut profile = speed_profile(&speed_points, effective.focused_bin, cfg.speed_bin_width_kmh);
    if profile.strongest_speed_band.is_none() {
        profile.strongest_speed_band = summary
            .as_ref()
            .map(|s| s.speed_range.clone())
            .or_else(|| effective.focused_bin.map(|b| speed_bin_label(b, cfg.speed_bin_width_kmh)));
    }

    let references: Vec<&str> = t.references.iter().copied().collect();
    let mut evidence_summary = format!(
        "{} tracked in {}/{} samples ({:.0}% match), mean relative error {:.3} ({})",
        hypothesis.label(),
        t.matched,
        t.possible,
        effective.rate * 100.0,
        mean_rel_err,
        references.join(", "),
    );
    if let Some(s) = &summary {
        evidence_summary.push_str(&format!(
            "; strongest at {} in {} (dominance {:.2}{})",
            s.top_location,
            s.speed_range,
            s.dominance_ratio,
            if weak { ", weak spatial separation" } else { "" }
        ));
    }

    Some(Finding {
        finding_id: String::new(),
        finding_key: hypothesis.key(),
        kind: FindingKind::Order,
        severity: FindingSeverity::Diagnostic,
        source,
        frequency: hypothesis.label(),
        evidence_summary,
        confidence: Some(confidence),
        confidence_label: Some(ConfidenceLabel::from_confidence(confidence)),
        location,
        strongest_location: summary.as_ref().map(|s| s.top_location),
        speed_profile: profile,
        vibration_strength_db: Some(strength),
        phase_evidence: Some(phase_ev),
        order_evidence: Some(OrderEvidence {
            match_rate: effective.rate,
            global_match_rate: global_rate,
            focused_speed_band: effective
                .focused_bin
                .map(|b| speed_bin_label(b, cfg.speed_bin_width_kmh)),
            mean_relative_error: mean_rel_err,
            possible_samples: t.possible,
            matched_samples: t.matched,
            frequency_correlation: correlation,
            dominance_ratio,
            localization_confidence,
            weak_spatial_separation: weak,
            corroborating_locations: unique.len(),
            diffuse_excitation: diffuse_penalty.is_some(),
            no_wheel_sensors,
            localization: summary,
        }),
        peak_classification: None,
        peak_evidence: None,
        quick_checks: quick_checks(source),
        matched_points: t.points.clone(),
        ranking_score,
    })
}

/// Engine orders within 15 % of the best wheel confidence are most likely
/// harmonics of that wheel order.
fn suppress_engine_aliases(findings: &mut [Finding]) {
    let best_wheel = findings
        .iter()
        .filter(|f| f.source == VibrationSource::WheelTire)
        .filter_map(|f| f.confidence)
        .fold(0.0, f64::max);
    if best_wheel > 0.0 {
        for f in findings.iter_mut().filter(|f| f.source == VibrationSource::Engine) {
            if let Some(c) = f.confidence.filter(|c| *c <= best_wheel * 1.15) {
                let suppressed = c * 0.60;
                f.confidence = Some(suppressed);
                f.confidence_label = Some(ConfidenceLabel::from_confidence(suppressed));
                f.ranking_score *= 0.60;
                debug!(
                    key = %f.finding_key,
                    confidence = suppressed,
                    "[Findings] Engine order suppressed as wheel alias"
                );
            }
        }
    }
    findings.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_metadata() -> RunMetadata {
        RunMetadata {
            tire_circumference_m: Some(2.2),
            final_drive_ratio: Some(3.08),
            current_gear_ratio: Some(0.64),
            raw_sample_rate_hz: Some(800),
        }
    }

    #[test]
    fn hypothesis_keys_and_sources() {
        let keys: Vec<String> = OrderHypothesis::ALL.iter().map(|h| h.key()).collect();
        assert_eq!(
            keys,
            ["wheel_1x", "wheel_2x", "driveshaft_1x", "driveshaft_2x", "engine_1x", "engine_2x"]
        );
        assert_eq!(OrderHypothesis::ALL[3].source(), VibrationSource::Driveline);
        assert_eq!(OrderHypothesis::ALL[0].label(), "1x wheel order");
    }

    #[test]
    fn predicted_frequencies() {
        let md = make_metadata();
        let sample = RunSample { speed_kmh: Some(79.2), ..Default::default() };
        // 22 m/s over 2.2 m = 10 Hz
        let (wheel, _) = OrderHypothesis::ALL[0].predicted_hz(&sample, &md).unwrap_or_default();
        assert!((wheel - 10.0).abs() < 1e-9);
        let (shaft2, _) = OrderHypothesis::ALL[3].predicted_hz(&sample, &md).unwrap_or_default();
        assert!((shaft2 - 61.6).abs() < 1e-9);
        let (engine, reference) =
            OrderHypothesis::ALL[4].predicted_hz(&sample, &md).unwrap_or_default();
        assert!((engine - 10.0 * 3.08 * 0.64).abs() < 1e-9);
        assert_eq!(reference, "speed+tire+gearing");
    }

    #[test]
    fn measured_rpm_takes_priority() {
        let md = make_metadata();
        let sample = RunSample {
            speed_kmh: Some(79.2),
            engine_rpm: Some(1800.0),
            ..Default::default()
        };
        let (engine, reference) =
            OrderHypothesis::ALL[4].predicted_hz(&sample, &md).unwrap_or_default();
        assert!((engine - 30.0).abs() < 1e-9);
        assert_eq!(reference, "measured_rpm");
    }

    #[test]
    fn no_speed_no_prediction() {
        let md = make_metadata();
        let sample = RunSample::default();
        assert!(OrderHypothesis::ALL[0].predicted_hz(&sample, &md).is_none());
        assert!(effective_engine_rpm(&sample, &md).is_none());
    }

    #[test]
    fn correlation_is_clamped_and_guarded() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [8.0, 6.0, 4.0, 2.0];
        let r = abs_correlation(&x, &y).unwrap_or_default();
        assert!((r - 1.0).abs() < 1e-9);
        assert!(abs_correlation(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(abs_correlation(&[1.0], &[1.0]).is_none());
    }
}
