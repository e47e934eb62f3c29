//! Run-level findings engine
//!
//! Turns a completed run (an ordered sequence of [`RunSample`]s) into ranked
//! [`Finding`]s:
//!
//! ```text
//! samples ──► speed stats ──► reference checks ──► REF_* findings
//!    │
//!    └──► phase segmentation ──► idle mask ──► order tracking ──► order findings
//!                                           └──► frequency bins ─► peak findings
//! ```
//!
//! Order findings claim their matched frequencies so the same energy is not
//! reported twice as a persistent peak. The final list is ordered reference,
//! diagnostic, informational, and receives `F001...` ids.

mod confidence;
mod localization;
mod order_findings;
mod persistent;
mod reference;
mod speed_profile;

pub use confidence::{
    order_confidence, peak_confidence, OrderConfidenceInputs, PeakConfidenceInputs,
};
pub use localization::{connected_locations, summarize_locations, LocationSummary};
pub use order_findings::{effective_engine_rpm, OrderBase, OrderHypothesis};
pub use persistent::{classify_peak, run_noise_baseline, PeakEvidence};
pub use reference::{check_references, ReferenceCheck, ReferenceStatus};
pub use speed_profile::{
    phase_breakdown, speed_breakdown, speed_profile, PhaseBreakdownRow, SpeedBandRow, SpeedPoint,
    SpeedProfile, SpeedStats,
};

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::defaults::{MAX_PEAKS_PER_SAMPLE, MIN_DIAGNOSTIC_SAMPLES};
use crate::config::{DiagnosticsConfig, FindingsConfig, OrderConfig, PhaseConfig, StrengthConfig};
use crate::phase::{
    diagnostic_sample_mask, phase_summary, segment_run, DrivingPhase, PhaseSegment, PhaseSummary,
};
use crate::sanitize;
use crate::strength::percentile;
use crate::types::{
    ConfidenceLabel, LocationHypothesis, RunMetadata, RunSample, SensorLocation, VibrationSource,
};

// ============================================================================
// Finding Types
// ============================================================================

/// One sample where an order hypothesis matched a recorded peak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPoint {
    #[serde(serialize_with = "sanitize::finite")]
    pub t_s: f64,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub speed_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite")]
    pub predicted_hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub matched_hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub rel_error: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub amp: f64,
    pub location: Option<SensorLocation>,
    pub phase: Option<DrivingPhase>,
}

/// Character of a non-order peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakClassification {
    /// Frequent and steady
    Patterned,
    /// Present often enough to matter, less regular
    Persistent,
    /// Rare or bursty
    Transient,
    /// Indistinguishable from the measurement floor
    BaselineNoise,
}

impl PeakClassification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patterned => "patterned",
            Self::Persistent => "persistent",
            Self::Transient => "transient",
            Self::BaselineNoise => "baseline_noise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Reference,
    Order,
    Peak,
}

/// Output group; also the primary sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Reference,
    Diagnostic,
    Info,
}

/// How a finding's evidence is spread over driving phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseEvidence {
    #[serde(serialize_with = "sanitize::finite")]
    pub cruise_fraction: f64,
    pub phases_detected: Vec<DrivingPhase>,
    /// Transient phase holding at least half of the matches
    pub dominant_phase: Option<DrivingPhase>,
    pub per_phase_match_rate: BTreeMap<DrivingPhase, f64>,
    pub phases_with_evidence: usize,
}

/// Order-tracking statistics behind an order finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderEvidence {
    #[serde(serialize_with = "sanitize::finite")]
    pub match_rate: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub global_match_rate: f64,
    pub focused_speed_band: Option<String>,
    #[serde(serialize_with = "sanitize::finite")]
    pub mean_relative_error: f64,
    pub possible_samples: usize,
    pub matched_samples: usize,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub frequency_correlation: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub dominance_ratio: Option<f64>,
    #[serde(serialize_with = "sanitize::finite")]
    pub localization_confidence: f64,
    pub weak_spatial_separation: bool,
    pub corroborating_locations: usize,
    pub diffuse_excitation: bool,
    pub no_wheel_sensors: bool,
    pub localization: Option<LocationSummary>,
}

/// A ranked diagnostic conclusion about the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// `REF_*` for reference findings, `F001...` otherwise
    pub finding_id: String,
    pub finding_key: String,
    pub kind: FindingKind,
    pub severity: FindingSeverity,
    pub source: VibrationSource,
    /// Order label or frequency, e.g. `1x wheel order` or `33.0 Hz`
    pub frequency: String,
    pub evidence_summary: String,
    /// `None` for reference findings
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub confidence: Option<f64>,
    pub confidence_label: Option<ConfidenceLabel>,
    pub location: LocationHypothesis,
    pub strongest_location: Option<SensorLocation>,
    pub speed_profile: SpeedProfile,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub vibration_strength_db: Option<f64>,
    pub phase_evidence: Option<PhaseEvidence>,
    pub order_evidence: Option<OrderEvidence>,
    pub peak_classification: Option<PeakClassification>,
    pub peak_evidence: Option<PeakEvidence>,
    pub quick_checks: Vec<String>,
    pub matched_points: Vec<MatchedPoint>,
    #[serde(skip)]
    pub ranking_score: f64,
}

impl Finding {
    pub fn is_reference(&self) -> bool {
        self.kind == FindingKind::Reference
    }
}

/// Everything the run-level analysis produces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sample_count: usize,
    pub sensor_count: usize,
    /// Samples used for findings after the idle filter
    pub analysis_sample_count: usize,
    /// Idle filtering left too few samples and was skipped
    pub phase_filter_fallback: bool,
    pub speed_stats: SpeedStats,
    pub references: Option<ReferenceStatus>,
    pub findings: Vec<Finding>,
    /// Highest ranked diagnostic finding
    pub top_finding: Option<Finding>,
    pub phase_segments: Vec<PhaseSegment>,
    pub phase_summary: PhaseSummary,
    pub speed_breakdown: Vec<SpeedBandRow>,
    pub phase_breakdown: Vec<PhaseBreakdownRow>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub run_noise_baseline_g: Option<f64>,
}

// ============================================================================
// Per-sample Helpers
// ============================================================================

/// Usable peaks of a sample as `(hz, amp)`, strongest first, capped.
pub(crate) fn sample_peaks(sample: &RunSample) -> Vec<(f64, f64)> {
    sample
        .top_peaks
        .iter()
        .filter(|p| p.hz.is_finite() && p.hz > 0.0 && p.amp.is_finite() && p.amp >= 0.0)
        .take(MAX_PEAKS_PER_SAMPLE)
        .map(|p| (p.hz, p.amp))
        .collect()
}

/// Noise floor of one sample, falling back to P20 of its peak amplitudes.
pub(crate) fn sample_floor(sample: &RunSample) -> Option<f64> {
    if let Some(floor) = sample.noise_floor_amp.filter(|v| v.is_finite() && *v >= 0.0) {
        return Some(floor);
    }
    let mut amps: Vec<f64> = sample
        .top_peaks
        .iter()
        .map(|p| p.amp)
        .filter(|a| a.is_finite() && *a >= 0.0)
        .collect();
    if amps.len() < 3 {
        return None;
    }
    amps.sort_by(f64::total_cmp);
    Some(percentile(&amps, 0.20))
}

/// Inputs shared by the order and peak builders.
pub(crate) struct AnalysisContext<'a> {
    pub engine: &'a FindingsEngine,
    pub samples: &'a [RunSample],
    pub phases: &'a [DrivingPhase],
    pub metadata: &'a RunMetadata,
    pub speed_stats: &'a SpeedStats,
    pub speed_sufficient: bool,
    pub engine_ref_sufficient: bool,
    pub connected: BTreeSet<SensorLocation>,
}

// ============================================================================
// Engine
// ============================================================================

/// Run-level confidence and localization engine.
#[derive(Debug, Clone, Default)]
pub struct FindingsEngine {
    pub(crate) findings: FindingsConfig,
    pub(crate) strength: StrengthConfig,
    pub(crate) phase: PhaseConfig,
    pub(crate) orders: OrderConfig,
}

impl FindingsEngine {
    pub fn new(
        findings: FindingsConfig,
        strength: StrengthConfig,
        phase: PhaseConfig,
        orders: OrderConfig,
    ) -> Self {
        Self { findings, strength, phase, orders }
    }

    pub fn from_config(cfg: &DiagnosticsConfig) -> Self {
        Self::new(cfg.findings.clone(), cfg.strength.clone(), cfg.phase.clone(), cfg.orders.clone())
    }

    /// Analyse a completed run.
    pub fn build_run_summary(&self, samples: &[RunSample], metadata: &RunMetadata) -> RunSummary {
        let segmentation = segment_run(samples, &self.phase);
        let speed_stats = SpeedStats::from_samples(samples, &self.findings);
        let sensors: BTreeSet<&str> = samples.iter().map(|s| s.sensor_id.as_str()).collect();

        let (references, mut findings) =
            check_references(samples, metadata, &speed_stats, &self.findings);

        let mask = diagnostic_sample_mask(&segmentation.phases, false);
        let kept = mask.iter().filter(|k| **k).count();
        let phase_filter_fallback = kept < MIN_DIAGNOSTIC_SAMPLES;
        let (analysis_samples, analysis_phases): (Vec<RunSample>, Vec<DrivingPhase>) =
            if phase_filter_fallback {
                (samples.to_vec(), segmentation.phases.clone())
            } else {
                samples
                    .iter()
                    .zip(&segmentation.phases)
                    .zip(&mask)
                    .filter(|(_, keep)| **keep)
                    .map(|((s, p), _)| (s.clone(), *p))
                    .unzip()
            };
        if phase_filter_fallback && !samples.is_empty() {
            debug!(
                kept,
                total = samples.len(),
                "[Findings] Too few non-idle samples, analysing full run"
            );
        }

        let ctx = AnalysisContext {
            engine: self,
            samples: &analysis_samples,
            phases: &analysis_phases,
            metadata,
            speed_stats: &speed_stats,
            speed_sufficient: references.speed_sufficient,
            engine_ref_sufficient: references.engine_ref_sufficient,
            connected: connected_locations(&analysis_samples),
        };

        let order = order_findings::build_order_findings(&ctx);
        findings.extend(order.findings);
        findings.extend(persistent::build_persistent_peak_findings(&ctx, &order.claimed_hz));

        let findings = order_and_number(findings);
        let top_finding = findings
            .iter()
            .find(|f| f.severity == FindingSeverity::Diagnostic)
            .cloned();

        info!(
            samples = samples.len(),
            sensors = sensors.len(),
            findings = findings.len(),
            top = top_finding.as_ref().map_or("none", |f| f.finding_key.as_str()),
            "[Findings] Run analysed"
        );

        RunSummary {
            sample_count: samples.len(),
            sensor_count: sensors.len(),
            analysis_sample_count: analysis_samples.len(),
            phase_filter_fallback,
            speed_breakdown: speed_breakdown(samples, self.findings.speed_bin_width_kmh),
            phase_breakdown: phase_breakdown(samples, &segmentation.phases),
            phase_summary: phase_summary(&segmentation.segments),
            phase_segments: segmentation.segments,
            speed_stats,
            references: Some(references),
            run_noise_baseline_g: run_noise_baseline(&analysis_samples),
            findings,
            top_finding,
        }
    }
}

/// Reference, diagnostic, informational; within a group by confidence
/// quantised to 0.02, then ranking score. Non-reference findings get `F001...`.
fn order_and_number(findings: Vec<Finding>) -> Vec<Finding> {
    let quantised = |f: &Finding| (f.confidence.unwrap_or(0.0) / 0.02).round() as i64;
    let mut findings = findings;
    findings.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| quantised(b).cmp(&quantised(a)))
            .then_with(|| b.ranking_score.total_cmp(&a.ranking_score))
    });
    let mut counter = 0;
    for f in findings.iter_mut().filter(|f| !f.is_reference()) {
        counter += 1;
        f.finding_id = format!("F{counter:03}");
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeakPoint;

    fn make_finding(severity: FindingSeverity, confidence: Option<f64>, ranking: f64) -> Finding {
        let reference = severity == FindingSeverity::Reference;
        Finding {
            finding_id: if reference { "REF_SPEED".into() } else { String::new() },
            finding_key: format!("{severity:?}_{ranking}"),
            kind: if reference { FindingKind::Reference } else { FindingKind::Peak },
            severity,
            source: VibrationSource::Unknown,
            frequency: String::new(),
            evidence_summary: String::new(),
            confidence,
            confidence_label: confidence.map(ConfidenceLabel::from_confidence),
            location: LocationHypothesis::Unknown,
            strongest_location: None,
            speed_profile: SpeedProfile::default(),
            vibration_strength_db: None,
            phase_evidence: None,
            order_evidence: None,
            peak_classification: None,
            peak_evidence: None,
            quick_checks: Vec::new(),
            matched_points: Vec::new(),
            ranking_score: ranking,
        }
    }

    #[test]
    fn ordering_groups_and_ids() {
        let findings = vec![
            make_finding(FindingSeverity::Info, Some(0.2), 1.0),
            make_finding(FindingSeverity::Diagnostic, Some(0.50), 1.0),
            make_finding(FindingSeverity::Reference, None, 0.0),
            make_finding(FindingSeverity::Diagnostic, Some(0.505), 5.0),
            make_finding(FindingSeverity::Diagnostic, Some(0.80), 0.1),
        ];
        let ordered = order_and_number(findings);
        let ids: Vec<&str> = ordered.iter().map(|f| f.finding_id.as_str()).collect();
        assert_eq!(ids, ["REF_SPEED", "F001", "F002", "F003", "F004"]);
        assert_eq!(ordered[1].confidence, Some(0.80));
        // 0.50 and 0.505 quantise together, ranking breaks the tie
        assert!((ordered[2].ranking_score - 5.0).abs() < 1e-12);
        assert_eq!(ordered[4].severity, FindingSeverity::Info);
    }

    #[test]
    fn sample_helpers() {
        let sample = RunSample {
            top_peaks: vec![
                PeakPoint::new(12.0, 0.05),
                PeakPoint::new(f64::NAN, 0.04),
                PeakPoint::new(0.0, 0.03),
                PeakPoint::new(30.0, 0.01),
            ],
            ..Default::default()
        };
        assert_eq!(sample_peaks(&sample), vec![(12.0, 0.05), (30.0, 0.01)]);
        assert!(sample_floor(&sample).is_some());
        let with_floor = RunSample { noise_floor_amp: Some(0.002), ..sample };
        assert_eq!(sample_floor(&with_floor), Some(0.002));
    }

    #[test]
    fn empty_run_is_neutral() {
        let summary = FindingsEngine::default().build_run_summary(&[], &RunMetadata::default());
        assert_eq!(summary.sample_count, 0);
        assert!(summary.top_finding.is_none());
        assert!(summary.findings.iter().all(Finding::is_reference));
        assert!(summary.phase_segments.is_empty());
    }
}
