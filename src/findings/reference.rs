//! Missing-reference findings
//!
//! Order tracking needs vehicle speed, a tire circumference, an engine speed
//! reference and the raw sample rate. Each missing reference is reported as
//! its own finding so the run summary says why some hypotheses were skipped.

use serde::Serialize;

use super::order_findings::effective_engine_rpm;
use super::speed_profile::{SpeedProfile, SpeedStats};
use super::{Finding, FindingKind, FindingSeverity};
use crate::config::FindingsConfig;
use crate::types::{LocationHypothesis, RunMetadata, RunSample, VibrationSource};

/// Reference a run can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCheck {
    Speed,
    Wheel,
    Engine,
    SampleRate,
}

impl ReferenceCheck {
    pub fn id(self) -> &'static str {
        match self {
            Self::Speed => "REF_SPEED",
            Self::Wheel => "REF_WHEEL",
            Self::Engine => "REF_ENGINE",
            Self::SampleRate => "REF_SAMPLE_RATE",
        }
    }

    fn source(self) -> VibrationSource {
        match self {
            Self::Wheel => VibrationSource::WheelTire,
            Self::Engine => VibrationSource::Engine,
            Self::Speed | Self::SampleRate => VibrationSource::Unknown,
        }
    }

    fn quick_checks(self) -> &'static [&'static str] {
        match self {
            Self::Speed => &[
                "Record vehicle speed (GPS or manual) for most of the run",
                "Verify timestamp alignment between speed and acceleration streams",
            ],
            Self::Wheel => &[
                "Provide tire size (width, aspect, rim) or a measured circumference",
                "Re-run with the loaded tire circumference",
            ],
            Self::Engine => &[
                "Log engine RPM from CAN/OBD for the whole run",
                "Or provide final drive and current gear ratios",
            ],
            Self::SampleRate => &["Record the true accelerometer sample rate in the run metadata"],
        }
    }
}

/// Which references are usable for order analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceStatus {
    pub speed_sufficient: bool,
    pub tire_available: bool,
    pub engine_ref_sufficient: bool,
    pub engine_rpm_non_null_pct: f64,
    pub sample_rate_available: bool,
}

/// Evaluate all four reference checks over the full run.
pub fn check_references(
    samples: &[RunSample],
    metadata: &RunMetadata,
    speed_stats: &SpeedStats,
    cfg: &FindingsConfig,
) -> (ReferenceStatus, Vec<Finding>) {
    let speed_sufficient = speed_stats.speed_non_null_pct >= cfg.speed_coverage_min_pct;
    let tire_available = metadata.tire_circumference_m.is_some_and(|c| c.is_finite() && c > 0.0);

    let engine_refs = samples
        .iter()
        .filter(|s| effective_engine_rpm(s, metadata).is_some())
        .count();
    let engine_rpm_non_null_pct = if samples.is_empty() {
        0.0
    } else {
        engine_refs as f64 / samples.len() as f64 * 100.0
    };
    let status = ReferenceStatus {
        speed_sufficient,
        tire_available,
        engine_ref_sufficient: engine_rpm_non_null_pct >= cfg.speed_coverage_min_pct,
        engine_rpm_non_null_pct,
        sample_rate_available: metadata.raw_sample_rate_hz.is_some_and(|r| r > 0),
    };

    let mut findings = Vec::new();
    if !status.speed_sufficient {
        findings.push(reference_finding(
            ReferenceCheck::Speed,
            format!(
                "Vehicle speed available for {:.0}% of samples (needs {:.0}%); \
                 order tracking skipped",
                speed_stats.speed_non_null_pct, cfg.speed_coverage_min_pct
            ),
        ));
    }
    if status.speed_sufficient && !status.tire_available {
        findings.push(reference_finding(
            ReferenceCheck::Wheel,
            "Vehicle speed is available but no tire circumference is known; \
             wheel and driveline orders skipped"
                .to_string(),
        ));
    }
    if !status.engine_ref_sufficient {
        findings.push(reference_finding(
            ReferenceCheck::Engine,
            format!(
                "Engine speed reference available for {:.0}% of samples; engine orders skipped",
                engine_rpm_non_null_pct
            ),
        ));
    }
    if !status.sample_rate_available {
        findings.push(reference_finding(
            ReferenceCheck::SampleRate,
            "Raw accelerometer sample rate is missing; dominant frequencies cannot be trusted"
                .to_string(),
        ));
    }
    (status, findings)
}

fn reference_finding(check: ReferenceCheck, evidence_summary: String) -> Finding {
    Finding {
        finding_id: check.id().to_string(),
        finding_key: check.id().to_ascii_lowercase(),
        kind: FindingKind::Reference,
        severity: FindingSeverity::Reference,
        source: check.source(),
        frequency: "reference missing".to_string(),
        evidence_summary,
        confidence: None,
        confidence_label: None,
        location: LocationHypothesis::Unknown,
        strongest_location: None,
        speed_profile: SpeedProfile::default(),
        vibration_strength_db: None,
        phase_evidence: None,
        order_evidence: None,
        peak_classification: None,
        peak_evidence: None,
        quick_checks: check.quick_checks().iter().map(|s| (*s).to_string()).collect(),
        matched_points: Vec::new(),
        ranking_score: 0.0,
    }
}
