//! Persistent and transient non-order peaks
//!
//! Peaks not explained by any confident order finding are binned by
//! frequency and characterised by how often, how evenly and how loudly they
//! appear. The classification decides both the confidence formula and
//! whether a peak is reported as a diagnostic or informational finding.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use statrs::statistics::Statistics;

use super::confidence::{peak_confidence, PeakConfidenceInputs, SNR_LOG_DIVISOR};
use super::speed_profile::{speed_bin, speed_profile, SpeedPoint};
use super::{
    sample_floor, sample_peaks, AnalysisContext, Finding, FindingKind, FindingSeverity,
    PeakClassification, PhaseEvidence,
};
use crate::phase::DrivingPhase;
use crate::sanitize;
use crate::strength::{median, percentile, strength_db};
use crate::types::{ConfidenceLabel, LocationHypothesis, RunSample, SensorLocation, VibrationSource};

/// Per-bin metrics behind a peak finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakEvidence {
    #[serde(serialize_with = "sanitize::finite")]
    pub center_hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub presence_ratio: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub burstiness: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub snr: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub median_db: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub p95_db: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub max_db: f64,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub run_noise_baseline_g: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub spatial_concentration: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub spatial_uniformity: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub speed_uniformity: Option<f64>,
    pub sample_count: usize,
    pub total_samples: usize,
    /// Share of this bin's hits per driving phase
    pub phase_presence: BTreeMap<DrivingPhase, f64>,
}

/// Decide what kind of peak a frequency bin holds.
///
/// `spatial_uniformity` is the share of locations that saw the bin;
/// `speed_uniformity` is the spread of hit rates across speed bins.
pub fn classify_peak(
    presence_ratio: f64,
    burstiness: f64,
    snr: f64,
    spatial_uniformity: Option<f64>,
    speed_uniformity: Option<f64>,
) -> PeakClassification {
    if snr < 1.5 {
        return PeakClassification::BaselineNoise;
    }
    let uniform = |min: f64| spatial_uniformity.is_some_and(|u| u >= min);
    if spatial_uniformity.is_some_and(|u| u > 0.85) && presence_ratio >= 0.6 && burstiness < 2.0 {
        return PeakClassification::BaselineNoise;
    }
    if uniform(0.8)
        && speed_uniformity.is_some_and(|s| s <= 0.1)
        && (0.2..=0.4).contains(&presence_ratio)
        && (3.0..=5.0).contains(&burstiness)
    {
        return PeakClassification::BaselineNoise;
    }
    if presence_ratio < 0.15 || burstiness > 5.0 {
        return PeakClassification::Transient;
    }
    if presence_ratio >= 0.4 && burstiness < 3.0 {
        return PeakClassification::Patterned;
    }
    PeakClassification::Persistent
}

/// Run-wide noise level: median per-sample floor, else P20 of all peak
/// amplitudes when at least three exist.
pub fn run_noise_baseline(samples: &[RunSample]) -> Option<f64> {
    let floors: Vec<f64> = samples
        .iter()
        .filter_map(|s| s.noise_floor_amp)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if !floors.is_empty() {
        return Some(median(&floors));
    }
    let mut amps: Vec<f64> = samples
        .iter()
        .flat_map(|s| s.top_peaks.iter().map(|p| p.amp))
        .filter(|a| a.is_finite() && *a > 0.0)
        .collect();
    if amps.len() < 3 {
        return None;
    }
    amps.sort_by(f64::total_cmp);
    Some(percentile(&amps, 0.20)).filter(|v| *v > 0.0)
}

#[derive(Default)]
struct FrequencyBin {
    amps: Vec<f64>,
    floors: Vec<f64>,
    speed_points: Vec<SpeedPoint>,
    locations: BTreeMap<SensorLocation, usize>,
    speed_bins: BTreeMap<i64, usize>,
    phases: BTreeMap<DrivingPhase, usize>,
}

/// Key a frequency to the center of its bin, in milli-hertz.
fn bin_key(hz: f64, width: f64) -> i64 {
    ((hz / width).floor() * width * 1000.0 + width * 500.0).round() as i64
}

/// Peak findings for frequencies not claimed by `claimed_hz`.
pub fn build_persistent_peak_findings(
    ctx: &AnalysisContext<'_>,
    claimed_hz: &[f64],
) -> Vec<Finding> {
    let cfg = &ctx.engine.findings;
    let width = if cfg.persistent_freq_bin_hz > 0.0 { cfg.persistent_freq_bin_hz } else { 2.0 };
    let n_samples = ctx.samples.len();
    if n_samples == 0 {
        return Vec::new();
    }

    let mut bins: BTreeMap<i64, FrequencyBin> = BTreeMap::new();
    let mut location_totals: BTreeMap<SensorLocation, usize> = BTreeMap::new();
    let mut speed_bin_totals: BTreeMap<i64, usize> = BTreeMap::new();

    for (idx, sample) in ctx.samples.iter().enumerate() {
        let speed = sample.speed_kmh.filter(|v| v.is_finite() && *v > 0.0);
        let sbin = speed.and_then(|v| speed_bin(v, cfg.speed_bin_width_kmh));
        if let Some(b) = sbin {
            *speed_bin_totals.entry(b).or_default() += 1;
        }
        if let Some(loc) = sample.location {
            *location_totals.entry(loc).or_default() += 1;
        }
        let floor = sample_floor(sample).unwrap_or(0.0).max(0.0);
        let phase = ctx.phases.get(idx).copied();

        for (hz, amp) in sample_peaks(sample) {
            if amp <= 0.0 {
                continue;
            }
            let entry = bins.entry(bin_key(hz, width)).or_default();
            entry.amps.push(amp);
            entry.floors.push(floor);
            if let Some(speed_kmh) = speed {
                entry.speed_points.push(SpeedPoint { speed_kmh, amp, phase });
            }
            if let Some(loc) = sample.location {
                *entry.locations.entry(loc).or_default() += 1;
            }
            if let Some(b) = sbin {
                *entry.speed_bins.entry(b).or_default() += 1;
            }
            if let Some(p) = phase {
                *entry.phases.entry(p).or_default() += 1;
            }
        }
    }

    let baseline = run_noise_baseline(ctx.samples);
    let mems = cfg.mems_noise_floor_g;
    let mut persistent = Vec::new();
    let mut transient = Vec::new();

    for (key, bin) in &bins {
        let center = *key as f64 / 1000.0;
        if claimed_hz.iter().any(|hz| (center - hz).abs() < width) {
            continue;
        }
        let mut sorted = bin.amps.clone();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();

        let mut presence_ratio = count as f64 / n_samples as f64;
        for (loc, total) in &location_totals {
            if *total >= 3 {
                let hits = bin.locations.get(loc).copied().unwrap_or(0);
                presence_ratio = presence_ratio.max(hits as f64 / *total as f64);
            }
        }

        let median_amp = percentile(&sorted, 0.50);
        let p95_amp = percentile(&sorted, 0.95);
        let max_amp = sorted.last().copied().unwrap_or(0.0);
        let burstiness = if median_amp > 1e-9 { max_amp / median_amp } else { 0.0 };

        let mean_floor = if bin.floors.is_empty() { 0.0 } else { bin.floors.iter().mean() };
        let effective_floor = match baseline {
            Some(b) if b > 0.0 => b,
            _ if mean_floor > 0.0 => mean_floor,
            _ => mems,
        }
        .max(mems);
        let snr = p95_amp / effective_floor;

        let n_locations = location_totals.len();
        let spatial_uniformity =
            (n_locations >= 2).then(|| bin.locations.len() as f64 / n_locations as f64);
        let speed_uniformity = (speed_bin_totals.len() >= 2).then(|| {
            let rates: Vec<f64> = speed_bin_totals
                .iter()
                .map(|(b, total)| {
                    bin.speed_bins.get(b).copied().unwrap_or(0) as f64 / *total as f64
                })
                .collect();
            rates.iter().population_std_dev()
        });

        let class = classify_peak(
            presence_ratio,
            burstiness,
            snr,
            spatial_uniformity,
            speed_uniformity,
        );
        let spatial_concentration = bin
            .locations
            .values()
            .max()
            .map(|top| *top as f64 / count.max(1) as f64);
        let p95_db = strength_db(p95_amp, effective_floor, &ctx.engine.strength);
        let confidence = peak_confidence(&PeakConfidenceInputs {
            class,
            presence_ratio,
            burstiness,
            snr_score: (snr.ln_1p() / SNR_LOG_DIVISOR).min(1.0),
            spatial_concentration,
            strength_db: p95_db,
            negligible_db: ctx.engine.strength.band_thresholds_db[0],
        });

        let location = peak_location(
            class,
            bin,
            n_locations,
            spatial_concentration,
            spatial_uniformity,
        );
        let strongest_location = top_locations(bin).first().copied();
        let profile = speed_profile(&bin.speed_points, None, cfg.speed_bin_width_kmh);

        let phase_hits: usize = bin.phases.values().sum();
        let phase_presence: BTreeMap<DrivingPhase, f64> = bin
            .phases
            .iter()
            .map(|(p, n)| (*p, *n as f64 / phase_hits.max(1) as f64))
            .collect();
        let cruise_hits = bin.phases.get(&DrivingPhase::Cruise).copied().unwrap_or(0);

        let source = match class {
            PeakClassification::Patterned | PeakClassification::Persistent => {
                VibrationSource::BodyResonance
            }
            PeakClassification::Transient | PeakClassification::BaselineNoise => {
                VibrationSource::Unknown
            }
        };
        let finding = Finding {
            finding_id: String::new(),
            finding_key: format!("peak_{center:.0}hz"),
            kind: FindingKind::Peak,
            severity: if class == PeakClassification::Transient {
                FindingSeverity::Info
            } else {
                FindingSeverity::Diagnostic
            },
            source,
            frequency: format!("{center:.1} Hz"),
            evidence_summary: format!(
                "{} peak near {center:.1} Hz present in {:.0}% of samples, \
                 p95 {:.1} dB, burstiness {:.1}",
                class.as_str(),
                presence_ratio * 100.0,
                p95_db,
                burstiness
            ),
            confidence: Some(confidence),
            confidence_label: Some(ConfidenceLabel::from_confidence(confidence)),
            location,
            strongest_location,
            speed_profile: profile,
            vibration_strength_db: Some(p95_db),
            phase_evidence: Some(PhaseEvidence {
                cruise_fraction: if phase_hits > 0 {
                    cruise_hits as f64 / phase_hits as f64
                } else {
                    0.0
                },
                phases_detected: bin.phases.keys().copied().collect(),
                dominant_phase: None,
                per_phase_match_rate: BTreeMap::new(),
                phases_with_evidence: 0,
            }),
            order_evidence: None,
            peak_classification: Some(class),
            peak_evidence: Some(PeakEvidence {
                center_hz: center,
                presence_ratio,
                burstiness,
                snr,
                median_db: strength_db(median_amp, effective_floor, &ctx.engine.strength),
                p95_db,
                max_db: strength_db(max_amp, effective_floor, &ctx.engine.strength),
                run_noise_baseline_g: baseline,
                spatial_concentration,
                spatial_uniformity,
                speed_uniformity,
                sample_count: count,
                total_samples: n_samples,
                phase_presence,
            }),
            quick_checks: Vec::new(),
            matched_points: Vec::new(),
            ranking_score: presence_ratio.powi(2) * p95_amp,
        };
        if class == PeakClassification::Transient {
            transient.push(finding);
        } else {
            persistent.push(finding);
        }
    }

    persistent.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
    transient.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
    persistent.truncate(cfg.persistent_max_findings);
    transient.truncate(cfg.persistent_max_findings);
    persistent.extend(transient);
    persistent
}

fn top_locations(bin: &FrequencyBin) -> Vec<SensorLocation> {
    let mut ranked: Vec<(SensorLocation, usize)> =
        bin.locations.iter().map(|(l, n)| (*l, *n)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(l, _)| l).collect()
}

/// Only concentrated, repeatable peaks on a multi-location run are pinned to
/// one location; peaks seen almost everywhere are diffuse.
fn peak_location(
    class: PeakClassification,
    bin: &FrequencyBin,
    total_locations: usize,
    concentration: Option<f64>,
    uniformity: Option<f64>,
) -> LocationHypothesis {
    if uniformity.is_some_and(|u| u >= 0.8) {
        return LocationHypothesis::Diffuse;
    }
    let ranked = top_locations(bin);
    let repeatable =
        matches!(class, PeakClassification::Patterned | PeakClassification::Persistent);
    let pinned = repeatable && total_locations >= 2 && concentration.is_some_and(|c| c >= 0.8);
    match ranked.as_slice() {
        [] => LocationHypothesis::Unknown,
        [top, ..] if pinned => LocationHypothesis::Localized { location: *top },
        [_] => LocationHypothesis::Unknown,
        [first, second, ..] => LocationHypothesis::Ambiguous { candidates: vec![*first, *second] },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeakPoint;

    #[test]
    fn classification_rules() {
        use PeakClassification::*;
        assert_eq!(classify_peak(0.9, 1.2, 1.0, None, None), BaselineNoise);
        assert_eq!(classify_peak(0.7, 1.5, 5.0, Some(0.9), None), BaselineNoise);
        assert_eq!(classify_peak(0.3, 4.0, 5.0, Some(0.8), Some(0.05)), BaselineNoise);
        assert_eq!(classify_peak(0.1, 1.5, 5.0, None, None), Transient);
        assert_eq!(classify_peak(0.5, 6.0, 5.0, None, None), Transient);
        assert_eq!(classify_peak(0.6, 1.5, 5.0, Some(0.25), None), Patterned);
        assert_eq!(classify_peak(0.3, 2.0, 5.0, Some(0.25), None), Persistent);
    }

    #[test]
    fn bin_keys_center_the_bin() {
        assert_eq!(bin_key(33.2, 2.0), 33_000);
        assert_eq!(bin_key(32.0, 2.0), 33_000);
        assert_eq!(bin_key(0.4, 2.0), 1_000);
    }

    #[test]
    fn noise_baseline_prefers_sample_floors() {
        let samples = vec![
            RunSample { noise_floor_amp: Some(0.002), ..Default::default() },
            RunSample { noise_floor_amp: Some(0.004), ..Default::default() },
            RunSample { noise_floor_amp: Some(0.003), ..Default::default() },
        ];
        assert!((run_noise_baseline(&samples).unwrap_or_default() - 0.003).abs() < 1e-12);

        let peaks_only = vec![RunSample {
            top_peaks: vec![
                PeakPoint::new(10.0, 0.01),
                PeakPoint::new(20.0, 0.02),
                PeakPoint::new(30.0, 0.03),
            ],
            ..Default::default()
        }];
        assert!((run_noise_baseline(&peaks_only).unwrap_or_default() - 0.014).abs() < 1e-9);
        assert!(run_noise_baseline(&[RunSample::default()]).is_none());
    }
}
