//! Speed binning, run speed statistics, and amplitude-weighted speed profiles.
//!
//! Speed bins are fixed-width (`findings.speed_bin_width_kmh`) and keyed by
//! their integer index, `floor(speed / width)`; the label `"90-100 km/h"` is
//! only produced for output.

use std::collections::BTreeMap;

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::FindingsConfig;
use crate::phase::DrivingPhase;
use crate::sanitize;
use crate::types::RunSample;

// ============================================================================
// Speed Bins
// ============================================================================

/// Index of the bin a positive speed falls in.
pub fn speed_bin(speed_kmh: f64, width_kmh: f64) -> Option<i64> {
    if !speed_kmh.is_finite() || speed_kmh <= 0.0 || width_kmh <= 0.0 {
        return None;
    }
    Some((speed_kmh / width_kmh).floor() as i64)
}

/// `"{low}-{high} km/h"` for a bin index.
pub fn speed_bin_label(bin: i64, width_kmh: f64) -> String {
    let low = bin as f64 * width_kmh;
    format!("{:.0}-{:.0} km/h", low, low + width_kmh)
}

/// Weighted percentile of `(value, weight)` pairs; non-positive entries are
/// ignored.
pub fn weighted_percentile(pairs: &[(f64, f64)], q: f64) -> Option<f64> {
    let mut valid: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(v, w)| v.is_finite() && w.is_finite() && *v > 0.0 && *w > 0.0)
        .collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = valid.iter().map(|(_, w)| w).sum();
    let target = q.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;
    for (value, weight) in &valid {
        cumulative += weight;
        if cumulative >= target {
            return Some(*value);
        }
    }
    valid.last().map(|(v, _)| *v)
}

/// Bin with the largest summed weight; ties go to the higher-speed bin.
pub fn strongest_speed_bin(
    points: impl IntoIterator<Item = (f64, f64)>,
    width_kmh: f64,
) -> Option<i64> {
    let mut weights: BTreeMap<i64, f64> = BTreeMap::new();
    for (speed, weight) in points {
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        if let Some(bin) = speed_bin(speed, width_kmh) {
            *weights.entry(bin).or_default() += weight;
        }
    }
    weights
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(bin, _)| bin)
}

// ============================================================================
// Speed Profile
// ============================================================================

/// Where along the speed range a signal was strongest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeedProfile {
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub peak_speed_kmh: Option<f64>,
    /// Amplitude-weighted P10..P90 of the contributing speeds
    pub speed_window_kmh: Option<(f64, f64)>,
    pub strongest_speed_band: Option<String>,
}

/// One observation for [`speed_profile`].
#[derive(Debug, Clone, Copy)]
pub struct SpeedPoint {
    pub speed_kmh: f64,
    pub amp: f64,
    pub phase: Option<DrivingPhase>,
}

/// Cruise evidence counts triple, transients a third, everything else once.
pub fn phase_weight(phase: Option<DrivingPhase>) -> f64 {
    match phase {
        Some(DrivingPhase::Cruise) => 3.0,
        Some(p) if p.is_transient() => 0.3,
        _ => 1.0,
    }
}

/// Summarise where along the speed axis `points` were strongest.
///
/// `allowed_bin` restricts the profile to one speed bin. The strongest band
/// uses phase-weighted amplitudes; the peak speed and window use raw ones.
pub fn speed_profile(
    points: &[SpeedPoint],
    allowed_bin: Option<i64>,
    width_kmh: f64,
) -> SpeedProfile {
    let valid: Vec<&SpeedPoint> = points
        .iter()
        .filter(|p| p.speed_kmh.is_finite() && p.amp.is_finite())
        .filter(|p| p.speed_kmh > 0.0 && p.amp > 0.0)
        .filter(|p| allowed_bin.is_none() || speed_bin(p.speed_kmh, width_kmh) == allowed_bin)
        .collect();
    let Some(loudest) = valid.iter().max_by(|a, b| a.amp.total_cmp(&b.amp)) else {
        return SpeedProfile::default();
    };
    let peak_speed_kmh = Some(loudest.speed_kmh);

    let pairs: Vec<(f64, f64)> = valid.iter().map(|p| (p.speed_kmh, p.amp)).collect();
    let p10 = weighted_percentile(&pairs, 0.10);
    let p90 = weighted_percentile(&pairs, 0.90);
    let (Some(p10), Some(p90)) = (p10, p90) else {
        return SpeedProfile { peak_speed_kmh, ..Default::default() };
    };
    let window = (p10.min(p90), p10.max(p90));

    let band = strongest_speed_bin(
        valid.iter().map(|p| (p.speed_kmh, p.amp * phase_weight(p.phase))),
        width_kmh,
    )
    .map(|bin| speed_bin_label(bin, width_kmh));

    SpeedProfile {
        peak_speed_kmh,
        speed_window_kmh: Some(window),
        strongest_speed_band: band,
    }
}

// ============================================================================
// Run Speed Statistics
// ============================================================================

/// Speed statistics over every sample with a positive speed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeedStats {
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub min_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub max_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub mean_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub stddev_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub range_kmh: Option<f64>,
    pub steady_speed: bool,
    /// Share of samples (0-100) that carried a usable speed
    #[serde(serialize_with = "sanitize::finite")]
    pub speed_non_null_pct: f64,
}

impl SpeedStats {
    pub fn from_samples(samples: &[RunSample], cfg: &FindingsConfig) -> Self {
        let speeds: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.speed_kmh)
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        let speed_non_null_pct = if samples.is_empty() {
            0.0
        } else {
            speeds.len() as f64 / samples.len() as f64 * 100.0
        };
        if speeds.is_empty() {
            return Self { steady_speed: true, speed_non_null_pct, ..Default::default() };
        }
        let min = Statistics::min(speeds.iter());
        let max = Statistics::max(speeds.iter());
        let mean = speeds.iter().mean();
        let stddev = if speeds.len() > 1 { speeds.iter().population_std_dev() } else { 0.0 };
        let range = (max - min).max(0.0);
        Self {
            min_kmh: Some(min),
            max_kmh: Some(max),
            mean_kmh: Some(mean),
            stddev_kmh: Some(stddev),
            range_kmh: Some(range),
            steady_speed: stddev < cfg.steady_speed_stddev_kmh
                || range < cfg.steady_speed_range_kmh,
            speed_non_null_pct,
        }
    }

    /// Speed barely varies, so predicted order frequencies are fixed.
    pub fn is_constant(&self, cfg: &FindingsConfig) -> bool {
        self.stddev_kmh.is_some_and(|s| s < cfg.constant_speed_stddev_kmh)
    }
}

// ============================================================================
// Breakdowns
// ============================================================================

/// Vibration strength per speed bin.
#[derive(Debug, Clone, Serialize)]
pub struct SpeedBandRow {
    pub speed_range: String,
    pub count: usize,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub mean_vibration_strength_db: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub max_vibration_strength_db: Option<f64>,
}

/// Vibration strength and speed per driving phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseBreakdownRow {
    pub phase: DrivingPhase,
    pub count: usize,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub mean_speed_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub max_speed_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub mean_vibration_strength_db: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub max_vibration_strength_db: Option<f64>,
}

fn mean_max(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    (Some(values.iter().mean()), Some(Statistics::max(values.iter())))
}

fn finite_db(sample: &RunSample) -> Option<f64> {
    sample.vibration_strength_db.filter(|v| v.is_finite())
}

/// Rows in ascending speed order; samples without speed are skipped.
pub fn speed_breakdown(samples: &[RunSample], width_kmh: f64) -> Vec<SpeedBandRow> {
    let mut grouped: BTreeMap<i64, (usize, Vec<f64>)> = BTreeMap::new();
    for sample in samples {
        let Some(bin) = sample.speed_kmh.and_then(|v| speed_bin(v, width_kmh)) else {
            continue;
        };
        let entry = grouped.entry(bin).or_default();
        entry.0 += 1;
        if let Some(db) = finite_db(sample) {
            entry.1.push(db);
        }
    }
    grouped
        .into_iter()
        .map(|(bin, (count, dbs))| {
            let (mean, max) = mean_max(&dbs);
            SpeedBandRow {
                speed_range: speed_bin_label(bin, width_kmh),
                count,
                mean_vibration_strength_db: mean,
                max_vibration_strength_db: max,
            }
        })
        .collect()
}

/// Rows in canonical phase order; phases with no samples are omitted.
pub fn phase_breakdown(samples: &[RunSample], phases: &[DrivingPhase]) -> Vec<PhaseBreakdownRow> {
    let mut grouped: BTreeMap<DrivingPhase, (usize, Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for (sample, phase) in samples.iter().zip(phases) {
        let entry = grouped.entry(*phase).or_default();
        entry.0 += 1;
        if let Some(speed) = sample.speed_kmh.filter(|v| v.is_finite() && *v > 0.0) {
            entry.1.push(speed);
        }
        if let Some(db) = finite_db(sample) {
            entry.2.push(db);
        }
    }
    DrivingPhase::ALL
        .iter()
        .filter_map(|phase| {
            let (count, speeds, dbs) = grouped.remove(phase)?;
            let (mean_speed, max_speed) = mean_max(&speeds);
            let (mean_db, max_db) = mean_max(&dbs);
            Some(PhaseBreakdownRow {
                phase: *phase,
                count,
                mean_speed_kmh: mean_speed,
                max_speed_kmh: max_speed,
                mean_vibration_strength_db: mean_db,
                max_vibration_strength_db: max_db,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(speed: f64, amp: f64, phase: DrivingPhase) -> SpeedPoint {
        SpeedPoint { speed_kmh: speed, amp, phase: Some(phase) }
    }

    #[test]
    fn bins_and_labels() {
        assert_eq!(speed_bin(95.0, 10.0), Some(9));
        assert_eq!(speed_bin(100.0, 10.0), Some(10));
        assert_eq!(speed_bin(0.0, 10.0), None);
        assert_eq!(speed_bin_label(9, 10.0), "90-100 km/h");
    }

    #[test]
    fn weighted_percentile_follows_weights() {
        let pairs = [(50.0, 1.0), (60.0, 1.0), (100.0, 8.0)];
        assert_eq!(weighted_percentile(&pairs, 0.10), Some(50.0));
        assert_eq!(weighted_percentile(&pairs, 0.90), Some(100.0));
        assert_eq!(weighted_percentile(&[], 0.5), None);
    }

    #[test]
    fn cruise_points_outweigh_acceleration_sweep() {
        // A burst of loud acceleration points at 40-50 km/h against steady
        // cruise at 90-100 km/h: cruise wins the band after phase weighting.
        let mut points: Vec<SpeedPoint> = (0..6)
            .map(|i| point(41.0 + i as f64, 0.05, DrivingPhase::Acceleration))
            .collect();
        points.extend((0..4).map(|_| point(95.0, 0.03, DrivingPhase::Cruise)));
        let profile = speed_profile(&points, None, 10.0);
        assert_eq!(profile.strongest_speed_band.as_deref(), Some("90-100 km/h"));
        // Peak speed is the raw loudest point
        let peak = profile.peak_speed_kmh.unwrap_or_default();
        assert!((41.0..=46.0).contains(&peak), "peak {peak}");
    }

    #[test]
    fn allowed_bin_restricts_profile() {
        let points = [
            point(55.0, 1.0, DrivingPhase::Cruise),
            point(95.0, 0.1, DrivingPhase::Cruise),
        ];
        let profile = speed_profile(&points, Some(9), 10.0);
        assert_eq!(profile.peak_speed_kmh, Some(95.0));
        assert_eq!(profile.speed_window_kmh, Some((95.0, 95.0)));
    }

    #[test]
    fn speed_stats_steady_and_constant() {
        let cfg = FindingsConfig::default();
        let samples: Vec<RunSample> = [80.0, 80.2, 79.9, 80.1]
            .iter()
            .map(|v| RunSample { speed_kmh: Some(*v), ..Default::default() })
            .collect();
        let stats = SpeedStats::from_samples(&samples, &cfg);
        assert!(stats.steady_speed);
        assert!(stats.is_constant(&cfg));
        assert!((stats.speed_non_null_pct - 100.0).abs() < 1e-9);

        let ramp: Vec<RunSample> = (0..20)
            .map(|i| RunSample { speed_kmh: Some(30.0 + 4.0 * i as f64), ..Default::default() })
            .collect();
        let stats = SpeedStats::from_samples(&ramp, &cfg);
        assert!(!stats.steady_speed);
        assert!(!stats.is_constant(&cfg));
    }

    #[test]
    fn empty_speeds_are_neutral() {
        let cfg = FindingsConfig::default();
        let samples = vec![RunSample::default(); 3];
        let stats = SpeedStats::from_samples(&samples, &cfg);
        assert!(stats.mean_kmh.is_none());
        assert_eq!(stats.speed_non_null_pct, 0.0);
    }

    #[test]
    fn breakdowns_group_by_bin_and_phase() {
        let sample = |speed_kmh, vibration_strength_db| RunSample {
            speed_kmh,
            vibration_strength_db,
            ..Default::default()
        };
        let samples = vec![
            sample(Some(52.0), Some(10.0)),
            sample(Some(58.0), Some(20.0)),
            sample(Some(91.0), None),
            sample(None, Some(5.0)),
        ];
        let rows = speed_breakdown(&samples, 10.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].speed_range, "50-60 km/h");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].mean_vibration_strength_db, Some(15.0));
        assert_eq!(rows[1].mean_vibration_strength_db, None);

        use DrivingPhase::{Acceleration, Cruise, Idle};
        let phases = [Cruise, Cruise, Acceleration, Idle];
        let rows = phase_breakdown(&samples, &phases);
        let order: Vec<DrivingPhase> = rows.iter().map(|r| r.phase).collect();
        assert_eq!(order, vec![Idle, Cruise, Acceleration]);
        assert_eq!(rows[1].max_vibration_strength_db, Some(20.0));
    }
}
