//! Vibration strength scoring
//!
//! Converts peak-band energy against the local noise floor into a decibel
//! strength and a discrete severity bucket:
//!
//! ```text
//! strength_db = 20 * log10((band_rms + eps) / (floor + eps))
//! eps         = max(epsilon_min_g, floor * epsilon_floor_ratio)
//! ```
//!
//! The epsilon keeps the result finite when the floor collapses to zero and
//! maps equal band and floor to ~0 dB. Bucket flicker is suppressed by the
//! hysteresis state machine in [`hysteresis`].

pub mod hysteresis;

pub use crate::types::StrengthBucket;
pub use hysteresis::{severity_from_peak, SeverityArena, SeverityOutcome, SeverityState};

use serde::{Deserialize, Serialize};

use crate::config::StrengthConfig;
use crate::sanitize;

// ============================================================================
// Order Statistics
// ============================================================================

/// Median of the finite values; 0.0 when there are none.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Linear-interpolated percentile of an already sorted slice, `q` in [0, 1].
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn sorted_non_negative(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.filter(|v| v.is_finite() && *v >= 0.0).collect();
    out.sort_by(f64::total_cmp);
    out
}

// ============================================================================
// Noise Floor
// ============================================================================

/// P20 of a combined spectrum with the DC bin excluded.
pub fn noise_floor_p20(combined: &[f64]) -> f64 {
    let band = if combined.len() > 1 { &combined[1..] } else { combined };
    percentile(&sorted_non_negative(band.iter().copied()), 0.20)
}

/// Median of bins further than `exclusion_hz` from every peak, used as the
/// reference for strength dB. Falls back to P20 when every bin is excluded.
pub fn strength_floor(freq_hz: &[f64], amps: &[f64], peak_idx: &[usize], exclusion_hz: f64) -> f64 {
    let n = freq_hz.len().min(amps.len());
    if n == 0 {
        return 0.0;
    }
    let centers: Vec<f64> = peak_idx.iter().filter(|&&i| i < n).map(|&i| freq_hz[i]).collect();
    let selected = sorted_non_negative(
        (0..n)
            .filter(|&i| !centers.iter().any(|c| (freq_hz[i] - c).abs() <= exclusion_hz))
            .map(|i| amps[i]),
    );
    if selected.is_empty() {
        return noise_floor_p20(&amps[..n]);
    }
    median(&selected)
}

/// RMS of the bins within `bandwidth_hz` of `center_idx`.
pub fn peak_band_rms(freq_hz: &[f64], amps: &[f64], center_idx: usize, bandwidth_hz: f64) -> f64 {
    let n = freq_hz.len().min(amps.len());
    if center_idx >= n {
        return 0.0;
    }
    let center = freq_hz[center_idx];
    let (sq_sum, count) = (0..n)
        .filter(|&i| (freq_hz[i] - center).abs() <= bandwidth_hz)
        .fold((0.0, 0usize), |(s, c), i| (s + amps[i] * amps[i], c + 1));
    if count == 0 {
        0.0
    } else {
        (sq_sum / count as f64).sqrt()
    }
}

// ============================================================================
// Strength and Buckets
// ============================================================================

/// Strength of a band above its floor in dB.
///
/// Non-finite or negative inputs are treated as zero, so the result is always
/// finite.
pub fn strength_db(band_rms: f64, floor: f64, cfg: &StrengthConfig) -> f64 {
    let clean = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
    let band = clean(band_rms);
    let floor = clean(floor);
    let eps = cfg.epsilon_min_g.max(floor * cfg.epsilon_floor_ratio);
    20.0 * ((band + eps) / (floor + eps)).log10()
}

/// Highest bucket whose lower edge `db` reaches; `None` below the first edge.
pub fn bucket_for(db: f64, thresholds: &[f64; 5]) -> Option<StrengthBucket> {
    if !db.is_finite() {
        return None;
    }
    StrengthBucket::ALL
        .iter()
        .zip(thresholds.iter())
        .filter(|&(_, &min_db)| db >= min_db)
        .map(|(&bucket, _)| bucket)
        .last()
}

// ============================================================================
// Spectrum Strength Metrics
// ============================================================================

/// A scored peak of the combined spectrum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrengthPeak {
    #[serde(serialize_with = "sanitize::finite")]
    pub hz: f64,
    /// Band RMS around the peak
    #[serde(serialize_with = "sanitize::finite")]
    pub amp: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub strength_db: f64,
    pub bucket: Option<StrengthBucket>,
}

/// Strength summary of one combined spectrum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrengthMetrics {
    #[serde(serialize_with = "sanitize::finite")]
    pub vibration_strength_db: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub peak_amp_g: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub noise_floor_amp_g: f64,
    pub strength_bucket: Option<StrengthBucket>,
    /// Strongest first, spaced at least `peak_separation_hz` apart
    pub top_peaks: Vec<StrengthPeak>,
}

/// Score the peaks of a combined spectrum.
///
/// Candidates are local maxima above `max(P20 * threshold_ratio, P20 + eps)`;
/// the first and last bins qualify against their single neighbour. Candidates
/// are ranked by band-RMS dB and thinned to `top_n` separated peaks.
pub fn compute_strength_metrics(
    freq_hz: &[f64],
    combined: &[f64],
    cfg: &StrengthConfig,
    threshold_ratio: f64,
    top_n: usize,
) -> StrengthMetrics {
    let n = freq_hz.len().min(combined.len());
    if n == 0 {
        return StrengthMetrics::default();
    }
    let freq = &freq_hz[..n];
    let amps: Vec<f64> = combined[..n]
        .iter()
        .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
        .collect();

    let floor_p20 = noise_floor_p20(&amps);
    let threshold = (floor_p20 * threshold_ratio).max(floor_p20 + cfg.epsilon_min_g);

    let mut maxima = local_maxima(&amps, threshold);
    maxima.sort_by(|&a, &b| amps[b].total_cmp(&amps[a]));

    let floor_idx: Vec<usize> = maxima.iter().copied().take(top_n.max(1)).collect();
    let floor = strength_floor(freq, &amps, &floor_idx, cfg.peak_separation_hz);

    let mut candidates: Vec<StrengthPeak> = maxima
        .iter()
        .filter_map(|&idx| {
            let band = peak_band_rms(freq, &amps, idx, cfg.peak_bandwidth_hz);
            let db = strength_db(band, floor, cfg);
            db.is_finite().then(|| StrengthPeak {
                hz: freq[idx],
                amp: band,
                strength_db: db,
                bucket: bucket_for(db, &cfg.band_thresholds_db),
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.strength_db.total_cmp(&a.strength_db));

    let mut chosen: Vec<StrengthPeak> = Vec::with_capacity(top_n);
    for candidate in candidates {
        if chosen.len() >= top_n {
            break;
        }
        if chosen
            .iter()
            .any(|c| (c.hz - candidate.hz).abs() < cfg.peak_separation_hz)
        {
            continue;
        }
        chosen.push(candidate);
    }

    let (top_db, top_amp) = chosen
        .first()
        .map_or((0.0, 0.0), |p| (p.strength_db, p.amp));
    StrengthMetrics {
        vibration_strength_db: top_db,
        peak_amp_g: top_amp,
        noise_floor_amp_g: floor,
        strength_bucket: bucket_for(top_db, &cfg.band_thresholds_db),
        top_peaks: chosen,
    }
}

/// Indices of local maxima at or above `threshold`, edges included.
fn local_maxima(amps: &[f64], threshold: f64) -> Vec<usize> {
    let n = amps.len();
    let mut out = Vec::new();
    if n == 1 {
        if amps[0] >= threshold {
            out.push(0);
        }
        return out;
    }
    if amps[0] >= threshold && amps[0] > amps[1] {
        out.push(0);
    }
    for i in 1..n.saturating_sub(1) {
        let v = amps[i];
        if v >= threshold && v > amps[i - 1] && v >= amps[i + 1] {
            out.push(i);
        }
    }
    if amps[n - 1] >= threshold && amps[n - 1] > amps[n - 2] {
        out.push(n - 1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StrengthConfig {
        StrengthConfig::default()
    }

    #[test]
    fn bucket_boundaries_are_inclusive_on_lower_edge() {
        let t = cfg().band_thresholds_db;
        assert_eq!(bucket_for(7.999, &t), None);
        assert_eq!(bucket_for(8.0, &t), Some(StrengthBucket::L1));
        assert_eq!(bucket_for(15.999, &t), Some(StrengthBucket::L1));
        assert_eq!(bucket_for(16.0, &t), Some(StrengthBucket::L2));
        assert_eq!(bucket_for(26.0, &t), Some(StrengthBucket::L3));
        assert_eq!(bucket_for(36.0, &t), Some(StrengthBucket::L4));
        assert_eq!(bucket_for(45.999, &t), Some(StrengthBucket::L4));
        assert_eq!(bucket_for(46.0, &t), Some(StrengthBucket::L5));
        assert_eq!(bucket_for(120.0, &t), Some(StrengthBucket::L5));
        assert_eq!(bucket_for(f64::NAN, &t), None);
    }

    #[test]
    fn strength_db_zero_when_equal() {
        let db = strength_db(0.02, 0.02, &cfg());
        assert!(db.abs() < 1e-9, "got {db}");
    }

    #[test]
    fn strength_db_finite_with_zero_floor() {
        let db = strength_db(0.5, 0.0, &cfg());
        assert!(db.is_finite());
        assert!(db > 100.0);
        assert!(strength_db(0.0, 0.0, &cfg()).abs() < 1e-9);
    }

    #[test]
    fn strength_db_strictly_increasing_in_band() {
        let c = cfg();
        let mut prev = f64::NEG_INFINITY;
        for i in 0..50 {
            let band = 0.001 * f64::from(i) + 0.0005;
            let db = strength_db(band, 0.01, &c);
            assert!(db > prev, "not increasing at {band}");
            prev = db;
        }
    }

    #[test]
    fn strength_db_handles_nan() {
        assert!(strength_db(f64::NAN, 0.01, &cfg()).is_finite());
        assert!(strength_db(0.01, f64::NAN, &cfg()).is_finite());
    }

    #[test]
    fn percentile_interpolates() {
        let v = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert!((percentile(&v, 0.2) - 8.0).abs() < 1e-12);
        assert!((percentile(&v, 1.0) - 40.0).abs() < 1e-12);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn last_bin_peak_is_detected() {
        let freq: Vec<f64> = (0..64).map(|i| f64::from(i) * 0.5).collect();
        let mut amps = vec![0.001; 64];
        amps[63] = 0.2;
        let m = compute_strength_metrics(&freq, &amps, &cfg(), 2.6, 5);
        assert!(!m.top_peaks.is_empty());
        assert!((m.top_peaks[0].hz - 31.5).abs() < 1e-12);
    }

    #[test]
    fn first_bin_peak_is_detected() {
        let freq: Vec<f64> = (0..64).map(|i| f64::from(i) * 0.5).collect();
        let mut amps = vec![0.001; 64];
        amps[0] = 0.2;
        let maxima = local_maxima(&amps, 0.01);
        assert_eq!(maxima, vec![0]);
    }

    #[test]
    fn empty_spectrum_is_neutral() {
        let m = compute_strength_metrics(&[], &[], &cfg(), 2.6, 5);
        assert_eq!(m.vibration_strength_db, 0.0);
        assert!(m.top_peaks.is_empty());
        assert!(m.strength_bucket.is_none());
    }

    #[test]
    fn separated_peaks_only() {
        let freq: Vec<f64> = (0..200).map(|i| f64::from(i) * 0.5).collect();
        let mut amps = vec![0.001; 200];
        amps[40] = 0.3;
        amps[42] = 0.25; // 1.0 Hz away, inside separation
        amps[100] = 0.2;
        let m = compute_strength_metrics(&freq, &amps, &cfg(), 2.6, 8);
        let hz: Vec<f64> = m.top_peaks.iter().map(|p| p.hz).collect();
        for (i, a) in hz.iter().enumerate() {
            for b in &hz[i + 1..] {
                assert!((a - b).abs() >= 1.2, "peaks {a} and {b} too close");
            }
        }
        assert!(hz.contains(&50.0));
    }
}
