//! Location ranking for order findings.
//!
//! Matched points are grouped by speed bin. Within a bin each location is
//! scored by the mean of `amp * quality * corroboration`, where quality is
//! `1 - rel_error` and corroboration boosts matches that another location
//! saw at the same frequency. The bin with the best
//! `mean_amp * ln(1 + samples)` wins.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use statrs::statistics::Statistics;

use super::speed_profile::{speed_bin, speed_bin_label, weighted_percentile};
use super::MatchedPoint;
use crate::config::{FindingsConfig, StrengthConfig};
use crate::sanitize;
use crate::types::{LocationHypothesis, RunSample, SensorLocation, VibrationSource};

/// Result of ranking locations for one finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSummary {
    pub top_location: SensorLocation,
    pub second_location: Option<SensorLocation>,
    /// Label of the winning speed bin, or the weighted P10-P90 window of the
    /// top location when one can be computed
    pub speed_range: String,
    #[serde(serialize_with = "sanitize::finite")]
    pub mean_amp: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub dominance_ratio: f64,
    pub location_count: usize,
    pub total_samples: usize,
    pub ambiguous: bool,
    pub weak_spatial_separation: bool,
    #[serde(serialize_with = "sanitize::finite")]
    pub localization_confidence: f64,
    /// Wheel source, but no wheel-corner sensor was among the candidates
    pub no_wheel_sensors: bool,
    /// Most locations that saw the same frequency as one top-location match
    pub corroborated_by_n_sensors: usize,
}

impl LocationSummary {
    /// The location hypothesis this summary supports on its own.
    ///
    /// Weak separation never yields a single corner.
    pub fn hypothesis(&self) -> LocationHypothesis {
        if self.ambiguous || self.weak_spatial_separation {
            let mut candidates = vec![self.top_location];
            candidates.extend(self.second_location);
            if candidates.len() < 2 {
                return LocationHypothesis::Unknown;
            }
            return LocationHypothesis::Ambiguous { candidates };
        }
        LocationHypothesis::Localized { location: self.top_location }
    }
}

/// `[0.05, 1]`: grows with dominance, shrinks with the number of competing
/// locations, and saturates at ten samples.
pub fn localization_confidence(
    dominance_ratio: f64,
    location_count: usize,
    total_samples: usize,
) -> f64 {
    let dominance = ((dominance_ratio - 1.0) / 0.5).clamp(0.0, 1.0);
    let locations = 1.0 / (1.0 + location_count.saturating_sub(1) as f64 * 0.15);
    let samples = (total_samples as f64 / 10.0).clamp(0.0, 1.0);
    (dominance * locations * (0.6 + 0.4 * samples)).clamp(0.05, 1.0)
}

/// Dominance below which two locations are not meaningfully separated.
///
/// +10 % per location beyond two, since chance ties get likelier.
pub fn weak_spatial_dominance_threshold(location_count: usize, base: f64) -> f64 {
    let n = location_count.max(2);
    base * (1.0 + 0.1 * (n - 2) as f64)
}

/// Locations that reported through (nearly) the whole run.
///
/// A location must have at least 80 % of the busiest location's sample count
/// (when that count reaches 5) and must span the run within an edge tolerance
/// of 8 % of its duration, bounded to 0.75..3 s. Falls back to every seen
/// location when none qualifies.
pub fn connected_locations(samples: &[RunSample]) -> BTreeSet<SensorLocation> {
    let mut times: BTreeMap<SensorLocation, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        if let Some(location) = sample.location {
            if sample.t_s.is_finite() {
                times.entry(location).or_default().push(sample.t_s);
            }
        }
    }
    if times.is_empty() {
        return BTreeSet::new();
    }
    let all = || times.values().flatten().copied();
    let run_start = all().fold(f64::INFINITY, f64::min);
    let run_end = all().fold(f64::NEG_INFINITY, f64::max);
    let edge_tolerance = ((run_end - run_start).max(0.0) * 0.08).clamp(0.75, 3.0);
    let max_count = times.values().map(Vec::len).max().unwrap_or(0);
    let min_count = if max_count >= 5 { (max_count as f64 * 0.8) as usize } else { 1 };

    let connected: BTreeSet<SensorLocation> = times
        .iter()
        .filter(|(_, ts)| ts.len() >= min_count)
        .filter(|(_, ts)| {
            let start = ts.iter().copied().fold(f64::INFINITY, f64::min);
            let end = ts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            start <= run_start + edge_tolerance && end >= run_end - edge_tolerance
        })
        .map(|(loc, _)| *loc)
        .collect();
    if connected.is_empty() {
        times.into_keys().collect()
    } else {
        connected
    }
}

struct BinRow {
    location: SensorLocation,
    amp: f64,
    speed_kmh: f64,
    matched_hz: f64,
    rel_error: f64,
}

/// Rank locations over `points`, optionally inside one speed bin.
///
/// Returns `None` when no point carries a location, a speed and an amplitude.
pub fn summarize_locations(
    points: &[MatchedPoint],
    allowed_bin: Option<i64>,
    connected: &BTreeSet<SensorLocation>,
    source: VibrationSource,
    cfg: &FindingsConfig,
    strength: &StrengthConfig,
) -> Option<LocationSummary> {
    let width = cfg.speed_bin_width_kmh;
    let mut grouped: BTreeMap<i64, Vec<BinRow>> = BTreeMap::new();
    for p in points {
        let (Some(location), Some(speed)) = (p.location, p.speed_kmh) else {
            continue;
        };
        if !(p.amp.is_finite() && p.amp > 0.0) {
            continue;
        }
        let Some(bin) = speed_bin(speed, width) else {
            continue;
        };
        if allowed_bin.is_some_and(|b| b != bin) {
            continue;
        }
        grouped.entry(bin).or_default().push(BinRow {
            location,
            amp: p.amp,
            speed_kmh: speed,
            matched_hz: p.matched_hz,
            rel_error: p.rel_error,
        });
    }

    let corroboration_gain = 10f64.powf(strength.multi_sensor_corroboration_db / 20.0);
    let mut best: Option<(f64, i64, LocationSummary)> = None;

    for (bin, rows) in &grouped {
        let mut scores: BTreeMap<SensorLocation, Vec<f64>> = BTreeMap::new();
        let mut corroborated: BTreeMap<SensorLocation, usize> = BTreeMap::new();
        for row in rows {
            let quality = if row.rel_error.is_finite() {
                (1.0 - row.rel_error).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let tolerance = (row.matched_hz * 0.03).max(0.75);
            let peers: BTreeSet<SensorLocation> = rows
                .iter()
                .filter(|peer| {
                    peer.location != row.location
                        && (peer.matched_hz - row.matched_hz).abs() <= tolerance
                })
                .map(|peer| peer.location)
                .collect();
            let gain = if peers.is_empty() { 1.0 } else { corroboration_gain };
            scores.entry(row.location).or_default().push(row.amp * quality * gain);
            let n = corroborated.entry(row.location).or_insert(1);
            *n = (*n).max(1 + peers.len());
        }

        let mut ranked: Vec<(SensorLocation, f64)> = scores
            .iter()
            .map(|(loc, vals)| (*loc, vals.iter().mean()))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let eligible: Vec<(SensorLocation, f64)> = ranked
            .iter()
            .copied()
            .filter(|(loc, _)| connected.contains(loc))
            .collect();
        let mut winners = if eligible.is_empty() { ranked } else { eligible };
        let mut no_wheel_sensors = false;
        if source.prefers_wheel_location() {
            let wheels: Vec<(SensorLocation, f64)> =
                winners.iter().copied().filter(|(loc, _)| loc.is_wheel()).collect();
            if wheels.is_empty() {
                no_wheel_sensors = true;
            } else {
                winners = wheels;
            }
        }
        let Some(&(top_location, top_amp)) = winners.first() else {
            continue;
        };
        let second = winners.get(1).copied();
        let second_amp = second.map_or(top_amp, |(_, amp)| amp);
        let dominance_ratio = if second_amp > 0.0 { top_amp / second_amp } else { 1.0 };
        let total_samples = rows.len();
        let location_count = winners.len();
        let ambiguous = location_count > 1 && dominance_ratio < cfg.near_tie_dominance;
        let weak_threshold =
            weak_spatial_dominance_threshold(location_count, cfg.weak_spatial_dominance);
        let weak = no_wheel_sensors || dominance_ratio < weak_threshold;

        let summary = LocationSummary {
            top_location,
            second_location: second.map(|(loc, _)| loc),
            speed_range: speed_bin_label(*bin, width),
            mean_amp: top_amp,
            dominance_ratio,
            location_count,
            total_samples,
            ambiguous,
            weak_spatial_separation: weak,
            localization_confidence: localization_confidence(
                dominance_ratio,
                location_count,
                total_samples,
            ),
            no_wheel_sensors,
            corroborated_by_n_sensors: corroborated.get(&top_location).copied().unwrap_or(1),
        };
        let score = top_amp * (total_samples as f64).ln_1p();
        if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
            best = Some((score, *bin, summary));
        }
    }

    let (_, _, mut summary) = best?;
    let top_pairs: Vec<(f64, f64)> = grouped
        .values()
        .flatten()
        .filter(|r| r.location == summary.top_location)
        .map(|r| (r.speed_kmh, r.amp))
        .collect();
    let p10 = weighted_percentile(&top_pairs, 0.10);
    let p90 = weighted_percentile(&top_pairs, 0.90);
    if let (Some(p10), Some(p90)) = (p10, p90) {
        let (lo, hi) = (p10.min(p90).floor(), p10.max(p90).ceil());
        summary.speed_range = format!("{lo:.0}-{hi:.0} km/h");
    }
    Some(summary)
}

/// Per-location match accounting for [`detect_diffuse_excitation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationMatchStats {
    pub possible: usize,
    pub matched: usize,
}

/// Uniform match rates and amplitudes across connected locations.
///
/// Returns the confidence penalty when the excitation is diffuse: at least two
/// locations with enough coverage, match-rate spread under 0.15, mean rate
/// above 0.15 and a max/min mean-amplitude ratio of at most 2.
pub fn detect_diffuse_excitation(
    connected: &BTreeSet<SensorLocation>,
    by_location: &BTreeMap<SensorLocation, LocationMatchStats>,
    points: &[MatchedPoint],
    cfg: &FindingsConfig,
) -> Option<f64> {
    if connected.len() < 2 {
        return None;
    }
    let min_possible = cfg.min_match_points.max(3);
    let mut rates = Vec::new();
    let mut mean_amps = Vec::new();
    for loc in connected {
        let stats = by_location.get(loc).copied().unwrap_or_default();
        if stats.possible < min_possible {
            continue;
        }
        rates.push(stats.matched as f64 / stats.possible.max(1) as f64);
        let amps: Vec<f64> = points
            .iter()
            .filter(|p| p.location == Some(*loc) && p.amp > 0.0)
            .map(|p| p.amp)
            .collect();
        if !amps.is_empty() {
            mean_amps.push(amps.iter().mean());
        }
    }
    if rates.len() < 2 {
        return None;
    }
    let spread = Statistics::max(rates.iter()) - Statistics::min(rates.iter());
    let mean_rate = rates.iter().mean();
    let amp_uniform = if mean_amps.len() >= 2 {
        let lo = Statistics::min(mean_amps.iter());
        lo <= 0.0 || Statistics::max(mean_amps.iter()) / lo <= 2.0
    } else {
        true
    };
    (spread < 0.15 && mean_rate > 0.15 && amp_uniform)
        .then(|| (0.85 - 0.04 * rates.len() as f64).max(0.65))
}
