//! Driving-Phase Segmentation
//!
//! Classifies each run sample into a [`DrivingPhase`] from its speed and the
//! local speed derivative, then merges contiguous same-phase samples into
//! [`PhaseSegment`]s. The findings engine uses the per-sample labels to keep
//! idle noise out of the evidence and to weight cruise evidence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PhaseConfig;
use crate::sanitize;
use crate::types::RunSample;

// ============================================================================
// Phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingPhase {
    #[default]
    Idle,
    Cruise,
    Acceleration,
    Deceleration,
    CoastDown,
}

impl DrivingPhase {
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Cruise,
        Self::Acceleration,
        Self::Deceleration,
        Self::CoastDown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Cruise => "cruise",
            Self::Acceleration => "acceleration",
            Self::Deceleration => "deceleration",
            Self::CoastDown => "coast_down",
        }
    }

    /// Speed is changing fast enough that order tracking is smeared.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Acceleration | Self::Deceleration | Self::CoastDown)
    }
}

impl std::fmt::Display for DrivingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classify one sample.
///
/// Unknown or at-or-below-idle speed is idle. Without a derivative, a moving
/// sample is cruise.
pub fn classify_sample(
    speed_kmh: Option<f64>,
    derivative_kmh_s: Option<f64>,
    cfg: &PhaseConfig,
) -> DrivingPhase {
    let Some(speed) = speed_kmh.filter(|s| s.is_finite()) else {
        return DrivingPhase::Idle;
    };
    if speed <= cfg.idle_speed_kmh {
        return DrivingPhase::Idle;
    }
    match derivative_kmh_s.filter(|d| d.is_finite()) {
        Some(d) if d > cfg.accel_threshold_kmh_s => DrivingPhase::Acceleration,
        Some(d) if d < cfg.decel_threshold_kmh_s => {
            if speed < cfg.coast_down_max_kmh {
                DrivingPhase::CoastDown
            } else {
                DrivingPhase::Deceleration
            }
        }
        _ => DrivingPhase::Cruise,
    }
}

fn valid_point(speeds: &[Option<f64>], times: &[Option<f64>], j: usize) -> Option<(f64, f64)> {
    let s = speeds.get(j).copied().flatten().filter(|v| v.is_finite())?;
    let t = times.get(j).copied().flatten().filter(|v| v.is_finite())?;
    Some((s, t))
}

/// Speed derivative (km/h per second) at `idx`.
///
/// Uses the nearest valid sample on each side whose timestamp differs by more
/// than `min_dt_s` (several sensors share one tick timestamp). Centered when
/// both sides exist, one-sided at the boundaries, `None` when no usable
/// neighbor exists or `idx` is out of range.
pub fn estimate_derivative(
    speeds: &[Option<f64>],
    times: &[Option<f64>],
    idx: usize,
    min_dt_s: f64,
) -> Option<f64> {
    let n = speeds.len().min(times.len());
    if idx >= n {
        return None;
    }
    let own_t = times[idx].filter(|t| t.is_finite());
    let current = valid_point(speeds, times, idx);

    let far_enough =
        |t: f64, from: Option<f64>| from.map_or(true, |own| (t - own).abs() > min_dt_s);
    let prev = (0..idx)
        .rev()
        .filter_map(|j| valid_point(speeds, times, j))
        .find(|(_, t)| far_enough(*t, own_t));
    let next = (idx + 1..n)
        .filter_map(|j| valid_point(speeds, times, j))
        .find(|(_, t)| far_enough(*t, own_t));

    if let (Some((s0, t0)), Some((s1, t1))) = (prev, next) {
        let dt = t1 - t0;
        if dt > min_dt_s {
            return Some((s1 - s0) / dt);
        }
    }

    let (sc, tc) = current?;
    if let Some((s0, t0)) = prev {
        let dt = tc - t0;
        if dt > min_dt_s {
            return Some((sc - s0) / dt);
        }
    }
    if let Some((s1, t1)) = next {
        let dt = t1 - tc;
        if dt > min_dt_s {
            return Some((s1 - sc) / dt);
        }
    }
    None
}

// ============================================================================
// Segmentation
// ============================================================================

/// Contiguous run of samples sharing a phase. Indices are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSegment {
    pub phase: DrivingPhase,
    pub start_idx: usize,
    pub end_idx: usize,
    #[serde(serialize_with = "sanitize::finite")]
    pub start_t_s: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub end_t_s: f64,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub speed_min_kmh: Option<f64>,
    #[serde(serialize_with = "sanitize::finite_opt")]
    pub speed_max_kmh: Option<f64>,
    pub sample_count: usize,
}

/// Per-sample labels plus the merged segments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseSegmentation {
    pub phases: Vec<DrivingPhase>,
    pub segments: Vec<PhaseSegment>,
}

/// Classify every sample, then merge consecutive identical phases.
///
/// Segments partition the sample sequence: no gaps, no overlaps.
pub fn segment_run(samples: &[RunSample], cfg: &PhaseConfig) -> PhaseSegmentation {
    if samples.is_empty() {
        return PhaseSegmentation::default();
    }
    let speeds: Vec<Option<f64>> = samples.iter().map(|s| s.speed_kmh).collect();
    let times: Vec<Option<f64>> = samples.iter().map(|s| Some(s.t_s)).collect();

    let phases: Vec<DrivingPhase> = (0..samples.len())
        .map(|i| {
            let d = estimate_derivative(&speeds, &times, i, cfg.min_derivative_dt_s);
            classify_sample(speeds[i], d, cfg)
        })
        .collect();

    let mut segments = Vec::new();
    let mut start = 0;
    for i in 1..=phases.len() {
        if i < phases.len() && phases[i] == phases[start] {
            continue;
        }
        let end = i - 1;
        let seg_speeds: Vec<f64> = speeds[start..=end]
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let seg_times: Vec<f64> = samples[start..=end]
            .iter()
            .map(|s| s.t_s)
            .filter(|t| t.is_finite())
            .collect();
        segments.push(PhaseSegment {
            phase: phases[start],
            start_idx: start,
            end_idx: end,
            start_t_s: seg_times.iter().copied().reduce(f64::min).unwrap_or(0.0),
            end_t_s: seg_times.iter().copied().reduce(f64::max).unwrap_or(0.0),
            speed_min_kmh: seg_speeds.iter().copied().reduce(f64::min),
            speed_max_kmh: seg_speeds.iter().copied().reduce(f64::max),
            sample_count: end - start + 1,
        });
        start = i;
    }

    PhaseSegmentation { phases, segments }
}

/// Per-phase sample accounting for the run summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseSummary {
    pub phase_counts: BTreeMap<DrivingPhase, usize>,
    pub phase_pcts: BTreeMap<DrivingPhase, f64>,
    pub total_samples: usize,
    pub segment_count: usize,
    pub has_cruise: bool,
    pub has_acceleration: bool,
    pub cruise_pct: f64,
    pub idle_pct: f64,
}

pub fn phase_summary(segments: &[PhaseSegment]) -> PhaseSummary {
    let mut counts: BTreeMap<DrivingPhase, usize> = BTreeMap::new();
    for seg in segments {
        *counts.entry(seg.phase).or_default() += seg.sample_count;
    }
    let total: usize = counts.values().sum();
    let pcts: BTreeMap<DrivingPhase, f64> = counts
        .iter()
        .map(|(p, c)| {
            let pct = if total > 0 { *c as f64 / total as f64 * 100.0 } else { 0.0 };
            (*p, pct)
        })
        .collect();

    PhaseSummary {
        has_cruise: counts.get(&DrivingPhase::Cruise).is_some_and(|c| *c > 0),
        has_acceleration: counts.get(&DrivingPhase::Acceleration).is_some_and(|c| *c > 0),
        cruise_pct: pcts.get(&DrivingPhase::Cruise).copied().unwrap_or(0.0),
        idle_pct: pcts.get(&DrivingPhase::Idle).copied().unwrap_or(0.0),
        phase_counts: counts,
        phase_pcts: pcts,
        total_samples: total,
        segment_count: segments.len(),
    }
}

/// Samples that carry diagnostic evidence. Idle is always excluded; coast-down
/// optionally.
pub fn diagnostic_sample_mask(phases: &[DrivingPhase], exclude_coast_down: bool) -> Vec<bool> {
    phases
        .iter()
        .map(|p| match p {
            DrivingPhase::Idle => false,
            DrivingPhase::CoastDown => !exclude_coast_down,
            _ => true,
        })
        .collect()
}
