//! Current driving phase from a short rolling speed history.

use std::collections::VecDeque;

use crate::config::{defaults::LIVE_PHASE_HISTORY, PhaseConfig};
use crate::phase::{classify_sample, DrivingPhase};

/// Shortest span the rolling derivative is computed over.
const MIN_SPAN_S: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct PhaseClassifier {
    history: VecDeque<(f64, Option<f64>)>,
    current: DrivingPhase,
    cfg: PhaseConfig,
}

impl PhaseClassifier {
    pub fn new(cfg: PhaseConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(LIVE_PHASE_HISTORY),
            current: DrivingPhase::Idle,
            cfg,
        }
    }

    pub fn current(&self) -> DrivingPhase {
        self.current
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current = DrivingPhase::Idle;
    }

    /// Push a speed reading and reclassify. The derivative spans the oldest
    /// and newest known speeds in the window.
    pub fn update(&mut self, speed_kmh: Option<f64>, now_s: f64) -> DrivingPhase {
        if self.history.len() >= LIVE_PHASE_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back((now_s, speed_kmh.filter(|v| v.is_finite())));

        let mut known = self.history.iter().filter_map(|(t, s)| s.map(|s| (*t, s)));
        let first = known.next();
        let last = known.last();
        let derivative = match (first, last) {
            (Some((t0, s0)), Some((t1, s1))) if t1 - t0 >= MIN_SPAN_S => {
                Some((s1 - s0) / (t1 - t0))
            }
            _ => None,
        };
        self.current = classify_sample(speed_kmh, derivative, &self.cfg);
        self.current
    }
}
