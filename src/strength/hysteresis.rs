//! Severity hysteresis: immediate escalation, delayed demotion.
//!
//! Each (source, sensor) pair owns an explicit [`SeverityState`] stored in a
//! [`SeverityArena`]. A single qualifying observation promotes the bucket; the
//! bucket is only demoted after `decay_ticks` consecutive observations more
//! than `hysteresis_db` below its lower edge.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::{bucket_for, StrengthBucket};
use crate::config::{defaults::SILENCE_DB, StrengthConfig};

/// Tracker state for one (source, sensor) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SeverityState {
    /// No bucket held.
    #[default]
    Quiet,
    /// Holding `bucket`.
    Active {
        bucket: StrengthBucket,
        ticks_in_bucket: u32,
        decay_count: u32,
    },
}

impl SeverityState {
    pub fn bucket(&self) -> Option<StrengthBucket> {
        match self {
            Self::Quiet => None,
            Self::Active { bucket, .. } => Some(*bucket),
        }
    }

    fn enter(bucket: Option<StrengthBucket>) -> Self {
        match bucket {
            None => Self::Quiet,
            Some(bucket) => Self::Active {
                bucket,
                ticks_in_bucket: 1,
                decay_count: 0,
            },
        }
    }
}

/// Result of one hysteresis step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityOutcome {
    /// Bucket held after this observation
    pub bucket: Option<StrengthBucket>,
    /// Strength after the multi-sensor corroboration bonus
    pub db: f64,
    /// The bucket rose strictly above the prior one
    pub escalated: bool,
    pub state: SeverityState,
}

/// Advance the hysteresis state machine by one observation.
pub fn severity_from_peak(
    db: f64,
    sensor_count: usize,
    prior: SeverityState,
    cfg: &StrengthConfig,
) -> SeverityOutcome {
    let adjusted = if sensor_count >= 2 {
        db + cfg.multi_sensor_corroboration_db
    } else {
        db
    };
    let observed = bucket_for(adjusted, &cfg.band_thresholds_db);

    let (state, escalated) = match prior {
        SeverityState::Quiet => (SeverityState::enter(observed), observed.is_some()),
        SeverityState::Active {
            bucket,
            ticks_in_bucket,
            decay_count,
        } => {
            if observed > Some(bucket) {
                (SeverityState::enter(observed), true)
            } else if observed == Some(bucket) {
                let held = SeverityState::Active {
                    bucket,
                    ticks_in_bucket: ticks_in_bucket.saturating_add(1),
                    decay_count: 0,
                };
                (held, false)
            } else {
                let lower_edge = cfg.band_thresholds_db[bucket.index()];
                let low = !adjusted.is_finite() || adjusted < lower_edge - cfg.hysteresis_db;
                let decay_count = if low { decay_count + 1 } else { 0 };
                if decay_count >= cfg.decay_ticks {
                    (SeverityState::enter(observed), false)
                } else {
                    let held = SeverityState::Active {
                        bucket,
                        ticks_in_bucket: ticks_in_bucket.saturating_add(1),
                        decay_count,
                    };
                    (held, false)
                }
            }
        }
    };

    SeverityOutcome {
        bucket: state.bucket(),
        db: adjusted,
        escalated,
        state,
    }
}

// ============================================================================
// Arena
// ============================================================================

#[derive(Debug, Clone, Default)]
struct TrackerSlot {
    state: SeverityState,
    silent_ticks: u32,
}

/// Hysteresis trackers indexed by key, with silence decay and pruning.
#[derive(Debug, Clone)]
pub struct SeverityArena<K> {
    slots: HashMap<K, TrackerSlot>,
    prune_after_ticks: u32,
}

impl<K: Eq + Hash + Clone> SeverityArena<K> {
    pub fn new(prune_after_ticks: u32) -> Self {
        Self {
            slots: HashMap::new(),
            prune_after_ticks,
        }
    }

    /// Feed one observation for `key`.
    pub fn observe(
        &mut self,
        key: K,
        db: f64,
        sensor_count: usize,
        cfg: &StrengthConfig,
    ) -> SeverityOutcome {
        let slot = self.slots.entry(key).or_default();
        let outcome = severity_from_peak(db, sensor_count, slot.state, cfg);
        slot.state = outcome.state;
        slot.silent_ticks = 0;
        outcome
    }

    /// Decay every tracker not in `seen` with a silent observation and drop
    /// trackers that stayed silent for the prune horizon.
    pub fn decay_unseen(&mut self, seen: &HashSet<K>, cfg: &StrengthConfig) {
        let prune_after = self.prune_after_ticks;
        self.slots.retain(|key, slot| {
            if seen.contains(key) {
                return true;
            }
            slot.state = severity_from_peak(SILENCE_DB, 1, slot.state, cfg).state;
            slot.silent_ticks = slot.silent_ticks.saturating_add(1);
            slot.silent_ticks < prune_after
        });
    }

    pub fn state(&self, key: &K) -> SeverityState {
        self.slots.get(key).map(|s| s.state).unwrap_or_default()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
