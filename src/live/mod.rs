//! Live Diagnostics Aggregator
//!
//! Consumes per-tick strength peaks from every sensor and maintains:
//!
//! - one hysteresis tracker per `sensor:class_key`, plus combined trackers for
//!   groups of sensors reporting the same class at nearly the same frequency
//! - the cumulative source x severity [`SeverityMatrix`], plus a rolling-window
//!   view of it
//! - active levels by source, sensor and location
//! - the current driving phase
//!
//! Events are emitted only when a tracker escalates to a strictly higher
//! bucket. Readers get owned [`LiveSnapshot`]s; nothing inside the aggregator
//! is shared.

pub mod matrix;
pub mod phase_classifier;

pub use matrix::{MatrixCell, MatrixGrid, SeverityMatrix};
pub use phase_classifier::PhaseClassifier;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::defaults::SILENCE_DB;
use crate::config::{LiveConfig, OrderConfig, PhaseConfig, StrengthConfig, VehicleSpec};
use crate::findings::{Finding, FindingSeverity};
use crate::orders::{classify_with_orders, vehicle_orders, Hypothesis};
use crate::phase::DrivingPhase;
use crate::sanitize;
use crate::strength::{SeverityArena, StrengthPeak};
use crate::types::{MatrixSource, SensorLocation, StrengthBucket};

/// Peaks per sensor considered each tick.
const PEAKS_PER_SENSOR: usize = 4;

// ============================================================================
// Inputs and Outputs
// ============================================================================

/// One sensor's strength peaks for the current tick.
#[derive(Debug, Clone)]
pub struct SensorObservation {
    pub sensor_id: String,
    pub label: String,
    pub location: Option<SensorLocation>,
    pub peaks: Vec<StrengthPeak>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveEventKind {
    Single,
    Multi,
}

/// An escalation of one tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveEvent {
    pub event_id: u64,
    pub kind: LiveEventKind,
    pub ts_ms: u64,
    pub class_key: Hypothesis,
    pub sensor_ids: Vec<String>,
    pub sensor_labels: Vec<String>,
    #[serde(serialize_with = "sanitize::finite")]
    pub peak_hz: f64,
    #[serde(serialize_with = "sanitize::finite")]
    pub peak_amp_g: f64,
    pub bucket: StrengthBucket,
    pub previous_bucket: Option<StrengthBucket>,
    #[serde(serialize_with = "sanitize::finite")]
    pub vibration_strength_db: f64,
}

/// Strongest active level for a source, sensor or location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveLevel {
    pub bucket: StrengthBucket,
    #[serde(serialize_with = "sanitize::finite")]
    pub strength_db: f64,
    pub sensor_label: String,
    pub location: Option<SensorLocation>,
    pub class_key: Hypothesis,
    #[serde(serialize_with = "sanitize::finite")]
    pub peak_hz: f64,
}

/// Location level with the number of sensors agreeing on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationLevel {
    #[serde(flatten)]
    pub level: ActiveLevel,
    pub agreement_count: usize,
    pub sensor_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActiveLevels {
    pub by_source: BTreeMap<MatrixSource, ActiveLevel>,
    pub by_sensor: BTreeMap<String, ActiveLevel>,
    pub by_location: BTreeMap<SensorLocation, LocationLevel>,
}

/// Owned copy of the aggregator state.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub sequence: u64,
    /// Cumulative since the last reset
    pub matrix: MatrixGrid,
    /// Same cells restricted to the rolling window
    pub recent_matrix: MatrixGrid,
    /// Events emitted by the latest tick
    pub events: Vec<LiveEvent>,
    /// Most recent events across ticks, newest last
    pub recent_events: Vec<LiveEvent>,
    pub levels: ActiveLevels,
    pub findings: Vec<Finding>,
    pub top_finding: Option<Finding>,
    pub driving_phase: DrivingPhase,
}

// ============================================================================
// Trackers
// ============================================================================

#[derive(Debug, Clone)]
struct TrackerInfo {
    sensor_id: String,
    label: String,
    location: Option<SensorLocation>,
    class_key: Hypothesis,
    peak_hz: f64,
    peak_amp: f64,
    strength_db: f64,
    bucket: Option<StrengthBucket>,
    last_update_ms: u64,
}

impl TrackerInfo {
    fn level(&self) -> Option<ActiveLevel> {
        Some(ActiveLevel {
            bucket: self.bucket?,
            strength_db: self.strength_db,
            sensor_label: self.label.clone(),
            location: self.location,
            class_key: self.class_key,
            peak_hz: self.peak_hz,
        })
    }
}

/// Mean of dB values in the linear domain.
fn combine_strength_db(values: &[f64]) -> f64 {
    let linear: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| 10f64.powf(v.clamp(-60.0, 200.0) / 20.0))
        .collect();
    if linear.is_empty() {
        return SILENCE_DB;
    }
    let mean = linear.iter().sum::<f64>() / linear.len() as f64;
    if mean > 0.0 {
        20.0 * mean.log10()
    } else {
        SILENCE_DB
    }
}

fn upsert(map_level: Option<&ActiveLevel>, candidate: &ActiveLevel) -> bool {
    map_level.map_or(true, |existing| candidate.strength_db > existing.strength_db)
}

// ============================================================================
// Aggregator
// ============================================================================

pub struct LiveDiagnostics {
    live: LiveConfig,
    strength: StrengthConfig,
    orders: OrderConfig,
    vehicle: VehicleSpec,

    matrix: SeverityMatrix,
    sensor_arena: SeverityArena<String>,
    sensor_info: HashMap<String, TrackerInfo>,
    combined_arena: SeverityArena<String>,
    combined_info: HashMap<String, TrackerInfo>,
    phase: PhaseClassifier,

    levels: ActiveLevels,
    latest_events: Vec<LiveEvent>,
    recent_events: VecDeque<LiveEvent>,
    findings: Vec<Finding>,
    last_update_ms: Option<u64>,
    sequence: u64,
    next_event_id: u64,
}

impl LiveDiagnostics {
    pub fn new(
        live: LiveConfig,
        strength: StrengthConfig,
        orders: OrderConfig,
        phase: PhaseConfig,
        vehicle: VehicleSpec,
    ) -> Self {
        Self {
            matrix: SeverityMatrix::new(live.matrix_window_secs),
            sensor_arena: SeverityArena::new(live.tracker_prune_ticks),
            sensor_info: HashMap::new(),
            combined_arena: SeverityArena::new(live.tracker_prune_ticks),
            combined_info: HashMap::new(),
            phase: PhaseClassifier::new(phase),
            levels: ActiveLevels::default(),
            latest_events: Vec::new(),
            recent_events: VecDeque::new(),
            findings: Vec::new(),
            last_update_ms: None,
            sequence: 0,
            next_event_id: 0,
            vehicle: vehicle.sanitized(),
            live,
            strength,
            orders,
        }
    }

    /// New vehicle settings apply from the next tick.
    pub fn set_vehicle(&mut self, vehicle: &VehicleSpec) {
        self.vehicle = vehicle.sanitized();
    }

    /// Replace the findings shown in snapshots.
    pub fn set_findings(&mut self, findings: Vec<Finding>) {
        self.findings = findings;
    }

    pub fn driving_phase(&self) -> DrivingPhase {
        self.phase.current()
    }

    /// Zero the matrix and forget every tracker, event and finding.
    pub fn reset(&mut self) {
        self.matrix.reset();
        self.sensor_arena.clear();
        self.sensor_info.clear();
        self.combined_arena.clear();
        self.combined_info.clear();
        self.phase.reset();
        self.levels = ActiveLevels::default();
        self.latest_events.clear();
        self.recent_events.clear();
        self.findings.clear();
        self.last_update_ms = None;
        self.sequence = 0;
        self.next_event_id = 0;
        info!("[LiveDiagnostics] Reset");
    }

    /// Advance one tick.
    pub fn update(
        &mut self,
        now_ms: u64,
        speed_mps: Option<f64>,
        observations: &[SensorObservation],
    ) -> LiveSnapshot {
        let speed_mps = speed_mps.filter(|v| v.is_finite());
        self.phase.update(speed_mps.map(|v| v * 3.6), now_ms as f64 / 1000.0);

        let dt_seconds = self
            .last_update_ms
            .map_or(0.0, |last| (now_ms.saturating_sub(last) as f64 / 1000.0).clamp(0.0, 1.0));
        self.last_update_ms = Some(now_ms);
        let active_sources: BTreeMap<MatrixSource, StrengthBucket> =
            self.levels.by_source.iter().map(|(s, l)| (*s, l.bucket)).collect();
        self.matrix.accumulate_seconds(now_ms, dt_seconds, &active_sources);

        let orders = speed_mps.and_then(|v| vehicle_orders(v, &self.vehicle));
        let mut strongest: BTreeMap<String, TrackerInfo> = BTreeMap::new();
        for obs in observations {
            for peak in obs.peaks.iter().take(PEAKS_PER_SENSOR) {
                if !(peak.hz.is_finite() && peak.strength_db.is_finite()) {
                    continue;
                }
                let class =
                    classify_with_orders(peak.hz, orders.as_ref(), &self.vehicle, &self.orders);
                let key = format!("{}:{}", obs.sensor_id, class.hypothesis.key());
                let candidate = TrackerInfo {
                    sensor_id: obs.sensor_id.clone(),
                    label: obs.label.clone(),
                    location: obs.location,
                    class_key: class.hypothesis,
                    peak_hz: peak.hz,
                    peak_amp: peak.amp,
                    strength_db: peak.strength_db,
                    bucket: None,
                    last_update_ms: now_ms,
                };
                let stronger = strongest
                    .get(&key)
                    .map_or(true, |prev| candidate.strength_db > prev.strength_db);
                if stronger {
                    strongest.insert(key, candidate);
                }
            }
        }

        let mut events = Vec::new();
        for (key, mut info) in strongest.iter().map(|(k, v)| (k.clone(), v.clone())) {
            let previous = self.sensor_arena.state(&key).bucket();
            let outcome = self
                .sensor_arena
                .observe(key.clone(), info.strength_db, 1, &self.strength);
            info.strength_db = outcome.db;
            info.bucket = outcome.bucket;
            if let (true, Some(bucket)) = (outcome.escalated, outcome.bucket) {
                self.matrix.record_escalation(
                    now_ms,
                    info.class_key.matrix_sources(),
                    bucket,
                    &info.label,
                );
                events.push(self.make_event(
                    LiveEventKind::Single,
                    now_ms,
                    &[&info],
                    bucket,
                    previous,
                    outcome.db,
                ));
            }
            self.sensor_info.insert(key, info);
        }

        let seen: HashSet<String> = strongest.keys().cloned().collect();
        self.sensor_arena.decay_unseen(&seen, &self.strength);
        let arena = &self.sensor_arena;
        self.sensor_info.retain(|key, _| arena.contains(key));
        for (key, info) in self.sensor_info.iter_mut() {
            if !seen.contains(key) {
                info.bucket = arena.state(key).bucket();
                info.strength_db = SILENCE_DB;
            }
        }

        let mut levels = self.collect_levels();
        self.process_combined(now_ms, &mut levels, &mut events);

        if !events.is_empty() {
            debug!(events = events.len(), "[LiveDiagnostics] Escalations this tick");
        }
        for event in &events {
            if self.recent_events.len() >= self.live.max_recent_events.max(1) {
                self.recent_events.pop_front();
            }
            self.recent_events.push_back(event.clone());
        }
        self.levels = levels;
        self.latest_events = events;
        self.matrix.refresh_window(now_ms);
        self.sequence += 1;
        self.snapshot()
    }

    fn make_event(
        &mut self,
        kind: LiveEventKind,
        now_ms: u64,
        group: &[&TrackerInfo],
        bucket: StrengthBucket,
        previous_bucket: Option<StrengthBucket>,
        db: f64,
    ) -> LiveEvent {
        let n = group.len().max(1) as f64;
        let event = LiveEvent {
            event_id: self.next_event_id,
            kind,
            ts_ms: now_ms,
            class_key: group.first().map_or(Hypothesis::Other, |t| t.class_key),
            sensor_ids: group.iter().map(|t| t.sensor_id.clone()).collect(),
            sensor_labels: group.iter().map(|t| t.label.clone()).collect(),
            peak_hz: group.iter().map(|t| t.peak_hz).sum::<f64>() / n,
            peak_amp_g: group.iter().map(|t| t.peak_amp).sum::<f64>() / n,
            bucket,
            previous_bucket,
            vibration_strength_db: db,
        };
        self.next_event_id += 1;
        event
    }

    /// Rebuild source, sensor and location levels from every live tracker.
    fn collect_levels(&self) -> ActiveLevels {
        let mut levels = ActiveLevels::default();
        let mut by_location: BTreeMap<SensorLocation, Vec<&TrackerInfo>> = BTreeMap::new();
        for info in self.sensor_info.values() {
            let Some(level) = info.level() else { continue };
            for source in info.class_key.matrix_sources() {
                if upsert(levels.by_source.get(source), &level) {
                    levels.by_source.insert(*source, level.clone());
                }
            }
            if upsert(levels.by_sensor.get(&info.sensor_id), &level) {
                levels.by_sensor.insert(info.sensor_id.clone(), level.clone());
            }
            if let Some(loc) = info.location {
                by_location.entry(loc).or_default().push(info);
            }
        }

        let bin_width = self.live.multi_freq_bin_hz.max(0.01);
        let bin_of =
            |t: &TrackerInfo| (t.class_key, t.bucket, (t.peak_hz / bin_width).round() as i64);
        for (loc, candidates) in by_location {
            let Some(dominant) = candidates
                .iter()
                .copied()
                .max_by(|a, b| a.strength_db.total_cmp(&b.strength_db))
            else {
                continue;
            };
            let Some(level) = dominant.level() else { continue };
            let dominant_bin = bin_of(dominant);
            let agreeing: BTreeSet<&str> = candidates
                .iter()
                .filter(|t| bin_of(*t) == dominant_bin)
                .map(|t| t.sensor_id.as_str())
                .collect();
            let sensors: BTreeSet<&str> = candidates.iter().map(|t| t.sensor_id.as_str()).collect();
            levels.by_location.insert(
                loc,
                LocationLevel {
                    level,
                    agreement_count: agreeing.len(),
                    sensor_count: sensors.len(),
                },
            );
        }
        levels
    }

    /// Group fresh active trackers of one class by frequency and run the
    /// combined trackers.
    fn process_combined(
        &mut self,
        now_ms: u64,
        levels: &mut ActiveLevels,
        events: &mut Vec<LiveEvent>,
    ) {
        let sync_window = self.live.multi_sync_window_ms;
        let bin_width = self.live.multi_freq_bin_hz;

        let mut by_class: BTreeMap<Hypothesis, Vec<TrackerInfo>> = BTreeMap::new();
        for info in self.sensor_info.values() {
            if info.bucket.is_some() && now_ms.saturating_sub(info.last_update_ms) <= sync_window {
                by_class.entry(info.class_key).or_default().push(info.clone());
            }
        }

        let mut seen = HashSet::new();
        for (class_key, mut trackers) in by_class {
            trackers.sort_by(|a, b| a.peak_hz.total_cmp(&b.peak_hz));
            let mut groups: Vec<Vec<TrackerInfo>> = Vec::new();
            for t in trackers {
                let near = |prev: &TrackerInfo| (t.peak_hz - prev.peak_hz).abs() <= bin_width;
                match groups.last_mut() {
                    Some(group) if group.last().is_some_and(near) => group.push(t),
                    _ => groups.push(vec![t]),
                }
            }

            for group in groups.into_iter().filter(|g| g.len() >= 2) {
                let n = group.len() as f64;
                let avg_hz = group.iter().map(|t| t.peak_hz).sum::<f64>() / n;
                let avg_amp = group.iter().map(|t| t.peak_amp).sum::<f64>() / n;
                let dbs: Vec<f64> = group.iter().map(|t| t.strength_db).collect();
                let freq_bin = if bin_width > 0.0 {
                    (avg_hz / bin_width).round() as i64
                } else {
                    0
                };
                let key = format!("combined:{}:{freq_bin}", class_key.key());
                seen.insert(key.clone());

                let previous = self.combined_arena.state(&key).bucket();
                let outcome = self
                    .combined_arena
                    .observe(key.clone(), combine_strength_db(&dbs), group.len(), &self.strength);
                let labels: Vec<&str> = group.iter().map(|t| t.label.as_str()).collect();
                let combined = TrackerInfo {
                    sensor_id: key.clone(),
                    label: format!("combined({})", labels.join(", ")),
                    location: None,
                    class_key,
                    peak_hz: avg_hz,
                    peak_amp: avg_amp,
                    strength_db: outcome.db,
                    bucket: outcome.bucket,
                    last_update_ms: now_ms,
                };

                if let Some(level) = combined.level() {
                    for source in class_key.matrix_sources() {
                        if upsert(levels.by_source.get(source), &level) {
                            levels.by_source.insert(*source, level.clone());
                        }
                    }
                }
                if let (true, Some(bucket)) = (outcome.escalated, outcome.bucket) {
                    self.matrix.record_escalation(
                        now_ms,
                        class_key.matrix_sources(),
                        bucket,
                        &combined.label,
                    );
                    let members: Vec<&TrackerInfo> = group.iter().collect();
                    events.push(self.make_event(
                        LiveEventKind::Multi,
                        now_ms,
                        &members,
                        bucket,
                        previous,
                        outcome.db,
                    ));
                }
                self.combined_info.insert(key, combined);
            }
        }

        self.combined_arena.decay_unseen(&seen, &self.strength);
        let arena = &self.combined_arena;
        self.combined_info.retain(|key, _| arena.contains(key));
    }

    /// First diagnostic finding, else the first finding of any kind.
    pub fn top_finding(&self) -> Option<&Finding> {
        self.findings
            .iter()
            .find(|f| f.severity == FindingSeverity::Diagnostic)
            .or_else(|| self.findings.first())
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            sequence: self.sequence,
            matrix: self.matrix.grid().clone(),
            recent_matrix: self.matrix.recent_grid().clone(),
            events: self.latest_events.clone(),
            recent_events: self.recent_events.iter().cloned().collect(),
            levels: self.levels.clone(),
            findings: self.findings.clone(),
            top_finding: self.top_finding().cloned(),
            driving_phase: self.phase.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_live() -> LiveDiagnostics {
        LiveDiagnostics::new(
            LiveConfig::default(),
            StrengthConfig::default(),
            OrderConfig::default(),
            PhaseConfig::default(),
            VehicleSpec::default(),
        )
    }

    fn make_obs(sensor: &str, location: SensorLocation, hz: f64, db: f64) -> SensorObservation {
        SensorObservation {
            sensor_id: sensor.to_string(),
            label: sensor.to_string(),
            location: Some(location),
            peaks: vec![StrengthPeak { hz, amp: 0.05, strength_db: db, bucket: None }],
        }
    }

    /// Front-left observation of an unclassified 120 Hz peak.
    fn fl_obs(db: f64) -> SensorObservation {
        make_obs("fl", SensorLocation::FrontLeftWheel, 120.0, db)
    }

    #[test]
    fn events_only_on_escalation() {
        let mut live = make_live();
        let snap = live.update(0, None, &[fl_obs(20.0)]);
        assert_eq!(snap.events.len(), 1);
        assert_eq!(snap.events[0].bucket, StrengthBucket::L2);
        assert_eq!(snap.events[0].previous_bucket, None);

        // same level: no event
        let snap = live.update(500, None, &[fl_obs(21.0)]);
        assert!(snap.events.is_empty());

        // lower reading: bucket held, no event
        let snap = live.update(1_000, None, &[fl_obs(9.0)]);
        assert!(snap.events.is_empty());

        // strictly higher: event
        let snap = live.update(1_500, None, &[fl_obs(40.0)]);
        assert_eq!(snap.events.len(), 1);
        assert_eq!(snap.events[0].bucket, StrengthBucket::L4);
        assert_eq!(snap.events[0].previous_bucket, Some(StrengthBucket::L2));

        let cell = snap.matrix[&MatrixSource::Other][&StrengthBucket::L4].clone();
        assert_eq!(cell.count, 1);
        assert_eq!(cell.contributors.get("fl"), Some(&1));
        assert_eq!(snap.recent_events.len(), 2);
    }

    #[test]
    fn seconds_accumulate_with_clamped_dt() {
        let mut live = make_live();
        live.update(0, None, &[fl_obs(20.0)]);
        live.update(500, None, &[fl_obs(20.0)]);
        // a 10 s gap only counts one second
        let snap = live.update(10_500, None, &[fl_obs(20.0)]);
        let cell = &snap.matrix[&MatrixSource::Other][&StrengthBucket::L2];
        assert!((cell.seconds - 1.5).abs() < 1e-9, "got {}", cell.seconds);
    }

    #[test]
    fn unseen_trackers_decay_and_prune() {
        let mut live = make_live();
        live.update(0, None, &[fl_obs(30.0)]);
        let decay = StrengthConfig::default().decay_ticks as u64;
        let mut snap = live.snapshot();
        for i in 1..=decay {
            snap = live.update(i * 100, None, &[]);
        }
        assert!(snap.levels.by_sensor.is_empty());

        let prune = LiveConfig::default().tracker_prune_ticks as u64;
        for i in 0..prune {
            live.update(10_000 + i * 100, None, &[]);
        }
        assert!(live.sensor_info.is_empty());
        assert!(live.sensor_arena.is_empty());
    }

    #[test]
    fn combined_event_for_nearby_sensors() {
        let mut live = make_live();
        let snap = live.update(
            0,
            None,
            &[
                fl_obs(20.0),
                make_obs("fr", SensorLocation::FrontRightWheel, 120.8, 20.0),
            ],
        );
        let multi: Vec<&LiveEvent> =
            snap.events.iter().filter(|e| e.kind == LiveEventKind::Multi).collect();
        assert_eq!(multi.len(), 1);
        assert_eq!(multi[0].sensor_ids.len(), 2);
        // corroboration bonus lifts the combined level
        assert!(multi[0].vibration_strength_db > 20.0);
    }

    #[test]
    fn matrix_counts_survive_the_window() {
        let mut live = make_live();
        live.update(0, None, &[fl_obs(20.0)]);
        let snap = live.update(400_000, None, &[]);
        assert_eq!(snap.matrix[&MatrixSource::Other][&StrengthBucket::L2].count, 1);
        assert_eq!(snap.recent_matrix[&MatrixSource::Other][&StrengthBucket::L2].count, 0);
    }

    #[test]
    fn vehicle_change_applies_on_next_tick() {
        let mut live = make_live();
        let speed_mps = 100.0 / 3.6;
        let small_tire = VehicleSpec { rim_in: 15.0, ..VehicleSpec::default() };
        let new_wheel_hz = vehicle_orders(speed_mps, &small_tire).map_or(0.0, |o| o.wheel_hz);

        let fl = make_obs("fl", SensorLocation::FrontLeftWheel, new_wheel_hz, 20.0);
        let snap = live.update(0, Some(speed_mps), &[fl]);
        assert_eq!(snap.events[0].class_key, Hypothesis::Other);

        live.set_vehicle(&small_tire);
        let fr = make_obs("fr", SensorLocation::FrontRightWheel, new_wheel_hz, 20.0);
        let snap = live.update(500, Some(speed_mps), &[fr]);
        let fr: Vec<&LiveEvent> = snap.events.iter().filter(|e| e.sensor_ids == ["fr"]).collect();
        assert_eq!(fr.len(), 1);
        assert_eq!(fr[0].class_key, Hypothesis::Wheel1);
        assert!(snap.levels.by_source.contains_key(&MatrixSource::Wheel));
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let mut live = make_live();
        live.update(0, None, &[fl_obs(20.0)]);
        let before = live.snapshot();
        live.update(500, None, &[fl_obs(50.0)]);
        assert_eq!(before.matrix[&MatrixSource::Other][&StrengthBucket::L5].count, 0);
        assert_eq!(before.sequence, 1);
        live.reset();
        assert_eq!(before.events.len(), 1);
        let after = live.snapshot();
        assert_eq!(after.sequence, 0);
        assert!(after.events.is_empty());
        assert!(after.matrix.values().flat_map(|r| r.values()).all(|c| c.count == 0));
    }
}
