//! Source x severity matrix.
//!
//! The cumulative grid only grows until [`SeverityMatrix::reset`]. Escalations
//! and dwell time are also kept as timestamped records, from which a separate
//! rolling-window view is rebuilt for "what happened recently" displays.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::sanitize;
use crate::types::{MatrixSource, StrengthBucket};

/// Upper bound on retained records of each kind.
const MAX_RECORDS: usize = 10_000;

/// One matrix cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatrixCell {
    /// Escalations into this cell
    pub count: u64,
    /// Time a source spent at this level
    #[serde(serialize_with = "sanitize::finite")]
    pub seconds: f64,
    /// Escalation count per contributing sensor label
    pub contributors: BTreeMap<String, u64>,
}

/// Full matrix: every source row has every bucket column.
pub type MatrixGrid = BTreeMap<MatrixSource, BTreeMap<StrengthBucket, MatrixCell>>;

fn empty_grid() -> MatrixGrid {
    MatrixSource::ALL
        .iter()
        .map(|source| {
            let row = StrengthBucket::ALL.iter().map(|b| (*b, MatrixCell::default())).collect();
            (*source, row)
        })
        .collect()
}

#[derive(Debug, Clone)]
struct CountRecord {
    ts_ms: u64,
    source: MatrixSource,
    bucket: StrengthBucket,
    contributor: String,
}

#[derive(Debug, Clone)]
struct SecondsRecord {
    ts_ms: u64,
    source: MatrixSource,
    bucket: StrengthBucket,
    seconds: f64,
}

#[derive(Debug, Clone)]
pub struct SeverityMatrix {
    window_ms: u64,
    grid: MatrixGrid,
    recent: MatrixGrid,
    counts: VecDeque<CountRecord>,
    seconds: VecDeque<SecondsRecord>,
}

impl SeverityMatrix {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_ms: (window_secs.max(0.0) * 1000.0) as u64,
            grid: empty_grid(),
            recent: empty_grid(),
            counts: VecDeque::new(),
            seconds: VecDeque::new(),
        }
    }

    pub fn reset(&mut self) {
        self.grid = empty_grid();
        self.recent = empty_grid();
        self.counts.clear();
        self.seconds.clear();
    }

    /// Cumulative grid since the last reset.
    pub fn grid(&self) -> &MatrixGrid {
        &self.grid
    }

    /// Grid over the rolling window as of the last [`refresh_window`](Self::refresh_window).
    pub fn recent_grid(&self) -> &MatrixGrid {
        &self.recent
    }

    pub fn cell(&self, source: MatrixSource, bucket: StrengthBucket) -> Option<&MatrixCell> {
        self.grid.get(&source).and_then(|row| row.get(&bucket))
    }

    pub fn recent_cell(&self, source: MatrixSource, bucket: StrengthBucket) -> Option<&MatrixCell> {
        self.recent.get(&source).and_then(|row| row.get(&bucket))
    }

    /// Record an escalation of `sources` into `bucket`.
    pub fn record_escalation(
        &mut self,
        now_ms: u64,
        sources: &[MatrixSource],
        bucket: StrengthBucket,
        contributor: &str,
    ) {
        for source in sources {
            if let Some(cell) = cell_mut(&mut self.grid, *source, bucket) {
                cell.count += 1;
                *cell.contributors.entry(contributor.to_string()).or_default() += 1;
            }
            if self.counts.len() >= MAX_RECORDS {
                self.counts.pop_front();
            }
            self.counts.push_back(CountRecord {
                ts_ms: now_ms,
                source: *source,
                bucket,
                contributor: contributor.to_string(),
            });
        }
    }

    /// Credit `dt_seconds` of dwell time to each source at its active level.
    pub fn accumulate_seconds(
        &mut self,
        now_ms: u64,
        dt_seconds: f64,
        active: &BTreeMap<MatrixSource, StrengthBucket>,
    ) {
        if !(dt_seconds.is_finite() && dt_seconds > 0.0) {
            return;
        }
        for (source, bucket) in active {
            if let Some(cell) = cell_mut(&mut self.grid, *source, *bucket) {
                cell.seconds += dt_seconds;
            }
            if self.seconds.len() >= MAX_RECORDS {
                self.seconds.pop_front();
            }
            self.seconds.push_back(SecondsRecord {
                ts_ms: now_ms,
                source: *source,
                bucket: *bucket,
                seconds: dt_seconds,
            });
        }
    }

    /// Drop records older than the window and rebuild the windowed view.
    /// The cumulative grid is not affected.
    pub fn refresh_window(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while self.counts.front().is_some_and(|r| r.ts_ms < cutoff) {
            self.counts.pop_front();
        }
        while self.seconds.front().is_some_and(|r| r.ts_ms < cutoff) {
            self.seconds.pop_front();
        }

        let mut recent = empty_grid();
        for record in &self.counts {
            if let Some(cell) = cell_mut(&mut recent, record.source, record.bucket) {
                cell.count += 1;
                *cell.contributors.entry(record.contributor.clone()).or_default() += 1;
            }
        }
        for record in &self.seconds {
            if let Some(cell) = cell_mut(&mut recent, record.source, record.bucket) {
                cell.seconds += record.seconds;
            }
        }
        self.recent = recent;
    }
}

fn cell_mut(
    grid: &mut MatrixGrid,
    source: MatrixSource,
    bucket: StrengthBucket,
) -> Option<&mut MatrixCell> {
    grid.get_mut(&source).and_then(|row| row.get_mut(&bucket))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recent_count(m: &SeverityMatrix) -> Option<u64> {
        m.recent_cell(MatrixSource::Other, StrengthBucket::L1).map(|c| c.count)
    }

    #[test]
    fn starts_zeroed_with_every_cell() {
        let m = SeverityMatrix::new(300.0);
        assert_eq!(m.grid().len(), 4);
        assert!(m.grid().values().all(|row| row.len() == 5));
        assert!(m
            .grid()
            .values()
            .flat_map(|r| r.values())
            .all(|c| c.count == 0 && c.seconds == 0.0));
    }

    #[test]
    fn escalations_and_seconds_accumulate() {
        let mut m = SeverityMatrix::new(300.0);
        let sources = [MatrixSource::Wheel, MatrixSource::Engine];
        m.record_escalation(1_000, &sources, StrengthBucket::L3, "front-left");
        let active = BTreeMap::from([(MatrixSource::Wheel, StrengthBucket::L3)]);
        m.accumulate_seconds(2_000, 0.5, &active);
        m.accumulate_seconds(3_000, 0.5, &active);

        let cell = m.cell(MatrixSource::Wheel, StrengthBucket::L3).cloned().unwrap_or_default();
        assert_eq!(cell.count, 1);
        assert!((cell.seconds - 1.0).abs() < 1e-12);
        assert_eq!(cell.contributors.get("front-left"), Some(&1));
        assert_eq!(m.cell(MatrixSource::Engine, StrengthBucket::L3).map(|c| c.count), Some(1));
    }

    #[test]
    fn records_leave_the_window_view_only() {
        let mut m = SeverityMatrix::new(10.0);
        m.record_escalation(0, &[MatrixSource::Other], StrengthBucket::L1, "rear");
        m.refresh_window(5_000);
        assert_eq!(recent_count(&m), Some(1));
        m.refresh_window(20_000);
        assert_eq!(recent_count(&m), Some(0));
        assert_eq!(m.cell(MatrixSource::Other, StrengthBucket::L1).map(|c| c.count), Some(1));
    }

    #[test]
    fn cumulative_cells_never_drop_without_reset() {
        let mut m = SeverityMatrix::new(300.0);
        let active = BTreeMap::from([(MatrixSource::Wheel, StrengthBucket::L2)]);
        m.record_escalation(1_000, &[MatrixSource::Wheel], StrengthBucket::L2, "rear-left");
        m.accumulate_seconds(1_500, 0.5, &active);

        let mut prev = m.cell(MatrixSource::Wheel, StrengthBucket::L2).cloned().unwrap_or_default();
        for now_ms in [60_000, 400_000, 3_600_000] {
            m.refresh_window(now_ms);
            let cell = m.cell(MatrixSource::Wheel, StrengthBucket::L2).cloned().unwrap_or_default();
            assert!(
                cell.count >= prev.count && cell.seconds >= prev.seconds,
                "cell shrank at {now_ms} ms"
            );
            prev = cell;
        }
        assert_eq!(prev.count, 1);
        assert!((prev.seconds - 0.5).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_everything() {
        let mut m = SeverityMatrix::new(300.0);
        m.record_escalation(0, &[MatrixSource::Other], StrengthBucket::L1, "rear");
        m.refresh_window(0);
        m.reset();
        assert_eq!(m.cell(MatrixSource::Other, StrengthBucket::L1).map(|c| c.count), Some(0));
        assert_eq!(recent_count(&m), Some(0));
    }
}
