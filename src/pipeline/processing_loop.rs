//! Frame processing loop shared across all input modes.
//!
//! Pulls frames from a [`FrameSource`] and, for each one: ingests the samples,
//! recomputes that sensor's spectrum, records a [`RunSample`], and on the live
//! tick cadence feeds every freshly computed sensor into the live aggregator
//! (which classifies peaks against the current vehicle orders). Vehicle
//! settings changes arriving on a watch channel apply from the next tick, and
//! the run findings shown in live snapshots are refreshed every
//! `live.findings_refresh_ms` of frame time. When the source is exhausted or
//! cancelled the accumulated run is analysed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{FrameEvent, FrameSource};
use super::{AppState, SystemStatus};
use crate::config::defaults::LIVE_TICK_MS;
use crate::config::{DiagnosticsConfig, VehicleSpec};
use crate::findings::{FindingsEngine, RunSummary};
use crate::live::{LiveDiagnostics, LiveSnapshot, SensorObservation};
use crate::processing::{ProcessingError, SignalProcessor};
use crate::types::{PeakPoint, RunMetadata, RunSample, SensorFrame, SensorLocation};

/// Frames between progress log lines.
const PROGRESS_EVERY_FRAMES: u64 = 100;

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub frames_dropped: u64,
    pub samples_recorded: u64,
    pub spectra_computed: u64,
    pub live_ticks: u64,
    pub events_emitted: u64,
    pub sensors_evicted: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: PipelineStats,
    pub samples: Vec<RunSample>,
    pub metadata: RunMetadata,
    pub summary: RunSummary,
    pub final_snapshot: LiveSnapshot,
}

// ============================================================================
// Processing Loop
// ============================================================================

/// Owns all state needed for the frame processing loop.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    processor: SignalProcessor,
    live: LiveDiagnostics,
    findings: FindingsEngine,
    vehicle: VehicleSpec,
    vehicle_rx: Option<watch::Receiver<VehicleSpec>>,
    heartbeat_ms: u64,
    findings_refresh_ms: u64,
    stale_ms: u64,
    app_state: Arc<RwLock<AppState>>,
    cancel_token: CancellationToken,

    run: Vec<RunSample>,
    /// Sensors with a new spectrum since the last live tick
    pending: BTreeMap<String, Option<SensorLocation>>,
    last_seen_ms: HashMap<String, u64>,
    last_tick_ms: Option<u64>,
    last_publish_ms: Option<u64>,
    last_findings_ms: Option<u64>,
    last_frame_ms: u64,
    speed_kmh: Option<f64>,
    raw_sample_rate_hz: Option<u32>,
    stats: PipelineStats,
}

impl ProcessingLoop {
    pub fn new(
        cfg: &DiagnosticsConfig,
        app_state: Arc<RwLock<AppState>>,
        cancel_token: CancellationToken,
    ) -> Self {
        let vehicle = cfg.vehicle.sanitized();
        Self {
            processor: SignalProcessor::new(cfg.processing.clone(), cfg.strength.clone()),
            live: LiveDiagnostics::new(
                cfg.live.clone(),
                cfg.strength.clone(),
                cfg.orders.clone(),
                cfg.phase.clone(),
                vehicle.clone(),
            ),
            findings: FindingsEngine::from_config(cfg),
            vehicle,
            vehicle_rx: None,
            heartbeat_ms: cfg.live.heartbeat_ms,
            findings_refresh_ms: cfg.live.findings_refresh_ms,
            stale_ms: cfg.pipeline.stale_sensor_secs.saturating_mul(1000),
            app_state,
            cancel_token,
            run: Vec::new(),
            pending: BTreeMap::new(),
            last_seen_ms: HashMap::new(),
            last_tick_ms: None,
            last_publish_ms: None,
            last_findings_ms: None,
            last_frame_ms: 0,
            speed_kmh: None,
            raw_sample_rate_hz: None,
            stats: PipelineStats::default(),
        }
    }

    /// Follow vehicle settings published on `rx` (tire size, ratios, bands).
    pub fn with_vehicle_updates(mut self, rx: watch::Receiver<VehicleSpec>) -> Self {
        self.vehicle_rx = Some(rx);
        self
    }

    /// Run until the source is exhausted or cancellation, then analyse the run.
    pub async fn run<S: FrameSource>(mut self, source: &mut S) -> RunOutcome {
        info!("📊 Processing sensor frames from {}...", source.source_name());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_frame() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[ProcessingLoop] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            let frame = match event {
                FrameEvent::Frame(f) => f,
                FrameEvent::Eof => {
                    info!(
                        "[ProcessingLoop] Source reached end ({} frames processed)",
                        self.stats.frames_received
                    );
                    break;
                }
            };

            let publish = self.handle_frame(frame);
            self.stats.frames_dropped = source.dropped_frames();
            self.publish_progress(publish).await;

            if self.stats.frames_received % PROGRESS_EVERY_FRAMES == 0 {
                info!(
                    "📈 Progress: {} frames | Samples: {} | Events: {} | Sensors: {}",
                    self.stats.frames_received,
                    self.stats.samples_recorded,
                    self.stats.events_emitted,
                    self.last_seen_ms.len()
                );
            }
        }

        self.stats.frames_dropped = source.dropped_frames();
        self.finish().await
    }

    /// Process one frame. Returns a snapshot when one is due for publication.
    fn handle_frame(&mut self, frame: SensorFrame) -> Option<LiveSnapshot> {
        self.stats.frames_received += 1;
        let now_ms = if frame.t_s.is_finite() && frame.t_s >= 0.0 {
            (frame.t_s * 1000.0) as u64
        } else {
            self.last_frame_ms
        };
        self.last_frame_ms = self.last_frame_ms.max(now_ms);
        if let Some(speed) = frame.speed_kmh.filter(|v| v.is_finite() && *v >= 0.0) {
            self.speed_kmh = Some(speed);
        }

        if self.processor.ingest(&frame.sensor_id, &frame.samples, frame.sample_rate_hz).is_err() {
            self.stats.frames_rejected += 1;
            return None;
        }
        self.last_seen_ms.insert(frame.sensor_id.clone(), now_ms);
        let sample_rate = self.processor.buffer(&frame.sensor_id).map(|b| b.sample_rate_hz());
        if self.raw_sample_rate_hz.is_none() {
            self.raw_sample_rate_hz = sample_rate;
        }

        match self.processor.compute_spectrum(&frame.sensor_id) {
            Ok(spectrum) => {
                let strength = &spectrum.payload.strength;
                self.run.push(RunSample {
                    t_s: frame.t_s,
                    sensor_id: frame.sensor_id.clone(),
                    location: frame.location,
                    speed_kmh: self.speed_kmh,
                    engine_rpm: frame.engine_rpm.filter(|v| v.is_finite()),
                    sample_rate_hz: sample_rate,
                    top_peaks: strength
                        .top_peaks
                        .iter()
                        .map(|p| PeakPoint::new(p.hz, p.amp))
                        .collect(),
                    vibration_strength_db: Some(strength.vibration_strength_db)
                        .filter(|v| v.is_finite()),
                    strength_bucket: strength.strength_bucket,
                    noise_floor_amp: Some(strength.noise_floor_amp_g).filter(|v| v.is_finite()),
                });
                self.stats.samples_recorded += 1;
                self.pending.insert(frame.sensor_id, frame.location);
            }
            Err(ProcessingError::InsufficientData { needed, available }) => {
                debug!(
                    sensor = %frame.sensor_id,
                    needed,
                    available,
                    "[ProcessingLoop] Waiting for a full FFT window"
                );
            }
            Err(e) => warn!(sensor = %frame.sensor_id, "[ProcessingLoop] Spectrum failed: {}", e),
        }

        let tick_due = self
            .last_tick_ms
            .map_or(true, |last| now_ms >= last.saturating_add(LIVE_TICK_MS));
        if !tick_due || self.pending.is_empty() {
            return None;
        }
        let snapshot = self.tick(now_ms);
        let publish_due = self
            .last_publish_ms
            .map_or(true, |last| now_ms >= last.saturating_add(self.heartbeat_ms));
        if publish_due || !snapshot.events.is_empty() {
            self.last_publish_ms = Some(now_ms);
            Some(snapshot)
        } else {
            None
        }
    }

    /// Advance the live aggregator with every sensor computed since the last tick.
    fn tick(&mut self, now_ms: u64) -> LiveSnapshot {
        self.last_tick_ms = Some(now_ms);
        self.apply_vehicle_update();
        self.refresh_findings(now_ms);
        let observations: Vec<SensorObservation> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|(sensor_id, location)| {
                let spectrum = self.processor.latest_spectrum(&sensor_id)?;
                Some(SensorObservation {
                    label: location.map_or_else(|| sensor_id.clone(), |l| l.label().to_string()),
                    sensor_id,
                    location,
                    peaks: spectrum.payload.strength.top_peaks.clone(),
                })
            })
            .collect();

        let snapshot = self.live.update(now_ms, self.speed_kmh.map(|v| v / 3.6), &observations);
        self.stats.live_ticks += 1;
        self.stats.events_emitted += snapshot.events.len() as u64;
        for event in &snapshot.events {
            info!(
                class = event.class_key.key(),
                bucket = event.bucket.key(),
                sensors = ?event.sensor_labels,
                "[ProcessingLoop] Vibration escalated to {} at {:.1} Hz",
                event.bucket.key(),
                event.peak_hz
            );
        }

        self.evict_stale(now_ms);
        snapshot
    }

    fn apply_vehicle_update(&mut self) {
        let Some(rx) = self.vehicle_rx.as_mut() else {
            return;
        };
        match rx.has_changed() {
            Ok(true) => {}
            Ok(false) => return,
            Err(_) => {
                debug!("[ProcessingLoop] Vehicle settings source closed");
                self.vehicle_rx = None;
                return;
            }
        }
        let spec = rx.borrow_and_update().clone();
        self.vehicle = spec.sanitized();
        self.live.set_vehicle(&spec);
        info!(
            "[ProcessingLoop] Vehicle settings updated: {}/{} R{} | final drive {:.2} | gear {:.2}",
            self.vehicle.tire_width_mm,
            self.vehicle.tire_aspect_pct,
            self.vehicle.rim_in,
            self.vehicle.final_drive_ratio,
            self.vehicle.current_gear_ratio
        );
    }

    /// Re-rank the run so far so live snapshots carry current findings.
    fn refresh_findings(&mut self, now_ms: u64) {
        let due = self
            .last_findings_ms
            .map_or(true, |last| now_ms >= last.saturating_add(self.findings_refresh_ms));
        if !due || self.run.is_empty() {
            return;
        }
        self.last_findings_ms = Some(now_ms);
        let metadata = RunMetadata::from_vehicle(&self.vehicle, self.raw_sample_rate_hz);
        let summary = self.findings.build_run_summary(&self.run, &metadata);
        debug!(
            findings = summary.findings.len(),
            samples = self.run.len(),
            "[ProcessingLoop] Findings refreshed"
        );
        self.live.set_findings(summary.findings);
    }

    fn evict_stale(&mut self, now_ms: u64) {
        let stale_ms = self.stale_ms;
        let active: HashSet<String> = self
            .last_seen_ms
            .iter()
            .filter(|(_, seen)| now_ms.saturating_sub(**seen) <= stale_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in self.processor.evict_idle(&active) {
            info!(sensor = %id, "[ProcessingLoop] Sensor went quiet, dropping its buffer");
            self.last_seen_ms.remove(&id);
            self.stats.sensors_evicted += 1;
        }
    }

    async fn publish_progress(&self, snapshot: Option<LiveSnapshot>) {
        let mut state = self.app_state.write().await;
        state.status = SystemStatus::Monitoring;
        state.frames_processed = self.stats.frames_received;
        state.frames_rejected = self.stats.frames_rejected;
        state.frames_dropped = self.stats.frames_dropped;
        state.samples_recorded = self.stats.samples_recorded;
        state.events_emitted = self.stats.events_emitted;
        state.last_frame_time = Some(chrono::Utc::now());
        if let Some(snapshot) = snapshot {
            state.active_sensors = self.processor.sensor_ids();
            state.latest_snapshot = Some(snapshot);
        }
    }

    async fn finish(mut self) -> RunOutcome {
        let metadata = RunMetadata::from_vehicle(&self.vehicle, self.raw_sample_rate_hz);
        let summary = self.findings.build_run_summary(&self.run, &metadata);
        self.live.set_findings(summary.findings.clone());
        let final_snapshot = self.live.snapshot();
        self.stats.spectra_computed = self.processor.intake_stats().spectra_computed;

        {
            let mut state = self.app_state.write().await;
            state.status = SystemStatus::Stopped;
            state.frames_processed = self.stats.frames_received;
            state.frames_rejected = self.stats.frames_rejected;
            state.frames_dropped = self.stats.frames_dropped;
            state.samples_recorded = self.stats.samples_recorded;
            state.events_emitted = self.stats.events_emitted;
            state.active_sensors = self.processor.sensor_ids();
            state.latest_snapshot = Some(final_snapshot.clone());
            state.run_summary = Some(summary.clone());
        }

        let stats = self.stats;
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Frames Received:      {}", stats.frames_received);
        info!("   Frames Rejected:      {}", stats.frames_rejected);
        info!("   Frames Dropped:       {}", stats.frames_dropped);
        info!("   Samples Recorded:     {}", stats.samples_recorded);
        info!("   Spectra Computed:     {}", stats.spectra_computed);
        info!("   Live Events:          {}", stats.events_emitted);
        info!("   Findings:             {}", summary.findings.len());
        if let Some(top) = &summary.top_finding {
            info!(
                "   Top Finding:          {} ({})",
                top.finding_key,
                top.confidence.map_or_else(|| "n/a".to_string(), |c| format!("{:.0}%", c * 100.0))
            );
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        RunOutcome {
            stats,
            samples: self.run,
            metadata,
            summary,
            final_snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReplaySource;

    fn make_frames(
        sensor: &str,
        location: SensorLocation,
        seconds: f64,
        tone_hz: f64,
    ) -> Vec<SensorFrame> {
        let rate = 800u32;
        let chunk = 400usize;
        let chunks = (seconds * f64::from(rate) / chunk as f64) as usize;
        (0..chunks)
            .map(|c| {
                let samples = (0..chunk)
                    .map(|i| {
                        let t = (c * chunk + i) as f64 / f64::from(rate);
                        let v = 40.0 * (2.0 * std::f64::consts::PI * tone_hz * t).sin();
                        [v, 0.5 * v, 256.0 + v]
                    })
                    .collect();
                SensorFrame {
                    sensor_id: sensor.to_string(),
                    location: Some(location),
                    t_s: (c * chunk) as f64 / f64::from(rate),
                    sample_rate_hz: rate,
                    samples,
                    speed_kmh: Some(80.0),
                    engine_rpm: None,
                }
            })
            .collect()
    }

    /// Front-left frames carrying a 25 Hz tone.
    fn fl_frames(seconds: f64) -> Vec<SensorFrame> {
        make_frames("fl", SensorLocation::FrontLeftWheel, seconds, 25.0)
    }

    fn new_loop(state: Arc<RwLock<AppState>>) -> ProcessingLoop {
        ProcessingLoop::new(&DiagnosticsConfig::default(), state, CancellationToken::new())
    }

    #[tokio::test]
    async fn records_samples_once_window_fills() {
        let state = Arc::new(RwLock::new(AppState::default()));
        let lp = new_loop(Arc::clone(&state));
        let mut source = ReplaySource::new(fl_frames(6.0), 0);

        let outcome = lp.run(&mut source).await;
        // 2048-point FFT needs 2048 samples: frames 0..=4 are warm-up
        assert_eq!(outcome.stats.frames_received, 12);
        assert_eq!(outcome.stats.samples_recorded, 7);
        assert!(outcome.stats.live_ticks > 0);
        assert_eq!(outcome.samples.len(), 7);
        assert!(outcome.samples.iter().all(|s| !s.top_peaks.is_empty()));
        assert_eq!(outcome.metadata.raw_sample_rate_hz, Some(800));

        let state = state.read().await;
        assert_eq!(state.status, SystemStatus::Stopped);
        assert_eq!(state.frames_processed, 12);
        assert!(state.run_summary.is_some());
        assert!(state.latest_snapshot.is_some());
    }

    #[tokio::test]
    async fn rejected_frames_are_counted() {
        let state = Arc::new(RwLock::new(AppState::default()));
        let lp = new_loop(state);
        let mut frames = fl_frames(1.0);
        frames[0].sample_rate_hz = 0;
        let mut source = ReplaySource::new(frames, 0);
        let outcome = lp.run(&mut source).await;
        assert_eq!(outcome.stats.frames_rejected, 1);
        assert_eq!(outcome.stats.samples_recorded, 0);
    }

    #[test]
    fn vehicle_change_applies_from_the_next_tick() {
        let state = Arc::new(RwLock::new(AppState::default()));
        let (tx, rx) = watch::channel(VehicleSpec::default());
        let mut lp = new_loop(state).with_vehicle_updates(rx);
        let mut frames = fl_frames(6.0).into_iter();

        for frame in frames.by_ref().take(7) {
            lp.handle_frame(frame);
        }
        let ticks_before = lp.stats.live_ticks;
        assert!(ticks_before > 0);
        let default_ratio = VehicleSpec::default().final_drive_ratio;
        assert!((lp.vehicle.final_drive_ratio - default_ratio).abs() < 1e-12);

        tx.send(VehicleSpec { final_drive_ratio: 4.1, ..VehicleSpec::default() })
            .expect("receiver alive");
        // Nothing changes until a tick runs
        assert!((lp.vehicle.final_drive_ratio - 4.1).abs() > 1e-6);
        for frame in frames {
            lp.handle_frame(frame);
        }
        assert!(lp.stats.live_ticks > ticks_before);
        assert!((lp.vehicle.final_drive_ratio - 4.1).abs() < 1e-12);
        let metadata = RunMetadata::from_vehicle(&lp.vehicle, lp.raw_sample_rate_hz);
        assert_eq!(metadata.final_drive_ratio, Some(4.1));
    }

    #[tokio::test]
    async fn closed_settings_channel_keeps_the_last_vehicle() {
        let state = Arc::new(RwLock::new(AppState::default()));
        let (tx, rx) = watch::channel(VehicleSpec::default());
        drop(tx);
        let lp = new_loop(state).with_vehicle_updates(rx);
        let mut source = ReplaySource::new(fl_frames(4.0), 0);
        let outcome = lp.run(&mut source).await;
        assert!(outcome.stats.live_ticks > 0);
        assert_eq!(
            outcome.metadata.final_drive_ratio,
            Some(VehicleSpec::default().final_drive_ratio)
        );
    }

    #[test]
    fn live_snapshots_carry_findings_before_the_run_ends() {
        let state = Arc::new(RwLock::new(AppState::default()));
        let mut lp = new_loop(state);
        let mut frames = fl_frames(6.0);
        // No speed at all: the run always reports the missing speed reference
        for frame in &mut frames {
            frame.speed_kmh = None;
        }

        let mut first_published = None;
        for frame in frames {
            if let Some(snapshot) = lp.handle_frame(frame) {
                first_published.get_or_insert(snapshot);
            }
        }
        let first = first_published.expect("a snapshot was published");
        assert!(first.top_finding.is_some());
        assert!(first.findings.iter().any(|f| f.finding_id == "REF_SPEED"));
        assert!(lp.live.snapshot().top_finding.is_some());
    }

    #[tokio::test]
    async fn cancelled_loop_still_summarises() {
        let state = Arc::new(RwLock::new(AppState::default()));
        let token = CancellationToken::new();
        token.cancel();
        let lp = ProcessingLoop::new(&DiagnosticsConfig::default(), state, token);
        let mut source = ReplaySource::new(fl_frames(6.0), 0);
        let outcome = lp.run(&mut source).await;
        assert_eq!(outcome.stats.frames_received, 0);
        assert!(outcome.samples.is_empty());
        assert!(outcome.summary.top_finding.is_none());
        assert_eq!(outcome.summary.sample_count, 0);
    }
}
