//! Per-sensor signal processor.
//!
//! Owns one [`SampleBuffer`] per sensor and publishes each computed spectrum
//! through an [`ArcSwapOption`], so readers on other tasks always see a whole
//! payload from a single generation and never a half-written one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use super::fft::{combined_spectrum, extract_peaks, rfft_frequencies, rms_p2p, top_bins, FftKernel};
use super::{AxisMetrics, ProcessingError, SampleBuffer, SpectrumPayload, Versioned};
use crate::config::{ProcessingConfig, StrengthConfig};
use crate::strength::compute_strength_metrics;

/// Shared read handle to a sensor's latest spectrum.
pub type SpectrumHandle = Arc<ArcSwapOption<Versioned<SpectrumPayload>>>;

/// Outcome of one spectrum computation.
pub type SpectrumResult = Result<Arc<Versioned<SpectrumPayload>>, ProcessingError>;

/// Running intake counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IntakeStats {
    pub chunks_ingested: u64,
    pub samples_ingested: u64,
    pub chunks_rejected: u64,
    pub spectra_computed: u64,
}

struct SensorSlot {
    buffer: SampleBuffer,
    spectrum: SpectrumHandle,
}

impl SensorSlot {
    /// Publish unless a newer generation is already visible.
    fn publish(&self, next: Arc<Versioned<SpectrumPayload>>) -> Arc<Versioned<SpectrumPayload>> {
        if let Some(current) = self.spectrum.load_full() {
            if current.version > next.version {
                return current;
            }
        }
        self.spectrum.store(Some(Arc::clone(&next)));
        next
    }
}

/// Converts raw counts into buffered samples and buffered samples into spectra.
pub struct SignalProcessor {
    processing: ProcessingConfig,
    strength: StrengthConfig,
    kernel: FftKernel,
    sensors: HashMap<String, SensorSlot>,
    stats: IntakeStats,
}

impl SignalProcessor {
    pub fn new(processing: ProcessingConfig, strength: StrengthConfig) -> Self {
        let kernel = FftKernel::new(processing.fft_n);
        Self {
            processing,
            strength,
            kernel,
            sensors: HashMap::new(),
            stats: IntakeStats::default(),
        }
    }

    fn capacity_for(&self, sample_rate_hz: u32) -> usize {
        let cap = (f64::from(sample_rate_hz) * self.processing.waveform_seconds).round();
        if cap.is_finite() && cap >= 1.0 {
            cap as usize
        } else {
            1
        }
    }

    /// Append raw triaxial counts for `sensor_id`.
    ///
    /// Counts are scaled to g. A zero sample rate reuses the sensor's previous
    /// rate; a rate above `max_sample_rate_hz` is clamped. A rate change
    /// resizes the ring to `rate * waveform_seconds`.
    pub fn ingest(
        &mut self,
        sensor_id: &str,
        raw: &[[f64; 3]],
        sample_rate_hz: u32,
    ) -> Result<usize, ProcessingError> {
        if raw.is_empty() {
            return Ok(0);
        }

        let known_rate = self.sensors.get(sensor_id).map(|s| s.buffer.sample_rate_hz());
        let mut rate = match (sample_rate_hz, known_rate) {
            (0, Some(r)) if r > 0 => r,
            (0, _) => {
                self.stats.chunks_rejected += 1;
                warn!(sensor = %sensor_id, "[Processor] Dropping chunk without a sample rate");
                return Err(ProcessingError::InvalidSampleRate(0));
            }
            (r, _) => r,
        };
        if rate > self.processing.max_sample_rate_hz {
            warn!(
                sensor = %sensor_id,
                rate_hz = rate,
                max_hz = self.processing.max_sample_rate_hz,
                "[Processor] Sample rate above limit, clamping"
            );
            rate = self.processing.max_sample_rate_hz;
        }

        let capacity = self.capacity_for(rate);
        let slot = self
            .sensors
            .entry(sensor_id.to_string())
            .or_insert_with(|| SensorSlot {
                buffer: SampleBuffer::new(capacity, rate),
                spectrum: Arc::new(ArcSwapOption::empty()),
            });
        if slot.buffer.sample_rate_hz() != rate {
            debug!(
                sensor = %sensor_id,
                rate_hz = rate,
                capacity,
                "[Processor] Sample rate changed, resizing"
            );
            slot.buffer.set_sample_rate_hz(rate);
            slot.buffer.resize(capacity);
        }

        let scale = self.processing.accel_scale_g_per_lsb;
        let chunk: Vec<[f64; 3]> = raw
            .iter()
            .map(|s| [s[0] * scale, s[1] * scale, s[2] * scale])
            .collect();
        slot.buffer.append(&chunk);

        self.stats.chunks_ingested += 1;
        self.stats.samples_ingested += raw.len() as u64;
        Ok(raw.len())
    }

    /// Append interleaved `x, y, z, x, y, z, ...` counts.
    pub fn ingest_interleaved(
        &mut self,
        sensor_id: &str,
        flat: &[f64],
        sample_rate_hz: u32,
    ) -> Result<usize, ProcessingError> {
        if flat.len() % 3 != 0 {
            self.stats.chunks_rejected += 1;
            warn!(
                sensor = %sensor_id,
                len = flat.len(),
                "[Processor] Dropping malformed sample chunk"
            );
            return Err(ProcessingError::ShapeMismatch { len: flat.len() });
        }
        let triples: Vec<[f64; 3]> = flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        self.ingest(sensor_id, &triples, sample_rate_hz)
    }

    /// Change a sensor's ring capacity (clamped to at least 1).
    pub fn resize(&mut self, sensor_id: &str, new_capacity: usize) -> Result<(), ProcessingError> {
        let slot = self
            .sensors
            .get_mut(sensor_id)
            .ok_or_else(|| ProcessingError::UnknownSensor(sensor_id.to_string()))?;
        slot.buffer.resize(new_capacity);
        Ok(())
    }

    /// Compute (or return the cached) spectrum for one sensor.
    pub fn compute_spectrum(&mut self, sensor_id: &str) -> SpectrumResult {
        let slot = self
            .sensors
            .get(sensor_id)
            .ok_or_else(|| ProcessingError::UnknownSensor(sensor_id.to_string()))?;
        let (result, computed) =
            compute_slot(sensor_id, slot, &self.kernel, &self.processing, &self.strength);
        if computed {
            self.stats.spectra_computed += 1;
        }
        result
    }

    /// Compute spectra for every sensor in parallel.
    ///
    /// Sensors without enough samples yet are reported with
    /// [`ProcessingError::InsufficientData`].
    pub fn compute_all(&mut self) -> Vec<(String, SpectrumResult)> {
        let kernel = &self.kernel;
        let processing = &self.processing;
        let strength = &self.strength;
        let mut results: Vec<_> = self
            .sensors
            .par_iter()
            .map(|(id, slot)| {
                let (result, computed) = compute_slot(id, slot, kernel, processing, strength);
                (id.clone(), result, computed)
            })
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));

        self.stats.spectra_computed += results.iter().filter(|r| r.2).count() as u64;
        results.into_iter().map(|(id, r, _)| (id, r)).collect()
    }

    /// Latest published spectrum, which may be stale relative to the buffer.
    pub fn latest_spectrum(&self, sensor_id: &str) -> Option<Arc<Versioned<SpectrumPayload>>> {
        self.sensors.get(sensor_id)?.spectrum.load_full()
    }

    /// Read handle for other tasks.
    pub fn spectrum_handle(&self, sensor_id: &str) -> Option<SpectrumHandle> {
        self.sensors.get(sensor_id).map(|s| Arc::clone(&s.spectrum))
    }

    pub fn buffer(&self, sensor_id: &str) -> Option<&SampleBuffer> {
        self.sensors.get(sensor_id).map(|s| &s.buffer)
    }

    /// Sorted ids of all buffered sensors.
    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sensors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Clear a sensor's samples; its published spectrum becomes stale.
    pub fn flush_sensor(&mut self, sensor_id: &str) {
        if let Some(slot) = self.sensors.get_mut(sensor_id) {
            slot.buffer.clear();
        }
    }

    /// Drop buffers of sensors not in `active`. Returns the evicted ids.
    pub fn evict_idle(&mut self, active: &HashSet<String>) -> Vec<String> {
        let mut evicted: Vec<String> = self
            .sensors
            .keys()
            .filter(|id| !active.contains(*id))
            .cloned()
            .collect();
        evicted.sort();
        for id in &evicted {
            self.sensors.remove(id);
            debug!(sensor = %id, "[Processor] Evicted idle sensor");
        }
        evicted
    }

    /// Sensors that received data within `max_age`.
    pub fn sensors_with_recent_data(&self, max_age: Duration) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sensors
            .iter()
            .filter(|(_, s)| s.buffer.last_ingest().is_some_and(|t| t.elapsed() <= max_age))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn intake_stats(&self) -> IntakeStats {
        self.stats
    }
}

/// Returns the spectrum result and whether a new payload was computed.
fn compute_slot(
    sensor_id: &str,
    slot: &SensorSlot,
    kernel: &FftKernel,
    processing: &ProcessingConfig,
    strength: &StrengthConfig,
) -> (SpectrumResult, bool) {
    let generation = slot.buffer.generation();
    if let Some(current) = slot.spectrum.load_full() {
        if current.is_current(generation) {
            return (Ok(current), false);
        }
    }
    if slot.buffer.len() < processing.fft_n {
        return (
            Err(ProcessingError::InsufficientData {
                needed: processing.fft_n,
                available: slot.buffer.len(),
            }),
            false,
        );
    }

    let payload = build_payload(sensor_id, &slot.buffer, kernel, processing, strength);
    let published = slot.publish(Arc::new(Versioned::new(generation, payload)));
    (Ok(published), true)
}

fn build_payload(
    sensor_id: &str,
    buffer: &SampleBuffer,
    kernel: &FftKernel,
    processing: &ProcessingConfig,
    strength: &StrengthConfig,
) -> SpectrumPayload {
    let rate = buffer.sample_rate_hz();
    let window = buffer.latest_filtered(buffer.len());
    let block = &window[window.len().saturating_sub(kernel.len())..];

    let all_freqs = rfft_frequencies(kernel.len(), f64::from(rate));
    let band: Vec<usize> = all_freqs
        .iter()
        .enumerate()
        .filter(|(_, f)| **f >= processing.spectrum_min_hz && **f <= processing.spectrum_max_hz)
        .map(|(i, _)| i)
        .collect();
    let freq_hz: Vec<f64> = band.iter().map(|&i| all_freqs[i]).collect();

    let axis_spectra: Vec<Vec<f64>> = (0..3)
        .map(|axis| {
            let series: Vec<f64> = block.iter().map(|s| s[axis]).collect();
            let full = kernel.amplitude(&series);
            band.iter().map(|&i| full.get(i).copied().unwrap_or(0.0)).collect()
        })
        .collect();

    let axes: [AxisMetrics; 3] = std::array::from_fn(|axis| {
        let series: Vec<f64> = window.iter().map(|s| s[axis]).collect();
        let (rms, p2p) = rms_p2p(&series);
        AxisMetrics {
            rms,
            p2p,
            peaks: top_bins(&freq_hz, &axis_spectra[axis], processing.axis_peaks),
        }
    });

    let vmag: Vec<f64> = window
        .iter()
        .map(|s| (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt())
        .collect();
    let (vmag_rms, vmag_p2p) = rms_p2p(&vmag);

    let axis_refs: Vec<&[f64]> = axis_spectra.iter().map(Vec::as_slice).collect();
    let combined = combined_spectrum(&axis_refs, None);
    let peaks = extract_peaks(
        &freq_hz,
        &combined,
        processing.peak_smoothing_bins,
        processing.combined_peaks,
    );
    let strength_metrics = compute_strength_metrics(
        &freq_hz,
        &combined,
        strength,
        processing.peak_threshold_floor_ratio,
        processing.combined_peaks,
    );

    let [x, y, z]: [Vec<f64>; 3] = axis_spectra
        .try_into()
        .unwrap_or_else(|_| [Vec::new(), Vec::new(), Vec::new()]);

    SpectrumPayload {
        sensor_id: sensor_id.to_string(),
        sample_rate_hz: rate,
        freq_hz,
        x,
        y,
        z,
        combined,
        peaks,
        axes,
        vmag_rms,
        vmag_p2p,
        strength: strength_metrics,
        computed_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_processor() -> SignalProcessor {
        let processing = ProcessingConfig {
            fft_n: 512,
            waveform_seconds: 2.0,
            accel_scale_g_per_lsb: 1.0,
            ..ProcessingConfig::default()
        };
        SignalProcessor::new(processing, StrengthConfig::default())
    }

    fn make_tone(n: usize, sr: f64, hz: f64, amp: f64) -> Vec<[f64; 3]> {
        (0..n)
            .map(|i| {
                let v = amp * (2.0 * std::f64::consts::PI * hz * i as f64 / sr).sin();
                [v, 0.0, 0.0]
            })
            .collect()
    }

    #[test]
    fn insufficient_data_before_fft_n() {
        let mut p = make_processor();
        p.ingest("fl", &make_tone(100, 400.0, 20.0, 1.0), 400).expect("ingest");
        let err = p.compute_spectrum("fl").expect_err("not enough samples");
        assert!(matches!(err, ProcessingError::InsufficientData { needed: 512, available: 100 }));
    }

    #[test]
    fn spectrum_finds_tone_and_caches_by_generation() {
        let mut p = make_processor();
        p.ingest("fl", &make_tone(800, 400.0, 25.0, 1.0), 400).expect("ingest");
        let first = p.compute_spectrum("fl").expect("spectrum");
        let bin = 400.0 / 512.0;
        assert!((first.payload.peaks[0].hz - 25.0).abs() <= bin);
        assert_eq!(p.intake_stats().spectra_computed, 1);

        let again = p.compute_spectrum("fl").expect("cached");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(p.intake_stats().spectra_computed, 1);

        p.ingest("fl", &make_tone(10, 400.0, 25.0, 1.0), 400).expect("ingest");
        assert!(first.is_stale(p.buffer("fl").map_or(0, SampleBuffer::generation)));
        let next = p.compute_spectrum("fl").expect("recomputed");
        assert!(next.version > first.version);
    }

    #[test]
    fn zero_rate_without_history_is_rejected() {
        let mut p = make_processor();
        let err = p.ingest("fl", &[[1.0, 1.0, 1.0]], 0).expect_err("no rate");
        assert_eq!(err, ProcessingError::InvalidSampleRate(0));
        assert_eq!(p.intake_stats().chunks_rejected, 1);
    }

    #[test]
    fn interleaved_shape_checked() {
        let mut p = make_processor();
        let err = p.ingest_interleaved("fl", &[1.0, 2.0], 400).expect_err("bad shape");
        assert_eq!(err, ProcessingError::ShapeMismatch { len: 2 });
        assert_eq!(p.ingest_interleaved("fl", &[1.0, 2.0, 3.0], 400), Ok(1));
    }

    #[test]
    fn rate_is_clamped_and_capacity_follows() {
        let mut p = make_processor();
        p.ingest("fl", &[[0.0; 3]], 100_000).expect("ingest");
        let buf = p.buffer("fl").expect("buffer");
        assert_eq!(buf.sample_rate_hz(), 4096);
        assert_eq!(buf.capacity(), 8192);
    }

    #[test]
    fn evict_and_recent() {
        let mut p = make_processor();
        p.ingest("a", &[[0.0; 3]], 400).expect("ingest");
        p.ingest("b", &[[0.0; 3]], 400).expect("ingest");
        assert_eq!(p.sensors_with_recent_data(Duration::from_secs(60)), vec!["a", "b"]);
        let keep: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(p.evict_idle(&keep), vec!["b".to_string()]);
        assert_eq!(p.sensor_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn compute_all_reports_each_sensor() {
        let mut p = make_processor();
        p.ingest("a", &make_tone(600, 400.0, 30.0, 1.0), 400).expect("ingest");
        p.ingest("b", &make_tone(10, 400.0, 30.0, 1.0), 400).expect("ingest");
        let results = p.compute_all();
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn spike_split_across_chunks_never_reaches_the_spectrum() {
        let mut clean = make_processor();
        let mut spiked = make_processor();
        let tone = make_tone(600, 400.0, 30.0, 1.0);
        clean.ingest("a", &tone, 400).expect("ingest");

        // same tone in 3-sample chunks with one chunk starting on a spike
        let mut glitched = tone.clone();
        glitched[300][0] = 500.0;
        for chunk in glitched.chunks(3) {
            spiked.ingest("a", chunk, 400).expect("ingest");
        }

        let a = clean.compute_spectrum("a").expect("spectrum");
        let b = spiked.compute_spectrum("a").expect("spectrum");
        let max_diff = a
            .payload
            .combined
            .iter()
            .zip(&b.payload.combined)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max);
        assert!(max_diff < 0.05, "spike leaked into spectrum (max bin diff {max_diff})");
        assert!((b.payload.axes[0].p2p - a.payload.axes[0].p2p).abs() < 0.1);
    }

    #[test]
    fn handle_sees_published_payload() {
        let mut p = make_processor();
        p.ingest("a", &make_tone(600, 400.0, 30.0, 1.0), 400).expect("ingest");
        let handle = p.spectrum_handle("a").expect("handle");
        assert!(handle.load().is_none());
        let published = p.compute_spectrum("a").expect("spectrum");
        let seen = handle.load_full().expect("visible");
        assert_eq!(seen.version, published.version);
    }
}
