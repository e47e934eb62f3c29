//! Per-sensor ring buffer with generation counters.
//!
//! Samples are stored raw; the glitch filter runs over the contiguous window
//! at read time. Every append bumps `ingest_generation`. Derived payloads are
//! wrapped in [`Versioned`] and tagged with the generation they were computed
//! from, so a stale cache is detectable by comparing versions instead of by
//! convention.

use std::time::Instant;

use super::fft::median3_nan_safe;

/// A payload tagged with the buffer generation it was derived from.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub payload: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, payload: T) -> Self {
        Self { version, payload }
    }

    /// True when the payload reflects generation `current`.
    pub fn is_current(&self, current: u64) -> bool {
        self.version == current
    }

    /// True when this payload was derived from an older generation.
    pub fn is_stale(&self, current: u64) -> bool {
        self.version < current
    }
}

/// Fixed-capacity circular store of triaxial samples in g.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    data: Vec<[f64; 3]>,
    write_idx: usize,
    count: usize,
    sample_rate_hz: u32,
    ingest_generation: u64,
    last_ingest: Option<Instant>,
}

impl SampleBuffer {
    /// Create a buffer; capacity is clamped to at least 1.
    pub fn new(capacity: usize, sample_rate_hz: u32) -> Self {
        Self {
            data: vec![[0.0; 3]; capacity.max(1)],
            write_idx: 0,
            count: 0,
            sample_rate_hz,
            ingest_generation: 0,
            last_ingest: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn set_sample_rate_hz(&mut self, rate: u32) {
        self.sample_rate_hz = rate;
    }

    pub fn generation(&self) -> u64 {
        self.ingest_generation
    }

    pub fn last_ingest(&self) -> Option<Instant> {
        self.last_ingest
    }

    /// Append samples already converted to g, unfiltered.
    ///
    /// A chunk at least as long as the capacity keeps only its tail.
    pub fn append(&mut self, chunk: &[[f64; 3]]) {
        if chunk.is_empty() {
            return;
        }
        let cap = self.capacity();
        let tail = if chunk.len() >= cap {
            &chunk[chunk.len() - cap..]
        } else {
            chunk
        };
        for sample in tail {
            self.data[self.write_idx] = *sample;
            self.write_idx = (self.write_idx + 1) % cap;
        }
        self.count = (self.count + tail.len()).min(cap);
        self.ingest_generation += 1;
        self.last_ingest = Some(Instant::now());
    }

    /// Most recent `n` samples in chronological order (fewer if not yet filled).
    pub fn latest(&self, n: usize) -> Vec<[f64; 3]> {
        let n = n.min(self.count);
        let cap = self.capacity();
        let start = (self.write_idx + cap - n) % cap;
        (0..n).map(|i| self.data[(start + i) % cap]).collect()
    }

    /// Most recent `n` samples with the NaN-safe 3-point median filter applied
    /// per axis across the whole contiguous window, so chunk boundaries play
    /// no part in glitch rejection.
    pub fn latest_filtered(&self, n: usize) -> Vec<[f64; 3]> {
        filter_block(&self.latest(n))
    }

    /// Change capacity, keeping the most recent `min(count, new_capacity)`
    /// samples. Capacity is clamped to at least 1; same capacity is a no-op.
    pub fn resize(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        if new_capacity == self.capacity() {
            return;
        }
        let keep = self.latest(new_capacity);
        let mut data = vec![[0.0; 3]; new_capacity];
        data[..keep.len()].copy_from_slice(&keep);
        self.data = data;
        self.count = keep.len();
        self.write_idx = keep.len() % new_capacity;
        self.ingest_generation += 1;
    }

    /// Drop all samples; the generation still advances.
    pub fn clear(&mut self) {
        self.count = 0;
        self.write_idx = 0;
        self.ingest_generation += 1;
    }
}

fn filter_block(block: &[[f64; 3]]) -> Vec<[f64; 3]> {
    let mut out = block.to_vec();
    for axis in 0..3 {
        let column: Vec<f64> = block.iter().map(|s| s[axis]).collect();
        for (dst, v) in out.iter_mut().zip(median3_nan_safe(&column)) {
            dst[axis] = v;
        }
    }
    out
}
