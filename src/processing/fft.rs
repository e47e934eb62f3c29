//! FFT computation using rustfft
//!
//! Windowed magnitude spectra for triaxial accelerometer blocks.
//!
//! # Pipeline
//!
//! - NaN-safe 3-point median filter (applied at ingest)
//! - Mean removal (detrend)
//! - Hann window, pre-planned real-input FFT
//! - Single-sided amplitude `|X| * 2 / sum(w)` with DC and Nyquist halved
//! - Combined RMS spectrum across axes and smoothed peak extraction
//!
//! Every function degrades to an empty or all-zero result on empty or
//! non-finite input instead of failing.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::types::PeakPoint;

// ============================================================================
// Sample Conditioning
// ============================================================================

/// 3-point median filter that never spreads non-finite values.
///
/// Interior samples take the median of the finite values among themselves and
/// their two neighbours. A finite sample next to a non-finite neighbour is kept
/// as is, and a sample with no finite values around it becomes 0.0.
pub fn median3_nan_safe(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| {
            let v = values[i];
            let left = (i > 0).then(|| values[i - 1]).filter(|x| x.is_finite());
            let right = (i + 1 < n).then(|| values[i + 1]).filter(|x| x.is_finite());
            match (v.is_finite(), left, right) {
                (true, Some(l), Some(r)) => median_of_three(l, v, r),
                (true, _, _) => v,
                (false, Some(l), Some(r)) => (l + r) / 2.0,
                (false, Some(x), None) | (false, None, Some(x)) => x,
                (false, None, None) => 0.0,
            }
        })
        .collect()
}

fn median_of_three(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}

/// Subtract the mean in place. Non-finite entries are zeroed first.
pub fn detrend(values: &mut [f64]) {
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    if values.is_empty() {
        return;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    for v in values.iter_mut() {
        *v -= mean;
    }
}

/// Symmetric Hann window (`0.5 - 0.5 cos(2πk / (n-1))`).
pub fn hann_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|k| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * k as f64 / denom).cos())
        .collect()
}

/// Frequencies of the single-sided spectrum bins.
pub fn rfft_frequencies(n: usize, sample_rate_hz: f64) -> Vec<f64> {
    if n == 0 || !(sample_rate_hz > 0.0) {
        return Vec::new();
    }
    (0..=n / 2).map(|k| k as f64 * sample_rate_hz / n as f64).collect()
}

/// Root mean square and peak-to-peak of a block. Non-finite results become 0.
pub fn rms_p2p(values: &[f64]) -> (f64, f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (0.0, 0.0);
    }
    let rms = (finite.iter().map(|v| v * v).sum::<f64>() / finite.len() as f64).sqrt();
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let zero_if_nan = |v: f64| if v.is_finite() { v } else { 0.0 };
    (zero_if_nan(rms), zero_if_nan(max - min))
}

// ============================================================================
// FFT Kernel
// ============================================================================

/// Pre-planned windowed FFT of a fixed length.
pub struct FftKernel {
    n: usize,
    window: Vec<f64>,
    scale: f64,
    plan: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for FftKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftKernel").field("n", &self.n).finish()
    }
}

impl FftKernel {
    pub fn new(n: usize) -> Self {
        let n = n.max(2);
        let window = hann_window(n);
        let scale = 2.0 / window.iter().sum::<f64>().max(1.0);
        let plan = FftPlanner::new().plan_fft_forward(n);
        Self { n, window, scale, plan }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Single-sided amplitude spectrum of `block` (length `n/2 + 1`).
    ///
    /// The block is detrended and windowed; a short block is zero-extended.
    pub fn amplitude(&self, block: &[f64]) -> Vec<f64> {
        let mut samples: Vec<f64> = block.iter().copied().take(self.n).collect();
        detrend(&mut samples);
        samples.resize(self.n, 0.0);

        let mut buf: Vec<Complex<f64>> = samples
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.plan.process(&mut buf);

        let half = self.n / 2 + 1;
        let mut spec: Vec<f64> = buf[..half]
            .iter()
            .map(|c| {
                let a = c.norm() * self.scale;
                if a.is_finite() {
                    a
                } else {
                    0.0
                }
            })
            .collect();
        spec[0] *= 0.5;
        if self.n % 2 == 0 && spec.len() > 1 {
            let last = spec.len() - 1;
            spec[last] *= 0.5;
        }
        spec
    }
}

// ============================================================================
// Spectrum Combination and Peaks
// ============================================================================

/// Combine per-axis amplitudes into `sqrt(sum(axis^2) / divisor)` per bin.
///
/// `divisor` is `axis_count_for_mean` when given (min 1), else the number of
/// axes. Output length is the shortest axis length.
pub fn combined_spectrum(axes: &[&[f64]], axis_count_for_mean: Option<usize>) -> Vec<f64> {
    let len = axes.iter().map(|a| a.len()).min().unwrap_or(0);
    if len == 0 {
        return Vec::new();
    }
    let divisor = axis_count_for_mean.unwrap_or(axes.len()).max(1) as f64;
    (0..len)
        .map(|i| {
            let sq: f64 = axes
                .iter()
                .map(|a| if a[i].is_finite() { a[i] * a[i] } else { 0.0 })
                .sum();
            (sq / divisor).sqrt()
        })
        .collect()
}

/// Moving average with edge-replicated padding.
///
/// Edges are padded with copies of the first and last values (never zeros), so
/// boundary bins keep their level.
pub fn smooth_edge_replicated(values: &[f64], width: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || width <= 1 {
        return values.to_vec();
    }
    let half = width / 2;
    let span = (2 * half + 1) as f64;
    (0..n)
        .map(|i| {
            let sum: f64 = (0..=2 * half)
                .map(|k| values[(i + k).saturating_sub(half).min(n - 1)])
                .sum();
            sum / span
        })
        .collect()
}

/// Top `k` local maxima of the smoothed spectrum, first and last bins included.
///
/// Peaks are ranked by smoothed amplitude and reported with the unsmoothed
/// amplitude so downstream energy estimates are not attenuated.
pub fn extract_peaks(
    freq_hz: &[f64],
    amps: &[f64],
    smoothing_bins: usize,
    k: usize,
) -> Vec<PeakPoint> {
    let n = freq_hz.len().min(amps.len());
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let raw: Vec<f64> = amps[..n]
        .iter()
        .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
        .collect();
    let smooth = smooth_edge_replicated(&raw, smoothing_bins);

    let mut idx: Vec<usize> = (0..n)
        .filter(|&i| {
            let left_ok = i == 0 || smooth[i] > smooth[i - 1];
            let right_ok = i + 1 == n || smooth[i] >= smooth[i + 1];
            left_ok && right_ok && smooth[i] > 0.0
        })
        .collect();
    idx.sort_by(|&a, &b| smooth[b].total_cmp(&smooth[a]));
    idx.truncate(k);
    idx.into_iter()
        .map(|i| PeakPoint::new(freq_hz[i], raw[i]))
        .collect()
}

/// Top `k` bins by amplitude with the DC bin ignored (per-axis summary).
pub fn top_bins(freq_hz: &[f64], amps: &[f64], k: usize) -> Vec<PeakPoint> {
    let n = freq_hz.len().min(amps.len());
    let mut idx: Vec<usize> = (1..n).filter(|&i| amps[i].is_finite()).collect();
    idx.sort_by(|&a, &b| amps[b].total_cmp(&amps[a]));
    idx.truncate(k);
    idx.into_iter()
        .map(|i| PeakPoint::new(freq_hz[i], amps[i]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(n: usize, sr: f64, hz: f64, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * std::f64::consts::PI * hz * i as f64 / sr).sin())
            .collect()
    }

    #[test]
    fn median_filter_replaces_single_glitch() {
        let out = median3_nan_safe(&[1.0, 1.0, f64::NAN, 1.0, 1.0]);
        assert!(out.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn median_filter_does_not_spread_nan() {
        let out = median3_nan_safe(&[2.0, f64::NAN, 4.0]);
        assert_eq!(out[0], 2.0);
        assert_eq!(out[1], 3.0);
        assert_eq!(out[2], 4.0);
        assert_eq!(median3_nan_safe(&[f64::NAN, f64::INFINITY]), vec![0.0, 0.0]);
    }

    #[test]
    fn median_filter_rejects_spike() {
        let out = median3_nan_safe(&[0.0, 0.0, 100.0, 0.0, 0.0]);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn tone_peak_within_one_bin() {
        let n = 2048;
        let sr = 800.0;
        let kernel = FftKernel::new(n);
        let spec = kernel.amplitude(&tone(n, sr, 37.3, 0.5));
        let freqs = rfft_frequencies(n, sr);
        let peaks = extract_peaks(&freqs, &spec, 3, 3);
        let bin = sr / n as f64;
        assert!((peaks[0].hz - 37.3).abs() <= bin, "peak at {}", peaks[0].hz);
        // Hann scaling recovers the tone amplitude within scalloping loss
        assert!(peaks[0].amp > 0.3 && peaks[0].amp < 0.55, "amp {}", peaks[0].amp);
    }

    #[test]
    fn empty_and_nan_inputs_are_neutral() {
        let kernel = FftKernel::new(64);
        let spec = kernel.amplitude(&[f64::NAN; 64]);
        assert!(spec.iter().all(|v| *v == 0.0));
        assert!(extract_peaks(&[], &[], 3, 3).is_empty());
        assert!(combined_spectrum(&[], None).is_empty());
        assert_eq!(rms_p2p(&[f64::NAN]), (0.0, 0.0));
    }

    #[test]
    fn combined_single_axis_reproduces_magnitude() {
        let x = [1.0, 2.0, 3.0];
        let out = combined_spectrum(&[&x], Some(1));
        assert_eq!(out, vec![1.0, 2.0, 3.0]);

        let y = [0.0, 0.0, 0.0];
        let z = [0.0, 0.0, 0.0];
        let out = combined_spectrum(&[&x, &y, &z], None);
        assert!((out[2] - 3.0 / 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn smoothing_replicates_edges() {
        let out = smooth_edge_replicated(&[4.0, 4.0, 4.0, 4.0], 3);
        assert_eq!(out, vec![4.0, 4.0, 4.0, 4.0]);
        let out = smooth_edge_replicated(&[3.0, 0.0, 0.0], 3);
        assert!((out[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn last_bin_local_maximum_is_kept() {
        let freqs: Vec<f64> = (0..10).map(f64::from).collect();
        let mut amps = vec![0.1; 10];
        amps[9] = 1.0;
        let peaks = extract_peaks(&freqs, &amps, 3, 2);
        assert_eq!(peaks[0].hz, 9.0);
        assert_eq!(peaks[0].amp, 1.0);
    }
}
