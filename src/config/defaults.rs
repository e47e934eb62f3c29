//! System-wide default constants.
//!
//! Every tunable in [`DiagnosticsConfig`](super::DiagnosticsConfig) takes its
//! default from here. Grouped by subsystem for easy discovery.

// ============================================================================
// Spectral Processing
// ============================================================================

/// Seconds of waveform retained per sensor ring buffer.
pub const WAVEFORM_SECONDS: f64 = 8.0;

/// FFT length in samples. Spectra are only computed once this many samples exist.
pub const FFT_N: usize = 2048;

/// Lower edge of the reported spectrum band (Hz).
pub const SPECTRUM_MIN_HZ: f64 = 0.0;

/// Upper edge of the reported spectrum band (Hz).
pub const SPECTRUM_MAX_HZ: f64 = 200.0;

/// Default accelerometer scale (ADXL345 full-resolution: 256 LSB/g).
pub const ACCEL_SCALE_G_PER_LSB: f64 = 1.0 / 256.0;

/// Upper bound on a sensor's declared sample rate (Hz).
pub const MAX_SAMPLE_RATE_HZ: u32 = 4096;

/// Moving-average width used before per-axis peak picking.
pub const PEAK_SMOOTHING_BINS: usize = 3;

/// Peaks reported per axis.
pub const AXIS_PEAKS: usize = 3;

/// Peaks reported for the combined spectrum.
pub const COMBINED_PEAKS: usize = 8;

/// Candidate threshold as a multiple of the P20 noise floor.
pub const PEAK_THRESHOLD_FLOOR_RATIO: f64 = 2.6;

// ============================================================================
// Vibration Strength
// ============================================================================

/// Lower bound on the dB stabilising epsilon (g).
pub const STRENGTH_EPSILON_MIN_G: f64 = 1e-9;

/// Epsilon as a fraction of the floor amplitude.
pub const STRENGTH_EPSILON_FLOOR_RATIO: f64 = 0.05;

/// Half-width of the band integrated around a peak (Hz).
pub const PEAK_BANDWIDTH_HZ: f64 = 1.2;

/// Minimum spacing between reported strength peaks (Hz).
pub const PEAK_SEPARATION_HZ: f64 = 1.2;

/// Lower edges of severity buckets l1..l5 (dB).
pub const BAND_THRESHOLDS_DB: [f64; 5] = [8.0, 16.0, 26.0, 36.0, 46.0];

/// dB below the current bucket's lower edge that counts as a decay tick.
pub const HYSTERESIS_DB: f64 = 2.0;

/// Consecutive low ticks before a bucket is demoted.
pub const DECAY_TICKS: u32 = 5;

/// Bonus applied when two or more sensors see the same source (dB).
pub const MULTI_SENSOR_CORROBORATION_DB: f64 = 3.0;

/// dB value fed to trackers that were not observed in a tick.
pub const SILENCE_DB: f64 = -120.0;

// ============================================================================
// Vehicle Defaults
// ============================================================================

pub const TIRE_WIDTH_MM: f64 = 285.0;
pub const TIRE_ASPECT_PCT: f64 = 30.0;
pub const RIM_IN: f64 = 21.0;
pub const FINAL_DRIVE_RATIO: f64 = 3.08;
pub const CURRENT_GEAR_RATIO: f64 = 0.64;
pub const TIRE_DEFLECTION_FACTOR: f64 = 1.0;
pub const WHEEL_BANDWIDTH_PCT: f64 = 6.0;
pub const DRIVESHAFT_BANDWIDTH_PCT: f64 = 5.6;
pub const ENGINE_BANDWIDTH_PCT: f64 = 6.2;
pub const SPEED_UNCERTAINTY_PCT: f64 = 0.6;
pub const TIRE_DIAMETER_UNCERTAINTY_PCT: f64 = 1.2;
pub const FINAL_DRIVE_UNCERTAINTY_PCT: f64 = 0.2;
pub const GEAR_UNCERTAINTY_PCT: f64 = 0.5;
pub const MIN_ABS_BAND_HZ: f64 = 0.4;
pub const MAX_BAND_HALF_WIDTH_PCT: f64 = 8.0;

// ============================================================================
// Order Classification
// ============================================================================

/// Wheel orders pass through tire sidewall and suspension bushings.
pub const WHEEL_PATH_COMPLIANCE: f64 = 1.5;

/// Driveshaft and engine orders couple stiffly into the body.
pub const RIGID_PATH_COMPLIANCE: f64 = 1.0;

pub const ROAD_RESONANCE_MIN_HZ: f64 = 0.5;
pub const ROAD_RESONANCE_MAX_HZ: f64 = 3.0;

/// Relative distance under which wheel 2x and engine 1x are reported as one.
pub const MIN_OVERLAP_TOLERANCE: f64 = 0.03;

/// Predicted orders at or below this frequency are not matched (Hz).
pub const MIN_ORDER_HZ: f64 = 0.2;

// ============================================================================
// Driving Phase
// ============================================================================

pub const IDLE_SPEED_KMH: f64 = 3.0;
pub const ACCEL_THRESHOLD_KMH_S: f64 = 1.5;
pub const DECEL_THRESHOLD_KMH_S: f64 = -1.5;
pub const COAST_DOWN_MAX_KMH: f64 = 15.0;
pub const MIN_DERIVATIVE_DT_S: f64 = 0.01;

/// Samples retained by the live phase classifier.
pub const LIVE_PHASE_HISTORY: usize = 5;

/// Diagnostic (non-idle) samples needed before idle samples are excluded.
pub const MIN_DIAGNOSTIC_SAMPLES: usize = 5;

// ============================================================================
// Run Findings
// ============================================================================

pub const ORDER_TOLERANCE_REL: f64 = 0.08;
pub const ORDER_TOLERANCE_MIN_HZ: f64 = 0.5;
pub const ORDER_MIN_MATCH_POINTS: usize = 4;
pub const ORDER_MIN_COVERAGE_POINTS: usize = 6;
pub const ORDER_MIN_CONFIDENCE: f64 = 0.25;
pub const ORDER_MIN_MATCH_RATE: f64 = 0.25;
pub const ORDER_CONSTANT_SPEED_MIN_MATCH_RATE: f64 = 0.55;
pub const ORDER_MAX_FINDINGS: usize = 5;
pub const CONSTANT_SPEED_STDDEV_KMH: f64 = 0.5;
pub const STEADY_SPEED_STDDEV_KMH: f64 = 2.0;
pub const STEADY_SPEED_RANGE_KMH: f64 = 8.0;
pub const SPEED_BIN_WIDTH_KMH: f64 = 10.0;
pub const SPEED_COVERAGE_MIN_PCT: f64 = 35.0;
pub const NEAR_TIE_DOMINANCE: f64 = 1.15;
pub const WEAK_SPATIAL_DOMINANCE: f64 = 1.2;
pub const MEMS_NOISE_FLOOR_G: f64 = 0.001;
pub const PERSISTENT_FREQ_BIN_HZ: f64 = 2.0;
pub const PERSISTENT_MAX_FINDINGS: usize = 3;

/// Top peaks read per sample by the findings engine.
pub const MAX_PEAKS_PER_SAMPLE: usize = 8;

// ============================================================================
// Live Diagnostics
// ============================================================================

pub const MATRIX_WINDOW_SECS: f64 = 300.0;
pub const HEARTBEAT_MS: u64 = 3000;
pub const TRACKER_PRUNE_TICKS: u32 = 60;
pub const MULTI_SYNC_WINDOW_MS: u64 = 800;
pub const MULTI_FREQ_BIN_HZ: f64 = 1.5;

/// Events retained for snapshots.
pub const MAX_RECENT_EVENTS: usize = 50;

/// Spacing between live aggregator ticks, in frame time (ms).
pub const LIVE_TICK_MS: u64 = 500;

/// Spacing between run-findings refreshes shown in live snapshots (frame time, ms).
pub const FINDINGS_REFRESH_MS: u64 = 3000;

/// Poll interval of the vehicle settings file watcher (seconds).
pub const SETTINGS_POLL_SECS: u64 = 2;

// ============================================================================
// Pipeline
// ============================================================================

/// Ingest queue depth (frames).
pub const QUEUE_CAPACITY: usize = 1024;

/// Minimum spacing between queue-overflow warnings (seconds).
pub const DROP_WARNING_INTERVAL_SECS: u64 = 5;

/// A sensor with no data for this long is considered departed (seconds).
pub const STALE_SENSOR_SECS: u64 = 10;

/// Base delay for `--speed` replay pacing (ms per frame at speed 1).
pub const REPLAY_BASE_DELAY_MS: u64 = 100;
