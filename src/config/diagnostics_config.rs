//! Diagnostics Configuration - all analysis tunables as operator-editable TOML
//!
//! Every constant the diagnostic core depends on is a field in this module.
//! Each struct implements `Default` with values from [`super::defaults`], so a
//! missing file or a partial file behaves exactly like the built-in tuning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a diagnostics deployment.
///
/// Load with `DiagnosticsConfig::load()` which searches:
/// 1. `$VIBESENSE_CONFIG` env var
/// 2. `./vibesense.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Ring buffer and FFT parameters
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Strength scoring and severity hysteresis
    #[serde(default)]
    pub strength: StrengthConfig,

    /// Vehicle geometry and order-band tuning
    #[serde(default)]
    pub vehicle: VehicleSpec,

    /// Order classifier tuning
    #[serde(default)]
    pub orders: OrderConfig,

    /// Driving-phase thresholds
    #[serde(default)]
    pub phase: PhaseConfig,

    /// Run-level findings engine
    #[serde(default)]
    pub findings: FindingsConfig,

    /// Live diagnostics aggregator
    #[serde(default)]
    pub live: LiveConfig,

    /// Ingest queue and processing loop
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl DiagnosticsConfig {
    /// Load configuration using the standard search order:
    /// 1. `$VIBESENSE_CONFIG` environment variable
    /// 2. `./vibesense.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("VIBESENSE_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(
                            path = %p.display(),
                            "Loaded diagnostics config from VIBESENSE_CONFIG"
                        );
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from VIBESENSE_CONFIG, falling back"
                        );
                    }
                }
            } else {
                warn!(path = %path, "VIBESENSE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("vibesense.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded diagnostics config from ./vibesense.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./vibesense.toml, using defaults");
                }
            }
        }

        info!("No diagnostics config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are reported as warnings (with suggestions) before the
    /// strict serde pass, so a typo never silently reverts a value to default.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;

        for w in super::validation::validate_physical_ranges(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Diagnostics config saved");
        Ok(())
    }

    /// Validate internal consistency.
    ///
    /// Rules:
    /// - Durations, sizes and physical quantities must be finite and positive
    /// - Severity band thresholds must strictly increase
    /// - The deceleration threshold must be negative, acceleration positive
    /// - Road resonance band must be non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let p = &self.processing;
        Self::check_positive(p.waveform_seconds, "processing.waveform_seconds", &mut errors);
        Self::check_positive(
            p.accel_scale_g_per_lsb,
            "processing.accel_scale_g_per_lsb",
            &mut errors,
        );
        Self::check_positive(
            p.peak_threshold_floor_ratio,
            "processing.peak_threshold_floor_ratio",
            &mut errors,
        );
        if p.fft_n < 16 {
            errors.push(format!("processing.fft_n ({}) must be >= 16", p.fft_n));
        }
        if p.max_sample_rate_hz == 0 {
            errors.push("processing.max_sample_rate_hz must be > 0".to_string());
        }
        if !(p.spectrum_max_hz > p.spectrum_min_hz) {
            errors.push(format!(
                "processing.spectrum_max_hz ({}) must exceed spectrum_min_hz ({})",
                p.spectrum_max_hz, p.spectrum_min_hz
            ));
        }

        let s = &self.strength;
        Self::check_positive(s.epsilon_min_g, "strength.epsilon_min_g", &mut errors);
        Self::check_positive(s.peak_bandwidth_hz, "strength.peak_bandwidth_hz", &mut errors);
        Self::check_positive(s.peak_separation_hz, "strength.peak_separation_hz", &mut errors);
        if !s.hysteresis_db.is_finite() || s.hysteresis_db < 0.0 {
            errors.push(format!("strength.hysteresis_db ({}) must be >= 0", s.hysteresis_db));
        }
        if s.decay_ticks == 0 {
            errors.push("strength.decay_ticks must be > 0".to_string());
        }
        let thresholds = &s.band_thresholds_db;
        if thresholds.iter().any(|t| !t.is_finite()) {
            errors.push("strength.band_thresholds_db must be finite".to_string());
        } else if thresholds.windows(2).any(|w| w[1] <= w[0]) {
            errors.push(format!(
                "strength.band_thresholds_db ({thresholds:?}) must be strictly increasing"
            ));
        }

        let ph = &self.phase;
        Self::check_positive(ph.accel_threshold_kmh_s, "phase.accel_threshold_kmh_s", &mut errors);
        if !ph.decel_threshold_kmh_s.is_finite() || ph.decel_threshold_kmh_s >= 0.0 {
            errors.push(format!(
                "phase.decel_threshold_kmh_s ({}) must be negative",
                ph.decel_threshold_kmh_s
            ));
        }

        let o = &self.orders;
        Self::check_positive(o.wheel_path_compliance, "orders.wheel_path_compliance", &mut errors);
        Self::check_positive(o.rigid_path_compliance, "orders.rigid_path_compliance", &mut errors);
        if !(o.road_resonance_max_hz > o.road_resonance_min_hz) {
            errors.push(
                "orders.road_resonance_max_hz must exceed road_resonance_min_hz".to_string(),
            );
        }

        let f = &self.findings;
        Self::check_positive(f.speed_bin_width_kmh, "findings.speed_bin_width_kmh", &mut errors);
        Self::check_positive(f.mems_noise_floor_g, "findings.mems_noise_floor_g", &mut errors);
        Self::check_positive(
            f.persistent_freq_bin_hz,
            "findings.persistent_freq_bin_hz",
            &mut errors,
        );
        if f.min_match_points == 0 {
            errors.push("findings.min_match_points must be > 0".to_string());
        }

        if self.pipeline.queue_capacity == 0 {
            errors.push("pipeline.queue_capacity must be > 0".to_string());
        }
        Self::check_positive(self.live.matrix_window_secs, "live.matrix_window_secs", &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so test finiteness explicitly
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} ({value}) must be finite and > 0"));
        }
    }
}

// ============================================================================
// Processing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub waveform_seconds: f64,
    pub fft_n: usize,
    pub spectrum_min_hz: f64,
    pub spectrum_max_hz: f64,
    pub accel_scale_g_per_lsb: f64,
    pub max_sample_rate_hz: u32,
    pub peak_smoothing_bins: usize,
    pub axis_peaks: usize,
    pub combined_peaks: usize,
    pub peak_threshold_floor_ratio: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            waveform_seconds: defaults::WAVEFORM_SECONDS,
            fft_n: defaults::FFT_N,
            spectrum_min_hz: defaults::SPECTRUM_MIN_HZ,
            spectrum_max_hz: defaults::SPECTRUM_MAX_HZ,
            accel_scale_g_per_lsb: defaults::ACCEL_SCALE_G_PER_LSB,
            max_sample_rate_hz: defaults::MAX_SAMPLE_RATE_HZ,
            peak_smoothing_bins: defaults::PEAK_SMOOTHING_BINS,
            axis_peaks: defaults::AXIS_PEAKS,
            combined_peaks: defaults::COMBINED_PEAKS,
            peak_threshold_floor_ratio: defaults::PEAK_THRESHOLD_FLOOR_RATIO,
        }
    }
}

// ============================================================================
// Strength
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthConfig {
    pub epsilon_min_g: f64,
    pub epsilon_floor_ratio: f64,
    pub peak_bandwidth_hz: f64,
    pub peak_separation_hz: f64,
    /// Lower edges of l1..l5 in dB
    pub band_thresholds_db: [f64; 5],
    pub hysteresis_db: f64,
    pub decay_ticks: u32,
    pub multi_sensor_corroboration_db: f64,
}

impl Default for StrengthConfig {
    fn default() -> Self {
        Self {
            epsilon_min_g: defaults::STRENGTH_EPSILON_MIN_G,
            epsilon_floor_ratio: defaults::STRENGTH_EPSILON_FLOOR_RATIO,
            peak_bandwidth_hz: defaults::PEAK_BANDWIDTH_HZ,
            peak_separation_hz: defaults::PEAK_SEPARATION_HZ,
            band_thresholds_db: defaults::BAND_THRESHOLDS_DB,
            hysteresis_db: defaults::HYSTERESIS_DB,
            decay_ticks: defaults::DECAY_TICKS,
            multi_sensor_corroboration_db: defaults::MULTI_SENSOR_CORROBORATION_DB,
        }
    }
}

// ============================================================================
// Vehicle
// ============================================================================

/// Tire geometry, drivetrain ratios and order-band tuning.
///
/// Values may arrive at runtime from the vehicle settings source; see
/// [`VehicleSpec::sanitized`](crate::orders::VehicleSpec) for the clamping
/// applied before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSpec {
    pub tire_width_mm: f64,
    pub tire_aspect_pct: f64,
    pub rim_in: f64,
    pub final_drive_ratio: f64,
    pub current_gear_ratio: f64,
    /// Loaded-radius correction (1.0 = unloaded geometry)
    pub tire_deflection_factor: f64,
    pub wheel_bandwidth_pct: f64,
    pub driveshaft_bandwidth_pct: f64,
    pub engine_bandwidth_pct: f64,
    pub speed_uncertainty_pct: f64,
    pub tire_diameter_uncertainty_pct: f64,
    pub final_drive_uncertainty_pct: f64,
    pub gear_uncertainty_pct: f64,
    pub min_abs_band_hz: f64,
    pub max_band_half_width_pct: f64,
}

impl Default for VehicleSpec {
    fn default() -> Self {
        Self {
            tire_width_mm: defaults::TIRE_WIDTH_MM,
            tire_aspect_pct: defaults::TIRE_ASPECT_PCT,
            rim_in: defaults::RIM_IN,
            final_drive_ratio: defaults::FINAL_DRIVE_RATIO,
            current_gear_ratio: defaults::CURRENT_GEAR_RATIO,
            tire_deflection_factor: defaults::TIRE_DEFLECTION_FACTOR,
            wheel_bandwidth_pct: defaults::WHEEL_BANDWIDTH_PCT,
            driveshaft_bandwidth_pct: defaults::DRIVESHAFT_BANDWIDTH_PCT,
            engine_bandwidth_pct: defaults::ENGINE_BANDWIDTH_PCT,
            speed_uncertainty_pct: defaults::SPEED_UNCERTAINTY_PCT,
            tire_diameter_uncertainty_pct: defaults::TIRE_DIAMETER_UNCERTAINTY_PCT,
            final_drive_uncertainty_pct: defaults::FINAL_DRIVE_UNCERTAINTY_PCT,
            gear_uncertainty_pct: defaults::GEAR_UNCERTAINTY_PCT,
            min_abs_band_hz: defaults::MIN_ABS_BAND_HZ,
            max_band_half_width_pct: defaults::MAX_BAND_HALF_WIDTH_PCT,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    pub wheel_path_compliance: f64,
    pub rigid_path_compliance: f64,
    pub road_resonance_min_hz: f64,
    pub road_resonance_max_hz: f64,
    pub min_overlap_tolerance: f64,
    pub min_order_hz: f64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            wheel_path_compliance: defaults::WHEEL_PATH_COMPLIANCE,
            rigid_path_compliance: defaults::RIGID_PATH_COMPLIANCE,
            road_resonance_min_hz: defaults::ROAD_RESONANCE_MIN_HZ,
            road_resonance_max_hz: defaults::ROAD_RESONANCE_MAX_HZ,
            min_overlap_tolerance: defaults::MIN_OVERLAP_TOLERANCE,
            min_order_hz: defaults::MIN_ORDER_HZ,
        }
    }
}

// ============================================================================
// Phase
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub idle_speed_kmh: f64,
    pub accel_threshold_kmh_s: f64,
    pub decel_threshold_kmh_s: f64,
    pub coast_down_max_kmh: f64,
    pub min_derivative_dt_s: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            idle_speed_kmh: defaults::IDLE_SPEED_KMH,
            accel_threshold_kmh_s: defaults::ACCEL_THRESHOLD_KMH_S,
            decel_threshold_kmh_s: defaults::DECEL_THRESHOLD_KMH_S,
            coast_down_max_kmh: defaults::COAST_DOWN_MAX_KMH,
            min_derivative_dt_s: defaults::MIN_DERIVATIVE_DT_S,
        }
    }
}

// ============================================================================
// Findings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FindingsConfig {
    pub order_tolerance_rel: f64,
    pub order_tolerance_min_hz: f64,
    pub min_match_points: usize,
    pub min_coverage_points: usize,
    pub min_confidence: f64,
    pub min_match_rate: f64,
    pub constant_speed_min_match_rate: f64,
    pub max_order_findings: usize,
    pub constant_speed_stddev_kmh: f64,
    pub steady_speed_stddev_kmh: f64,
    pub steady_speed_range_kmh: f64,
    pub speed_bin_width_kmh: f64,
    pub speed_coverage_min_pct: f64,
    pub near_tie_dominance: f64,
    pub weak_spatial_dominance: f64,
    pub mems_noise_floor_g: f64,
    pub persistent_freq_bin_hz: f64,
    pub persistent_max_findings: usize,
}

impl Default for FindingsConfig {
    fn default() -> Self {
        Self {
            order_tolerance_rel: defaults::ORDER_TOLERANCE_REL,
            order_tolerance_min_hz: defaults::ORDER_TOLERANCE_MIN_HZ,
            min_match_points: defaults::ORDER_MIN_MATCH_POINTS,
            min_coverage_points: defaults::ORDER_MIN_COVERAGE_POINTS,
            min_confidence: defaults::ORDER_MIN_CONFIDENCE,
            min_match_rate: defaults::ORDER_MIN_MATCH_RATE,
            constant_speed_min_match_rate: defaults::ORDER_CONSTANT_SPEED_MIN_MATCH_RATE,
            max_order_findings: defaults::ORDER_MAX_FINDINGS,
            constant_speed_stddev_kmh: defaults::CONSTANT_SPEED_STDDEV_KMH,
            steady_speed_stddev_kmh: defaults::STEADY_SPEED_STDDEV_KMH,
            steady_speed_range_kmh: defaults::STEADY_SPEED_RANGE_KMH,
            speed_bin_width_kmh: defaults::SPEED_BIN_WIDTH_KMH,
            speed_coverage_min_pct: defaults::SPEED_COVERAGE_MIN_PCT,
            near_tie_dominance: defaults::NEAR_TIE_DOMINANCE,
            weak_spatial_dominance: defaults::WEAK_SPATIAL_DOMINANCE,
            mems_noise_floor_g: defaults::MEMS_NOISE_FLOOR_G,
            persistent_freq_bin_hz: defaults::PERSISTENT_FREQ_BIN_HZ,
            persistent_max_findings: defaults::PERSISTENT_MAX_FINDINGS,
        }
    }
}

// ============================================================================
// Live
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub matrix_window_secs: f64,
    pub heartbeat_ms: u64,
    pub tracker_prune_ticks: u32,
    pub multi_sync_window_ms: u64,
    pub multi_freq_bin_hz: f64,
    pub max_recent_events: usize,
    /// Frame time between findings refreshes on the live tick
    pub findings_refresh_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            matrix_window_secs: defaults::MATRIX_WINDOW_SECS,
            heartbeat_ms: defaults::HEARTBEAT_MS,
            tracker_prune_ticks: defaults::TRACKER_PRUNE_TICKS,
            multi_sync_window_ms: defaults::MULTI_SYNC_WINDOW_MS,
            multi_freq_bin_hz: defaults::MULTI_FREQ_BIN_HZ,
            max_recent_events: defaults::MAX_RECENT_EVENTS,
            findings_refresh_ms: defaults::FINDINGS_REFRESH_MS,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub drop_warning_interval_secs: u64,
    pub stale_sensor_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::QUEUE_CAPACITY,
            drop_warning_interval_secs: defaults::DROP_WARNING_INTERVAL_SECS,
            stale_sensor_secs: defaults::STALE_SENSOR_SECS,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(DiagnosticsConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DiagnosticsConfig::from_toml_str(
            "[vehicle]\nfinal_drive_ratio = 3.42\n",
        )
        .expect("partial config should parse");
        assert!((cfg.vehicle.final_drive_ratio - 3.42).abs() < 1e-12);
        assert!((cfg.vehicle.rim_in - defaults::RIM_IN).abs() < 1e-12);
        assert_eq!(cfg.strength.decay_ticks, defaults::DECAY_TICKS);
    }

    #[test]
    fn non_increasing_bands_rejected() {
        let mut cfg = DiagnosticsConfig::default();
        cfg.strength.band_thresholds_db = [8.0, 16.0, 16.0, 36.0, 46.0];
        let err = cfg.validate().expect_err("duplicate band edge must fail");
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn positive_decel_threshold_rejected() {
        let mut cfg = DiagnosticsConfig::default();
        cfg.phase.decel_threshold_kmh_s = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nan_value_rejected() {
        let mut cfg = DiagnosticsConfig::default();
        cfg.processing.waveform_seconds = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let mut cfg = DiagnosticsConfig::default();
        cfg.strength.decay_ticks = 7;
        let text = cfg.to_toml().expect("serialize");
        let back = DiagnosticsConfig::from_toml_str(&text).expect("parse");
        assert_eq!(back.strength.decay_ticks, 7);
    }
}
