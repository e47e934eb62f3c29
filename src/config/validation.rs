//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks on vehicle geometry.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `DiagnosticsConfig`.
///
/// Maintained by hand to match the struct hierarchy in `diagnostics_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [processing]
        "processing",
        "processing.waveform_seconds",
        "processing.fft_n",
        "processing.spectrum_min_hz",
        "processing.spectrum_max_hz",
        "processing.accel_scale_g_per_lsb",
        "processing.max_sample_rate_hz",
        "processing.peak_smoothing_bins",
        "processing.axis_peaks",
        "processing.combined_peaks",
        "processing.peak_threshold_floor_ratio",
        // [strength]
        "strength",
        "strength.epsilon_min_g",
        "strength.epsilon_floor_ratio",
        "strength.peak_bandwidth_hz",
        "strength.peak_separation_hz",
        "strength.band_thresholds_db",
        "strength.hysteresis_db",
        "strength.decay_ticks",
        "strength.multi_sensor_corroboration_db",
        // [vehicle]
        "vehicle",
        "vehicle.tire_width_mm",
        "vehicle.tire_aspect_pct",
        "vehicle.rim_in",
        "vehicle.final_drive_ratio",
        "vehicle.current_gear_ratio",
        "vehicle.tire_deflection_factor",
        "vehicle.wheel_bandwidth_pct",
        "vehicle.driveshaft_bandwidth_pct",
        "vehicle.engine_bandwidth_pct",
        "vehicle.speed_uncertainty_pct",
        "vehicle.tire_diameter_uncertainty_pct",
        "vehicle.final_drive_uncertainty_pct",
        "vehicle.gear_uncertainty_pct",
        "vehicle.min_abs_band_hz",
        "vehicle.max_band_half_width_pct",
        // [orders]
        "orders",
        "orders.wheel_path_compliance",
        "orders.rigid_path_compliance",
        "orders.road_resonance_min_hz",
        "orders.road_resonance_max_hz",
        "orders.min_overlap_tolerance",
        "orders.min_order_hz",
        // [phase]
        "phase",
        "phase.idle_speed_kmh",
        "phase.accel_threshold_kmh_s",
        "phase.decel_threshold_kmh_s",
        "phase.coast_down_max_kmh",
        "phase.min_derivative_dt_s",
        // [findings]
        "findings",
        "findings.order_tolerance_rel",
        "findings.order_tolerance_min_hz",
        "findings.min_match_points",
        "findings.min_coverage_points",
        "findings.min_confidence",
        "findings.min_match_rate",
        "findings.constant_speed_min_match_rate",
        "findings.max_order_findings",
        "findings.constant_speed_stddev_kmh",
        "findings.steady_speed_stddev_kmh",
        "findings.steady_speed_range_kmh",
        "findings.speed_bin_width_kmh",
        "findings.speed_coverage_min_pct",
        "findings.near_tie_dominance",
        "findings.weak_spatial_dominance",
        "findings.mems_noise_floor_g",
        "findings.persistent_freq_bin_hz",
        "findings.persistent_max_findings",
        // [live]
        "live",
        "live.matrix_window_secs",
        "live.heartbeat_ms",
        "live.tracker_prune_ticks",
        "live.multi_sync_window_ms",
        "live.multi_freq_bin_hz",
        "live.max_recent_events",
        "live.findings_refresh_ms",
        // [pipeline]
        "pipeline",
        "pipeline.queue_capacity",
        "pipeline.drop_warning_interval_secs",
        "pipeline.stale_sensor_secs",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails: parse errors are reported by the serde pass that follows.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Flag values that parse and validate but are unusual for a passenger vehicle.
///
/// Out-of-bounds vehicle values are clamped at use time, so these are warnings.
pub fn validate_physical_ranges(config: &super::DiagnosticsConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let v = &config.vehicle;

    let mut check = |field: &str, value: f64, low: f64, high: f64, unit: &str| {
        if !(low..=high).contains(&value) {
            warnings.push(ValidationWarning {
                field: format!("vehicle.{field}"),
                message: format!(
                    "vehicle.{field} = {value:.2} is outside typical range \
                     ({low}-{high} {unit}) and will be clamped"
                ),
                suggestion: None,
            });
        }
    };
    check("tire_width_mm", v.tire_width_mm, 100.0, 500.0, "mm");
    check("tire_aspect_pct", v.tire_aspect_pct, 10.0, 90.0, "%");
    check("rim_in", v.rim_in, 10.0, 30.0, "in");
    check("final_drive_ratio", v.final_drive_ratio, 0.1, 20.0, "");
    check("current_gear_ratio", v.current_gear_ratio, 0.1, 20.0, "");
    check("tire_deflection_factor", v.tire_deflection_factor, 0.8, 1.0, "");

    if config.processing.spectrum_max_hz > f64::from(config.processing.max_sample_rate_hz) / 2.0 {
        warnings.push(ValidationWarning {
            field: "processing.spectrum_max_hz".to_string(),
            message: format!(
                "processing.spectrum_max_hz = {:.1} exceeds Nyquist for max_sample_rate_hz = {}",
                config.processing.spectrum_max_hz, config.processing.max_sample_rate_hz
            ),
            suggestion: None,
        });
    }

    warnings
}
