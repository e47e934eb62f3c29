//! Config Validation Tests
//!
//! Typo detection, range validation and file loading for the diagnostics
//! config, exercised independently from the rest of the pipeline.

use std::io::Write;

use vibesense::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use vibesense::config::{ConfigError, DiagnosticsConfig};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_strength_section_warns_with_suggestion() {
    let toml_str = r#"
[strength]
hysteresis_bd = 3.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("hysteresis_bd"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("strength.hysteresis_db"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[processing]
fft_n = 4096
spectrum_max_hz = 150.0

[strength]
band_thresholds_db = [10.0, 18.0, 28.0, 38.0, 48.0]
decay_ticks = 8

[vehicle]
tire_width_mm = 225.0
tire_aspect_pct = 45.0
rim_in = 18.0
final_drive_ratio = 3.42
current_gear_ratio = 0.72

[orders]
wheel_path_compliance = 1.4

[phase]
idle_speed_kmh = 2.0

[findings]
min_confidence = 0.3

[live]
heartbeat_ms = 1000

[pipeline]
queue_capacity = 256
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(
        warnings.is_empty(),
        "Valid config should produce 0 warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
}

#[test]
fn unknown_section_warns() {
    let warnings = validate_unknown_keys("[telemetry]\nendpoint = \"udp://x\"\n");
    assert!(warnings.iter().any(|w| w.field == "telemetry"));
}

#[test]
fn multiple_typos_all_warned() {
    let toml_str = r#"
[vehicle]
rim_inch = 19.0

[live]
heartbeat = 1000
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 2, "Expected 2 warnings for 2 typos, got {}", warnings.len());
}

#[test]
fn empty_toml_produces_zero_warnings() {
    assert!(validate_unknown_keys("").is_empty());
}

#[test]
fn known_keys_set_is_complete() {
    let toml_str = DiagnosticsConfig::default().to_toml().expect("Default config should serialize");
    let warnings = validate_unknown_keys(&toml_str);
    assert!(
        warnings.is_empty(),
        "Default config serialization should produce 0 unknown-key warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
}

#[test]
fn far_off_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("completely.unrelated_key_name", &known).is_none());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn default_config_passes_validation() {
    let cfg = DiagnosticsConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(validate_physical_ranges(&cfg).is_empty());
}

#[test]
fn multiple_errors_are_reported_together() {
    let mut cfg = DiagnosticsConfig::default();
    cfg.processing.waveform_seconds = f64::NAN;
    cfg.strength.decay_ticks = 0;
    cfg.pipeline.queue_capacity = 0;
    match cfg.validate() {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 3, "got: {errors:?}");
            assert!(errors.iter().any(|e| e.contains("waveform_seconds")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn non_negative_decel_threshold_rejected() {
    let err = DiagnosticsConfig::from_toml_str("[phase]\ndecel_threshold_kmh_s = 0.0\n")
        .expect_err("zero decel threshold must fail");
    assert!(err.to_string().contains("decel_threshold_kmh_s"));
}

#[test]
fn implausible_vehicle_values_only_warn() {
    let cfg = DiagnosticsConfig::from_toml_str("[vehicle]\nrim_in = 40.0\n").expect("still loads");
    let warnings = validate_physical_ranges(&cfg);
    assert!(warnings.iter().any(|w| w.field == "vehicle.rim_in"));
    assert!((cfg.vehicle.sanitized().rim_in - 30.0).abs() < 1e-9);
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn load_from_file_round_trips_edits() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "[vehicle]\nfinal_drive_ratio = 3.91\n[live]\nmatrix_window_secs = 120.0"
    )
    .expect("write");

    let cfg = DiagnosticsConfig::load_from_file(file.path()).expect("load");
    assert!((cfg.vehicle.final_drive_ratio - 3.91).abs() < 1e-12);
    assert!((cfg.live.matrix_window_secs - 120.0).abs() < 1e-12);
    assert_eq!(cfg.processing.fft_n, DiagnosticsConfig::default().processing.fft_n);
}

#[test]
fn save_then_load_preserves_values() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("vibesense.toml");
    let mut cfg = DiagnosticsConfig::default();
    cfg.strength.hysteresis_db = 3.5;
    cfg.pipeline.queue_capacity = 64;
    cfg.save_to_file(&path).expect("save");

    let loaded = DiagnosticsConfig::load_from_file(&path).expect("load");
    assert!((loaded.strength.hysteresis_db - 3.5).abs() < 1e-12);
    assert_eq!(loaded.pipeline.queue_capacity, 64);
}

#[test]
fn malformed_file_reports_its_path() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[vehicle\nrim_in = ").expect("write");
    match DiagnosticsConfig::load_from_file(file.path()) {
        Err(ConfigError::Parse(path, _)) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = DiagnosticsConfig::load_from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_, _))));
}
