//! Diagnostics Configuration Module
//!
//! Analysis tunables loaded from a TOML file, with built-in defaults for
//! every field.
//!
//! ## Loading Order
//!
//! 1. `VIBESENSE_CONFIG` environment variable (path to TOML file)
//! 2. `vibesense.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The binary calls `config::init()` once at startup. Core components never
//! read the global; they are constructed from the section they need:
//!
//! ```ignore
//! config::init(DiagnosticsConfig::load());
//! let processor = SignalProcessor::new(config::get().processing.clone(), ...);
//! ```

mod diagnostics_config;
pub mod defaults;
pub mod validation;

pub use diagnostics_config::*;

use std::sync::OnceLock;

/// Process-wide configuration, initialized once at startup.
static DIAGNOSTICS_CONFIG: OnceLock<DiagnosticsConfig> = OnceLock::new();

/// Initialize the process-wide configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: DiagnosticsConfig) {
    if DIAGNOSTICS_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the process-wide configuration.
///
/// Falls back to built-in defaults (and pins them) when `init()` was never
/// called, so library consumers that skip startup still get consistent values.
pub fn get() -> &'static DiagnosticsConfig {
    DIAGNOSTICS_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        DiagnosticsConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    DIAGNOSTICS_CONFIG.get().is_some()
}
