//! Application State and System Status
//!
//! Shared state for the diagnostics pipeline, written by the processing loop
//! and read by whatever presents results (the CLI summary, a UI bridge).

use serde::Serialize;
use std::time::Instant;

use crate::findings::RunSummary;
use crate::live::LiveSnapshot;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
///
/// This struct is wrapped in `Arc<RwLock<>>` for thread-safe access across
/// the async runtime.
#[derive(Debug, Clone, Serialize)]
pub struct AppState {
    /// Current system status
    pub status: SystemStatus,

    /// System uptime
    #[serde(skip)]
    pub uptime: Instant,

    /// Frames taken from the source
    pub frames_processed: u64,

    /// Frames rejected by the processor (bad shape, no sample rate)
    pub frames_rejected: u64,

    /// Frames dropped before reaching the loop
    pub frames_dropped: u64,

    /// Run samples recorded for the findings engine
    pub samples_recorded: u64,

    /// Live escalation events emitted
    pub events_emitted: u64,

    /// Sensors currently buffered
    pub active_sensors: Vec<String>,

    /// Wall-clock time of the last processed frame
    pub last_frame_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Latest live snapshot, published at the heartbeat cadence
    pub latest_snapshot: Option<LiveSnapshot>,

    /// Run analysis, available once the source is exhausted
    pub run_summary: Option<RunSummary>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            status: SystemStatus::Initializing,
            uptime: Instant::now(),
            frames_processed: 0,
            frames_rejected: 0,
            frames_dropped: 0,
            samples_recorded: 0,
            events_emitted: 0,
            active_sensors: Vec::new(),
            last_frame_time: None,
            latest_snapshot: None,
            run_summary: None,
        }
    }
}

impl AppState {
    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.uptime.elapsed().as_secs()
    }
}

// ============================================================================
// System Status
// ============================================================================

/// Pipeline lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Waiting for the first frame
    Initializing,
    /// Processing frames
    Monitoring,
    /// Source exhausted or cancelled
    Stopped,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Monitoring => write!(f, "Monitoring"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}
