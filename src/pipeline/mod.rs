//! Processing Pipeline Module
//!
//! ```text
//! transport task ──try_push──▶ IngestQueue (bounded, drop-newest)
//!                                   │
//!                              QueueSource
//!                                   │  select! { cancel | next_frame }
//!                                   ▼
//!                            ProcessingLoop
//!     ingest ─▶ spectrum ─▶ RunSample log ─▶ live tick (orders, matrix, events)
//!                                   │
//!                                   ▼
//!                      Arc<RwLock<AppState>> (heartbeat snapshots)
//!
//! config file ──poll mtime──▶ run_vehicle_watcher
//!                                   │  watch::channel<VehicleSpec>
//!                                   ▼
//!                      ProcessingLoop (applied on the next live tick)
//! ```
//!
//! When the source ends the accumulated run goes through the findings engine
//! and the summary is published to the shared state.

mod queue;
mod rate_limiter;
mod state;
pub mod processing_loop;
pub mod settings;
pub mod source;

pub use processing_loop::{PipelineStats, ProcessingLoop, RunOutcome};
pub use queue::{pump, IngestError, IngestQueue, PushOutcome, QueueSource};
pub use rate_limiter::RateLimiter;
pub use settings::{publish_vehicle, run_vehicle_watcher};
pub use source::{FrameEvent, FrameSource, JsonLinesSource, ReplaySource, StdinSource};
pub use state::*;
