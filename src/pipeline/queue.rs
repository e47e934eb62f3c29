//! Bounded ingest queue between transport tasks and the processing loop.
//!
//! Producers never block: when the queue is full the newest frame is dropped,
//! a shared counter is incremented and a warning is logged at most once per
//! `drop_warning_interval_secs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::rate_limiter::RateLimiter;
use super::source::{FrameEvent, FrameSource};
use crate::config::PipelineConfig;
use crate::types::SensorFrame;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("ingest queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WarningKind {
    QueueFull,
}

/// Outcome of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full and this frame was discarded
    Dropped,
}

/// Producer half. Cheap to clone; all clones share the drop counter.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<SensorFrame>,
    dropped: Arc<AtomicU64>,
    warnings: Arc<Mutex<RateLimiter<WarningKind>>>,
}

impl IngestQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn channel(capacity: usize, drop_warning_interval: Duration) -> (Self, QueueSource) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let queue = Self {
            tx,
            dropped: Arc::clone(&dropped),
            warnings: Arc::new(Mutex::new(RateLimiter::new(drop_warning_interval))),
        };
        (queue, QueueSource { rx, dropped })
    }

    pub fn from_config(cfg: &PipelineConfig) -> (Self, QueueSource) {
        Self::channel(cfg.queue_capacity, Duration::from_secs(cfg.drop_warning_interval_secs))
    }

    /// Enqueue without waiting, dropping `frame` when the queue is full.
    pub fn try_push(&self, frame: SensorFrame) -> Result<PushOutcome, IngestError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(PushOutcome::Queued),
            Err(TrySendError::Full(frame)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                let allowed = self
                    .warnings
                    .lock()
                    .map(|mut limiter| limiter.allow(WarningKind::QueueFull))
                    .unwrap_or(true);
                if allowed {
                    warn!(
                        sensor = %frame.sensor_id,
                        dropped_total = total,
                        "[IngestQueue] Queue full, dropping newest frames"
                    );
                }
                Ok(PushOutcome::Dropped)
            }
            Err(TrySendError::Closed(_)) => Err(IngestError::QueueClosed),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, read by the processing loop.
pub struct QueueSource {
    rx: mpsc::Receiver<SensorFrame>,
    dropped: Arc<AtomicU64>,
}

#[async_trait]
impl FrameSource for QueueSource {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        // `recv` is cancel safe: a frame is either returned or left queued.
        Ok(match self.rx.recv().await {
            Some(frame) => FrameEvent::Frame(frame),
            None => FrameEvent::Eof,
        })
    }

    fn source_name(&self) -> &str {
        "ingest-queue"
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Forward every frame of `source` into `queue` until EOF or the queue closes.
///
/// Returns the number of frames offered.
pub async fn pump<S: FrameSource>(mut source: S, queue: IngestQueue) -> Result<u64> {
    let mut offered = 0u64;
    loop {
        match source.next_frame().await? {
            FrameEvent::Frame(frame) => {
                offered += 1;
                if queue.try_push(frame).is_err() {
                    break;
                }
            }
            FrameEvent::Eof => break,
        }
    }
    Ok(offered)
}
