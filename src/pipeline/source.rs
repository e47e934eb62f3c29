//! Frame source abstraction for sensor data ingestion.
//!
//! Provides a unified trait for reading [`SensorFrame`]s from different
//! sources: pre-loaded replays, JSON lines (stdin), and the bounded ingest
//! queue fed by transport tasks.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

use crate::types::SensorFrame;

/// Events produced by a frame source.
#[derive(Debug)]
pub enum FrameEvent {
    /// A decoded sensor frame.
    Frame(SensorFrame),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where sensor frames come from.
///
/// The processing loop calls [`next_frame`](FrameSource::next_frame) in a
/// `select!` with cancellation, so implementations must not lose a frame when
/// the future is dropped before completion.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Read the next frame. Returns `FrameEvent::Eof` when no more data is available.
    async fn next_frame(&mut self) -> Result<FrameEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;

    /// Frames discarded before reaching the loop.
    fn dropped_frames(&self) -> u64 {
        0
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays pre-loaded frames with an optional inter-frame delay.
pub struct ReplaySource {
    frames: std::vec::IntoIter<SensorFrame>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(frames: Vec<SensorFrame>, delay_ms: u64) -> Self {
        Self {
            frames: frames.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }

    /// Parse a JSON-lines file body. Malformed lines are skipped with a warning.
    pub fn from_json_lines(body: &str, delay_ms: u64) -> Self {
        let frames = body
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<SensorFrame>(line) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!(line = n + 1, "[ReplaySource] Failed to parse frame: {}", e);
                    None
                }
            })
            .collect();
        Self::new(frames, delay_ms)
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.frames.next() {
            Some(frame) => {
                self.yielded_first = true;
                Ok(FrameEvent::Frame(frame))
            }
            None => Ok(FrameEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// JSON Lines Source
// ============================================================================

/// Reads one JSON [`SensorFrame`] per line.
///
/// Used with the simulation harness:
/// `simulation | vibesense --stdin`
pub struct JsonLinesSource<R> {
    reader: R,
    line_buffer: String,
    name: &'static str,
    malformed: u64,
}

/// JSON frames from the process's standard input.
pub type StdinSource = JsonLinesSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        JsonLinesSource::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> JsonLinesSource<R> {
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(4096),
            name,
            malformed: 0,
        }
    }

    /// Lines that failed to parse so far.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> FrameSource for JsonLinesSource<R> {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(FrameEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SensorFrame>(line) {
                Ok(frame) => return Ok(FrameEvent::Frame(frame)),
                Err(e) => {
                    self.malformed += 1;
                    tracing::warn!("[{}] Failed to parse frame: {}", self.name, e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }

    fn dropped_frames(&self) -> u64 {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_line(id: &str, t: f64) -> String {
        format!(r#"{{"sensor_id":"{id}","t_s":{t},"sample_rate_hz":800,"samples":[[0,0,256]]}}"#)
    }

    #[tokio::test]
    async fn replay_yields_frames_then_eof() {
        let body = format!("{}\n{}\n", frame_line("a", 0.0), frame_line("b", 0.5));
        let mut src = ReplaySource::from_json_lines(&body, 0);
        assert_eq!(src.remaining(), 2);
        assert!(matches!(src.next_frame().await, Ok(FrameEvent::Frame(f)) if f.sensor_id == "a"));
        assert!(matches!(src.next_frame().await, Ok(FrameEvent::Frame(f)) if f.sensor_id == "b"));
        assert!(matches!(src.next_frame().await, Ok(FrameEvent::Eof)));
    }

    #[tokio::test]
    async fn json_lines_skip_malformed_input() {
        let body = format!("not json\n\n{}\n{{\"sensor_id\":1}}\n", frame_line("fl", 1.0));
        let reader = BufReader::new(std::io::Cursor::new(body.into_bytes()));
        let mut src = JsonLinesSource::new(reader, "test");
        match src.next_frame().await {
            Ok(FrameEvent::Frame(frame)) => {
                assert_eq!(frame.sensor_id, "fl");
                assert_eq!(frame.samples.len(), 1);
                assert!(frame.speed_kmh.is_none());
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(matches!(src.next_frame().await, Ok(FrameEvent::Eof)));
        assert_eq!(src.malformed_lines(), 2);
    }

    #[tokio::test]
    async fn json_lines_reassemble_split_reads() {
        let line = frame_line("rr", 2.0);
        let (head, tail) = line.split_at(line.len() / 2);
        let mock = tokio_test::io::Builder::new()
            .read(head.as_bytes())
            .read(format!("{tail}\n").as_bytes())
            .build();
        let mut src = JsonLinesSource::new(BufReader::new(mock), "mock");
        assert!(matches!(src.next_frame().await, Ok(FrameEvent::Frame(f)) if f.sensor_id == "rr"));
        assert!(matches!(src.next_frame().await, Ok(FrameEvent::Eof)));
        assert_eq!(src.dropped_frames(), 0);
    }
}
