//! Per-stream lifecycle and the ingestion surface.
//!
//! A [`StreamSession`] owns one scheduler task and everything that task
//! touches: queue, controller, both estimators. All of it is constructed
//! fresh on `start()` and torn down on `stop()`, so nothing leaks across
//! sessions. The transport hands arriving payloads to [`StreamSession::
//! frame_arrived`]; observers read the lock-free [`SessionStats`] snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::audio::sink::AudioSink;
use crate::stream::control::{LatencyMode, NetworkQuality};
use crate::stream::scheduler::{SchedulerState, StreamEvent, run_loop};

/// Read-only diagnostics snapshot, published by the scheduler task.
///
/// Display-only: nothing inside the stream core reads these back. The
/// smoothed interval is frame inter-arrival spacing, not one-way network
/// delay; see `stream::latency`.
pub struct SessionStats {
    smoothed_interval_ms: AtomicU64,
    quality: AtomicU8,
    target: AtomicU64,
    queue_depth: AtomicU64,
    state: AtomicU8,
    frames_played: AtomicU64,
    frames_skipped: AtomicU64,
    frames_dropped: AtomicU64,
    frames_malformed: AtomicU64,
}

impl SessionStats {
    pub(crate) fn new() -> Self {
        Self {
            smoothed_interval_ms: AtomicU64::new(0f64.to_bits()),
            quality: AtomicU8::new(NetworkQuality::default().as_u8()),
            target: AtomicU64::new(1),
            queue_depth: AtomicU64::new(0),
            state: AtomicU8::new(SchedulerState::Idle.as_u8()),
            frames_played: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
        }
    }

    /// Smoothed inter-arrival spacing in ms.
    pub fn smoothed_interval_ms(&self) -> f64 {
        f64::from_bits(self.smoothed_interval_ms.load(Ordering::Acquire))
    }

    pub fn quality(&self) -> NetworkQuality {
        NetworkQuality::from_u8(self.quality.load(Ordering::Acquire))
    }

    /// Current target queue occupancy in frames.
    pub fn current_target(&self) -> usize {
        self.target.load(Ordering::Acquire) as usize
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Acquire) as usize
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Acquire)
    }

    /// Frames evicted by the queue's overflow cap.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Acquire)
    }

    pub fn frames_malformed(&self) -> u64 {
        self.frames_malformed.load(Ordering::Acquire)
    }

    pub(crate) fn record_interval(&self, interval_ms: f64) {
        self.smoothed_interval_ms
            .store(interval_ms.to_bits(), Ordering::Release);
    }

    pub(crate) fn record_quality(&self, quality: NetworkQuality) {
        self.quality.store(quality.as_u8(), Ordering::Release);
    }

    pub(crate) fn record_target(&self, target: usize) {
        self.target.store(target as u64, Ordering::Release);
    }

    pub(crate) fn record_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Release);
    }

    pub(crate) fn record_state(&self, state: SchedulerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn record_played(&self) {
        self.frames_played.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::AcqRel);
    }
}

/// One live audio stream: ingestion in, rendered audio out.
pub struct StreamSession {
    events: UnboundedSender<StreamEvent>,
    stats: Arc<SessionStats>,
    epoch: Instant,
    task: JoinHandle<()>,
}

impl StreamSession {
    /// Begin scheduling: spawns the scheduler task that owns `sink`.
    pub fn start<S: AudioSink + 'static>(sink: S, mode: LatencyMode) -> Self {
        let (events, rx) = unbounded_channel();
        let stats = Arc::new(SessionStats::new());
        let task = tokio::spawn(run_loop(rx, sink, stats.clone(), mode));

        Self {
            events,
            stats,
            epoch: Instant::now(),
            task,
        }
    }

    /// Hand an arriving transport payload to the stream, stamped with the
    /// session's monotonic clock.
    pub fn frame_arrived(&self, payload: Vec<u8>) {
        self.frame_arrived_at(payload, self.now_ms());
    }

    /// Same as [`frame_arrived`](Self::frame_arrived) with an explicit
    /// arrival timestamp (monotonic ms).
    pub fn frame_arrived_at(&self, payload: Vec<u8>, arrival_ms: u64) {
        let event = StreamEvent::FrameArrived {
            payload,
            arrival_ms,
        };
        if self.events.send(event).is_err() {
            debug!("Session stopped, discarding frame");
        }
    }

    /// Toggle the latency preference. Takes effect at the next adaptation
    /// opportunity, which the toggle itself makes immediate.
    pub fn set_mode(&self, mode: LatencyMode) {
        let _ = self.events.send(StreamEvent::SetMode(mode));
    }

    /// Milliseconds since this session started, monotonic.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    /// Stop the stream: pending triggers are discarded, the queue is
    /// flushed, the sink is released and the scheduler ends up idle.
    pub async fn stop(self) {
        let _ = self.events.send(StreamEvent::Stop);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::{FRAME_SAMPLES, Frame};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSink {
        rendered: Arc<Mutex<Vec<f32>>>,
    }

    #[async_trait::async_trait]
    impl AudioSink for RecordingSink {
        async fn render(&mut self, samples: Vec<f32>) -> anyhow::Result<()> {
            self.rendered.lock().unwrap().push(samples[0]);
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn payload(tag: f32) -> Vec<u8> {
        Frame::encode(&vec![tag; FRAME_SAMPLES])
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_session_plays_ingested_frames() {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            rendered: rendered.clone(),
        };
        let session = StreamSession::start(sink, LatencyMode::LowLatency);

        session.frame_arrived_at(payload(7.0), 0);
        session.frame_arrived_at(payload(8.0), 20);

        wait_for(|| rendered.lock().unwrap().len() == 2).await;
        assert_eq!(*rendered.lock().unwrap(), vec![7.0, 8.0]);
        assert_eq!(session.stats().frames_played(), 2);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_diagnostics_untouched() {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            rendered: rendered.clone(),
        };
        let session = StreamSession::start(sink, LatencyMode::LowLatency);
        let stats = session.stats();

        session.frame_arrived_at(vec![0xde, 0xad], 0);
        wait_for(|| stats.frames_malformed() == 1).await;

        assert_eq!(stats.frames_played(), 0);
        assert_eq!(stats.smoothed_interval_ms(), 0.0);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_leaves_idle_and_empty() {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            rendered: rendered.clone(),
        };
        let session = StreamSession::start(sink, LatencyMode::Normal);
        let stats = session.stats();

        for i in 0..10u64 {
            session.frame_arrived_at(payload(i as f32), i * 20);
        }
        session.stop().await;

        assert_eq!(stats.queue_depth(), 0);
        assert_eq!(stats.scheduler_state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_smoothed_interval_tracks_arrivals() {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            rendered: rendered.clone(),
        };
        let session = StreamSession::start(sink, LatencyMode::LowLatency);
        let stats = session.stats();

        session.frame_arrived_at(payload(1.0), 0);
        session.frame_arrived_at(payload(2.0), 100);

        // avg = 0 * 0.7 + 100 * 0.3
        wait_for(|| (stats.smoothed_interval_ms() - 30.0).abs() < 1e-9).await;

        session.stop().await;
    }
}
