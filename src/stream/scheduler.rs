//! Playback scheduling.
//!
//! One tokio task per stream owns the playback queue, both estimators and
//! the buffer size controller, and runs the Idle/Waiting/Playing state
//! machine. Every trigger (a frame arriving, a render completing, the 5 ms
//! re-check while waiting, a stop request) funnels into the same loop, so
//! there is never more than one render in flight and no lock is held across
//! a suspension point.
//!
//! Nothing in here is fatal: render failures skip the frame, malformed
//! payloads are dropped, an empty queue just means going idle until the
//! next arrival.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::audio::frame::Frame;
use crate::audio::sink::AudioSink;
use crate::stream::control::{BufferSizeController, LatencyMode};
use crate::stream::jitter::JitterEstimator;
use crate::stream::latency::InterArrivalEstimator;
use crate::stream::queue::PlaybackQueue;
use crate::stream::session::SessionStats;

/// Cooperative re-check cadence while below target.
const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// After this many consecutive polls without reaching target, play whatever
/// is queued so a backlog drains when no further frames arrive.
const MAX_WAIT_POLLS: u32 = 40;

/// Where the scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Waiting,
    Playing,
}

impl SchedulerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            SchedulerState::Idle => 0,
            SchedulerState::Waiting => 1,
            SchedulerState::Playing => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SchedulerState::Waiting,
            2 => SchedulerState::Playing,
            _ => SchedulerState::Idle,
        }
    }
}

/// Triggers posted to the scheduler task.
pub(crate) enum StreamEvent {
    FrameArrived { payload: Vec<u8>, arrival_ms: u64 },
    SetMode(LatencyMode),
    Stop,
}

/// What the loop should do next, decided by [`SchedulerCore::advance`].
enum Step {
    /// Queue empty: park until the next trigger.
    Idle,
    /// Below target: re-check after [`POLL_INTERVAL`].
    Wait,
    /// Hand this frame to the sink.
    Render(Frame),
}

/// The single-owner state behind the scheduler task.
///
/// Constructed fresh on every session start; nothing in here is shared, so
/// every method is plain synchronous code and directly testable.
struct SchedulerCore {
    queue: PlaybackQueue,
    jitter: JitterEstimator,
    interval: InterArrivalEstimator,
    control: BufferSizeController,
    mode: LatencyMode,
    state: SchedulerState,
    wait_polls: u32,
}

impl SchedulerCore {
    fn new(mode: LatencyMode) -> Self {
        Self {
            queue: PlaybackQueue::new(),
            jitter: JitterEstimator::new(),
            interval: InterArrivalEstimator::new(),
            control: BufferSizeController::new(),
            mode,
            state: SchedulerState::Idle,
            wait_polls: 0,
        }
    }

    /// Ingest one arriving payload: decode, update both estimators, give the
    /// controller an adaptation opportunity, enqueue.
    ///
    /// Malformed payloads are dropped before any statistic is touched.
    fn ingest(&mut self, payload: Vec<u8>, arrival_ms: u64, stats: &SessionStats) {
        let frame = match Frame::decode(&payload, arrival_ms) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame: {e:#}");
                stats.record_malformed();
                return;
            }
        };

        self.jitter.observe(arrival_ms);
        self.interval.observe(arrival_ms);
        self.control
            .maybe_adapt(arrival_ms, self.jitter.jitter(), self.mode);

        if self.queue.enqueue(frame).is_some() {
            debug!("Playback queue full, dropped oldest frame");
            stats.record_dropped();
        }

        stats.record_interval(self.interval.average());
        stats.record_quality(self.control.quality());
        stats.record_target(self.control.current_target());
    }

    /// The idempotent "attempt to advance" decision. Safe to call from any
    /// trigger; it inspects queue state rather than relying on who woke it.
    fn advance(&mut self) -> Step {
        if self.queue.is_empty() {
            self.state = SchedulerState::Idle;
            self.wait_polls = 0;
            return Step::Idle;
        }

        let target = self.control.current_target();
        if self.state != SchedulerState::Playing
            && self.queue.len() < target
            && self.wait_polls < MAX_WAIT_POLLS
        {
            self.state = SchedulerState::Waiting;
            self.wait_polls += 1;
            return Step::Wait;
        }

        match self.queue.dequeue_oldest() {
            Ok(frame) => {
                self.state = SchedulerState::Playing;
                self.wait_polls = 0;
                Step::Render(frame)
            }
            // Unreachable given the emptiness check above; degrade to idle.
            Err(_) => {
                self.state = SchedulerState::Idle;
                Step::Idle
            }
        }
    }
}

/// Run one stream's scheduler until a stop request or the event channel
/// closes. Owns the sink for the lifetime of the stream.
pub(crate) async fn run_loop<S: AudioSink>(
    mut events: UnboundedReceiver<StreamEvent>,
    mut sink: S,
    stats: Arc<SessionStats>,
    mode: LatencyMode,
) {
    let mut core = SchedulerCore::new(mode);
    info!("Playback scheduler started");

    loop {
        let step = core.advance();
        stats.record_state(core.state);
        stats.record_queue_depth(core.queue.len());

        match step {
            Step::Render(frame) => {
                match sink.render(frame.samples).await {
                    Ok(()) => stats.record_played(),
                    Err(e) => {
                        // Transient: skip this frame, carry on with the next.
                        warn!("Render failed, skipping frame: {e:#}");
                        stats.record_skipped();
                    }
                }

                // Pick up whatever arrived while the render was in flight,
                // then immediately attempt the next advance.
                loop {
                    match events.try_recv() {
                        Ok(event) => {
                            if !handle_event(&mut core, event, &stats) {
                                shutdown(&mut core, &mut sink, &stats);
                                return;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
            Step::Wait => {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    event = events.recv() => match event {
                        Some(event) => {
                            if !handle_event(&mut core, event, &stats) {
                                shutdown(&mut core, &mut sink, &stats);
                                return;
                            }
                        }
                        None => {
                            shutdown(&mut core, &mut sink, &stats);
                            return;
                        }
                    },
                }
            }
            Step::Idle => match events.recv().await {
                Some(event) => {
                    if !handle_event(&mut core, event, &stats) {
                        shutdown(&mut core, &mut sink, &stats);
                        return;
                    }
                }
                None => {
                    shutdown(&mut core, &mut sink, &stats);
                    return;
                }
            },
        }
    }
}

/// Returns false when the stream should stop.
fn handle_event(core: &mut SchedulerCore, event: StreamEvent, stats: &SessionStats) -> bool {
    match event {
        StreamEvent::FrameArrived {
            payload,
            arrival_ms,
        } => {
            core.ingest(payload, arrival_ms, stats);
            true
        }
        StreamEvent::SetMode(mode) => {
            info!("Latency mode set to {:?}", mode);
            core.mode = mode;
            // Give the controller an immediate re-evaluation opportunity.
            core.control.reset_adaptation_timer();
            true
        }
        StreamEvent::Stop => false,
    }
}

/// Tear down per-stream state: flush the queue, release the sink, leave the
/// published diagnostics at their idle values. Pending triggers die with the
/// receiver, so no completion callback can resurrect playback.
fn shutdown<S: AudioSink>(core: &mut SchedulerCore, sink: &mut S, stats: &SessionStats) {
    core.queue.flush();
    core.jitter.reset();
    core.interval.reset();
    core.state = SchedulerState::Idle;
    sink.close();

    stats.record_state(SchedulerState::Idle);
    stats.record_queue_depth(0);
    info!("Playback scheduler stopped");
}
