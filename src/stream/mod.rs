//! The receive-side stream core: adaptive jitter buffering and playback
//! scheduling.
//!
//! Data flows ingestion-first: an arriving payload updates the
//! [`jitter::JitterEstimator`] and [`latency::InterArrivalEstimator`], gives
//! the [`control::BufferSizeController`] an adaptation opportunity, then
//! lands in the [`queue::PlaybackQueue`]. The [`scheduler`] decides on every
//! trigger whether to wait, render or go idle, and [`session::StreamSession`]
//! ties one instance of all of it to a lifecycle.

pub mod control;
pub mod jitter;
pub mod latency;
pub mod queue;
pub mod scheduler;
pub mod session;

pub use control::{BufferSizeController, LatencyMode, NetworkQuality};
pub use jitter::JitterEstimator;
pub use latency::InterArrivalEstimator;
pub use queue::{PlaybackQueue, QueueError};
pub use scheduler::SchedulerState;
pub use session::{SessionStats, StreamSession};
