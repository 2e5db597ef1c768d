//! Ordered holding area for frames awaiting render.
//!
//! Strict FIFO: play order is arrival order, no reordering or deduplication.
//! The queue carries a hard cap so a sustained burst that outpaces rendering
//! cannot grow memory without bound while the once-per-second adaptation
//! throttle catches up; overflow drops the oldest frame.

use std::collections::VecDeque;

use thiserror::Error;

use crate::audio::frame::Frame;

const QUEUE_CAP: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("playback queue is empty")]
    Empty,
}

pub struct PlaybackQueue {
    frames: VecDeque<Frame>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
        }
    }

    /// Append a frame at the tail. Returns the evicted frame when the cap
    /// forced the oldest one out.
    pub fn enqueue(&mut self, frame: Frame) -> Option<Frame> {
        let evicted = if self.frames.len() >= QUEUE_CAP {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Remove and return the head of the queue.
    ///
    /// `Empty` here is a programmer error given the scheduler's state
    /// discipline, but the guard stays so a bug degrades instead of panicking.
    pub fn dequeue_oldest(&mut self) -> Result<Frame, QueueError> {
        self.frames.pop_front().ok_or(QueueError::Empty)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop everything, unconditionally. Used on stop/reset.
    pub fn flush(&mut self) {
        self.frames.clear();
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}
