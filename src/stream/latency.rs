//! Smoothed inter-arrival interval, for the diagnostics readout.
//!
//! This is deliberately *not* a one-way network latency: without clock
//! synchronization against the sender there is no way to measure that. What
//! it tracks is an exponential moving average of the spacing between
//! consecutive frame arrivals, which is what the display historically
//! labelled "latency". Nothing inside the stream core consumes this value.

use std::collections::VecDeque;

const ARRIVAL_WINDOW_SIZE: usize = 20;
const EMA_ALPHA: f64 = 0.3;

/// Exponential moving average of frame inter-arrival spacing.
pub struct InterArrivalEstimator {
    avg_interval_ms: f64,
    last_arrival_ms: Option<u64>,
    arrivals: VecDeque<u64>,
}

impl InterArrivalEstimator {
    pub fn new() -> Self {
        Self {
            avg_interval_ms: 0.0,
            last_arrival_ms: None,
            arrivals: VecDeque::with_capacity(ARRIVAL_WINDOW_SIZE),
        }
    }

    /// Record one arrival. From the second observation on, folds the delta
    /// into the EMA and appends the raw timestamp to the bounded window.
    pub fn observe(&mut self, arrival_ms: u64) {
        if let Some(last) = self.last_arrival_ms {
            let delta = arrival_ms.saturating_sub(last) as f64;
            self.avg_interval_ms = self.avg_interval_ms * (1.0 - EMA_ALPHA) + delta * EMA_ALPHA;

            if self.arrivals.len() >= ARRIVAL_WINDOW_SIZE {
                self.arrivals.pop_front();
            }
            self.arrivals.push_back(arrival_ms);
        }
        self.last_arrival_ms = Some(arrival_ms);
    }

    /// Current smoothed inter-arrival spacing in ms, 0.0 before any pair of
    /// observations exists.
    pub fn average(&self) -> f64 {
        self.avg_interval_ms
    }

    pub fn reset(&mut self) {
        self.avg_interval_ms = 0.0;
        self.last_arrival_ms = None;
        self.arrivals.clear();
    }
}

impl Default for InterArrivalEstimator {
    fn default() -> Self {
        Self::new()
    }
}
