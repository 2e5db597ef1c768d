//! Jitter estimation from frame inter-arrival intervals.
//!
//! Jitter here means the population standard deviation of the gaps between
//! consecutive frame arrivals, over a bounded recent window. It is the sole
//! input to the buffer size controller's adaptation decisions.

use std::collections::VecDeque;

const INTERVAL_WINDOW_SIZE: usize = 50;

/// Tracks inter-arrival intervals and derives a jitter statistic.
pub struct JitterEstimator {
    intervals: VecDeque<f64>,
    last_arrival_ms: Option<u64>,
}

impl JitterEstimator {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(INTERVAL_WINDOW_SIZE),
            last_arrival_ms: None,
        }
    }

    /// Record one arrival.
    ///
    /// The first call only stores the reference timestamp; there is nothing
    /// to difference yet. Every later call appends the delta to the window,
    /// evicting the oldest entry once the window is full.
    pub fn observe(&mut self, arrival_ms: u64) {
        if let Some(last) = self.last_arrival_ms {
            let delta = arrival_ms.saturating_sub(last) as f64;
            if self.intervals.len() >= INTERVAL_WINDOW_SIZE {
                self.intervals.pop_front();
            }
            self.intervals.push_back(delta);
        }
        self.last_arrival_ms = Some(arrival_ms);
    }

    /// Population standard deviation of the recorded intervals, in ms.
    ///
    /// Returns 0.0 with fewer than 2 intervals. Pure query, no side effects.
    pub fn jitter(&self) -> f64 {
        if self.intervals.len() < 2 {
            return 0.0;
        }

        let n = self.intervals.len() as f64;
        let mean = self.intervals.iter().sum::<f64>() / n;
        let variance = self
            .intervals
            .iter()
            .map(|x| (x - mean) * (x - mean))
            .sum::<f64>()
            / n;

        variance.sqrt()
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_arrival_ms = None;
    }
}

impl Default for JitterEstimator {
    fn default() -> Self {
        Self::new()
    }
}
