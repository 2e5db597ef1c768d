//! Target buffer size control.
//!
//! Converts the current jitter statistic and a latency preference into a
//! target playback queue occupancy, in frames. Adaptation is throttled to
//! once per second so a single outlier interval cannot swing the target;
//! the controller trades reaction speed for stability and accepts up to a
//! second of lag behind a regime change.

use tracing::debug;

const MIN_TARGET: usize = 1;
const MAX_TARGET: usize = 5;
const ADAPT_INTERVAL_MS: u64 = 1000;

const LOW_JITTER_MS: f64 = 20.0;
const HIGH_JITTER_MS: f64 = 50.0;

/// Latency preference, settable at any time by the outside world.
///
/// The controller only reads it at adaptation time, so a toggle between
/// cycles is picked up on the next eligible call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyMode {
    /// Keep the buffer as shallow as jitter allows. The default.
    #[default]
    LowLatency,
    /// Track jitter up and down across the full target range.
    Normal,
}

/// Network quality classification derived from jitter.
///
/// Display-only; recomputed on every adaptation in normal mode and left at
/// its previous value in low-latency mode, where it is not meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkQuality {
    Good,
    #[default]
    Medium,
    Poor,
}

impl NetworkQuality {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            NetworkQuality::Good => 0,
            NetworkQuality::Medium => 1,
            NetworkQuality::Poor => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => NetworkQuality::Good,
            2 => NetworkQuality::Poor,
            _ => NetworkQuality::Medium,
        }
    }
}

/// Adapts the target queue occupancy from jitter, at most once per second.
pub struct BufferSizeController {
    target: usize,
    last_adaptation_ms: Option<u64>,
    quality: NetworkQuality,
}

impl BufferSizeController {
    pub fn new() -> Self {
        Self {
            target: MIN_TARGET,
            last_adaptation_ms: None,
            quality: NetworkQuality::default(),
        }
    }

    /// Run one adaptation step if the throttle window has elapsed.
    ///
    /// Calls inside the window are no-ops. Returns whether an adaptation ran.
    pub fn maybe_adapt(&mut self, now_ms: u64, jitter: f64, mode: LatencyMode) -> bool {
        if let Some(last) = self.last_adaptation_ms {
            if now_ms.saturating_sub(last) < ADAPT_INTERVAL_MS {
                return false;
            }
        }
        self.last_adaptation_ms = Some(now_ms);

        let previous = self.target;
        match mode {
            LatencyMode::LowLatency => {
                // Stay at the floor unless jitter forces a bounded relaxation.
                self.target = if jitter > HIGH_JITTER_MS {
                    (MIN_TARGET + 1).min(MAX_TARGET)
                } else {
                    MIN_TARGET
                };
            }
            LatencyMode::Normal => {
                if jitter < LOW_JITTER_MS {
                    self.target = self.target.saturating_sub(1).max(MIN_TARGET);
                    self.quality = NetworkQuality::Good;
                } else if jitter > HIGH_JITTER_MS {
                    self.target = (self.target + 1).min(MAX_TARGET);
                    self.quality = NetworkQuality::Poor;
                } else {
                    self.quality = NetworkQuality::Medium;
                }
            }
        }

        if self.target != previous {
            debug!(
                "buffer target {} -> {} (jitter={:.1}ms, mode={:?})",
                previous, self.target, jitter, mode
            );
        }
        true
    }

    /// Current target occupancy, always within `[1, 5]`. Safe to call at any
    /// time, independent of adaptation cadence.
    pub fn current_target(&self) -> usize {
        self.target.clamp(MIN_TARGET, MAX_TARGET)
    }

    pub fn quality(&self) -> NetworkQuality {
        self.quality
    }

    /// Forget the throttle timestamp so the next `maybe_adapt` call runs
    /// immediately. Called when the latency mode is toggled.
    pub fn reset_adaptation_timer(&mut self) {
        self.last_adaptation_ms = None;
    }
}

impl Default for BufferSizeController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_calls_are_noops() {
        let mut ctrl = BufferSizeController::new();
        assert!(ctrl.maybe_adapt(0, 100.0, LatencyMode::Normal));
        let target = ctrl.current_target();

        for now in [1, 100, 500, 999] {
            assert!(!ctrl.maybe_adapt(now, 100.0, LatencyMode::Normal));
            assert_eq!(ctrl.current_target(), target);
        }

        assert!(ctrl.maybe_adapt(1000, 100.0, LatencyMode::Normal));
    }

    #[test]
    fn test_low_latency_pins_target_to_floor() {
        let mut ctrl = BufferSizeController::new();
        // Grow the target first in normal mode.
        for i in 0..4 {
            ctrl.maybe_adapt(i * 1000, 100.0, LatencyMode::Normal);
        }
        assert!(ctrl.current_target() > 1);

        ctrl.maybe_adapt(10_000, 30.0, LatencyMode::LowLatency);
        assert_eq!(ctrl.current_target(), 1);
    }

    #[test]
    fn test_low_latency_relaxes_under_high_jitter() {
        let mut ctrl = BufferSizeController::new();
        ctrl.maybe_adapt(0, 80.0, LatencyMode::LowLatency);
        assert_eq!(ctrl.current_target(), 2);

        ctrl.maybe_adapt(1000, 10.0, LatencyMode::LowLatency);
        assert_eq!(ctrl.current_target(), 1);
    }

    #[test]
    fn test_normal_mode_grows_toward_max_under_high_jitter() {
        let mut ctrl = BufferSizeController::new();
        let mut previous = ctrl.current_target();
        for i in 0..10 {
            ctrl.maybe_adapt(i * 1000, 120.0, LatencyMode::Normal);
            let target = ctrl.current_target();
            assert!(target >= previous);
            assert!((1..=5).contains(&target));
            previous = target;
        }
        assert_eq!(ctrl.current_target(), 5);
        assert_eq!(ctrl.quality(), NetworkQuality::Poor);
    }

    #[test]
    fn test_normal_mode_shrinks_toward_min_under_low_jitter() {
        let mut ctrl = BufferSizeController::new();
        for i in 0..5 {
            ctrl.maybe_adapt(i * 1000, 120.0, LatencyMode::Normal);
        }
        assert_eq!(ctrl.current_target(), 5);

        let mut previous = ctrl.current_target();
        for i in 5..15 {
            ctrl.maybe_adapt(i * 1000, 5.0, LatencyMode::Normal);
            let target = ctrl.current_target();
            assert!(target <= previous);
            assert!((1..=5).contains(&target));
            previous = target;
        }
        assert_eq!(ctrl.current_target(), 1);
        assert_eq!(ctrl.quality(), NetworkQuality::Good);
    }

    #[test]
    fn test_normal_mode_mid_jitter_leaves_target_alone() {
        let mut ctrl = BufferSizeController::new();
        for i in 0..3 {
            ctrl.maybe_adapt(i * 1000, 120.0, LatencyMode::Normal);
        }
        let target = ctrl.current_target();

        ctrl.maybe_adapt(10_000, 35.0, LatencyMode::Normal);
        assert_eq!(ctrl.current_target(), target);
        assert_eq!(ctrl.quality(), NetworkQuality::Medium);
    }

    #[test]
    fn test_toggle_resets_throttle() {
        let mut ctrl = BufferSizeController::new();
        assert!(ctrl.maybe_adapt(0, 100.0, LatencyMode::Normal));
        assert!(!ctrl.maybe_adapt(500, 100.0, LatencyMode::Normal));

        // The mode toggle path clears the timer, making the next call eligible.
        ctrl.reset_adaptation_timer();
        assert!(ctrl.maybe_adapt(500, 100.0, LatencyMode::LowLatency));
    }

    #[test]
    fn test_steady_cadence_scenario() {
        // Arrivals every 100 ms, zero jitter, normal mode: target trends to 1.
        let mut ctrl = BufferSizeController::new();
        for i in 0..4 {
            ctrl.maybe_adapt(i * 1000, 100.0, LatencyMode::Normal);
        }
        assert!(ctrl.current_target() > 1);

        for i in 4..12 {
            ctrl.maybe_adapt(i * 1000, 0.0, LatencyMode::Normal);
        }
        assert_eq!(ctrl.current_target(), 1);
        assert_eq!(ctrl.quality(), NetworkQuality::Good);
    }
}
