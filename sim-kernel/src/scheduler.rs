// Tick timing policy: speed control, drift-free delay computation and
// slow-tick detection. Pure so tests never sleep; the blocking driver loop in
// the kernel sits on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Simulation speed multiplier. `Paused` stops the clock entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speed {
    Paused,
    X1,
    X2,
    X4,
}

impl Speed {
    pub fn factor(self) -> u32 {
        match self {
            Speed::Paused => 0,
            Speed::X1 => 1,
            Speed::X2 => 2,
            Speed::X4 => 4,
        }
    }

    pub fn from_factor(factor: u32) -> Option<Speed> {
        match factor {
            0 => Some(Speed::Paused),
            1 => Some(Speed::X1),
            2 => Some(Speed::X2),
            4 => Some(Speed::X4),
            _ => None,
        }
    }
}

/// Wall-clock floor below which a long tick is never flagged slow.
const SLOW_TICK_FLOOR_MS: u64 = 100;
/// A tick is slow when it exceeds its target by this ratio.
const SLOW_TICK_RATIO: f64 = 1.5;

/// Computes when the next tick should start. Scheduling is dynamic: the
/// just-finished tick's duration is subtracted from the period so long ticks
/// do not accumulate drift.
#[derive(Debug, Clone, Copy)]
pub struct TickTimer {
    base_period: Duration,
    speed: Speed,
}

impl TickTimer {
    pub fn new(base_tick_ms: u64) -> Self {
        Self {
            base_period: Duration::from_millis(base_tick_ms),
            speed: Speed::X1,
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    pub fn is_paused(&self) -> bool {
        self.speed == Speed::Paused
    }

    /// Target wall-clock period per tick at the current speed.
    pub fn target(&self) -> Option<Duration> {
        let factor = self.speed.factor();
        if factor == 0 {
            None
        } else {
            Some(self.base_period / factor)
        }
    }

    /// Delay before the next tick, given the finished tick's duration:
    /// `max(1 ms, period − elapsed)`. `None` while paused.
    pub fn next_delay(&self, elapsed: Duration) -> Option<Duration> {
        let target = self.target()?;
        Some(target.saturating_sub(elapsed).max(Duration::from_millis(1)))
    }

    /// A tick is slow when it exceeds 1.5× its target AND the 100 ms floor.
    /// Observability only; never changes policy.
    pub fn is_slow(&self, elapsed: Duration) -> bool {
        let Some(target) = self.target() else {
            return false;
        };
        elapsed.as_millis() as u64 > SLOW_TICK_FLOOR_MS
            && elapsed.as_secs_f64() > target.as_secs_f64() * SLOW_TICK_RATIO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_factors_round_trip() {
        for speed in [Speed::Paused, Speed::X1, Speed::X2, Speed::X4] {
            assert_eq!(Speed::from_factor(speed.factor()), Some(speed));
        }
        assert_eq!(Speed::from_factor(3), None);
    }

    #[test]
    fn paused_timer_never_schedules() {
        let mut timer = TickTimer::new(200);
        timer.set_speed(Speed::Paused);
        assert_eq!(timer.target(), None);
        assert_eq!(timer.next_delay(Duration::from_millis(10)), None);
        assert!(!timer.is_slow(Duration::from_secs(10)));
    }

    #[test]
    fn delay_subtracts_elapsed_time() {
        let timer = TickTimer::new(200);
        assert_eq!(
            timer.next_delay(Duration::from_millis(50)),
            Some(Duration::from_millis(150))
        );
        // overlong tick: clamp to the 1 ms minimum, never negative
        assert_eq!(
            timer.next_delay(Duration::from_millis(500)),
            Some(Duration::from_millis(1))
        );
    }

    #[test]
    fn speed_divides_the_period() {
        let mut timer = TickTimer::new(200);
        timer.set_speed(Speed::X4);
        assert_eq!(timer.target(), Some(Duration::from_millis(50)));
        assert_eq!(
            timer.next_delay(Duration::from_millis(10)),
            Some(Duration::from_millis(40))
        );
    }

    #[test]
    fn slow_tick_needs_both_ratio_and_floor() {
        let timer = TickTimer::new(200);
        // 1.5x of 200 ms = 300 ms; above both thresholds
        assert!(timer.is_slow(Duration::from_millis(350)));
        // above the ratio at 4x speed (target 50 ms) but below the 100 ms floor
        let mut fast = TickTimer::new(200);
        fast.set_speed(Speed::X4);
        assert!(!fast.is_slow(Duration::from_millis(90)));
        assert!(fast.is_slow(Duration::from_millis(120)));
        // long but within ratio
        assert!(!timer.is_slow(Duration::from_millis(250)));
    }
}
