//! Per-client command flood protection.
//!
//! Each limiter counts commands per slot. A burst check runs on every
//! [`CommandRateLimiter::issued`] call against the time since the last decay;
//! the decaying average is checked in [`CommandRateLimiter::decay`], which the
//! server runs once per frame.

use crate::config::RateLimitConfig;

/// Shortest interval the burst rate is measured over, in seconds.
const MIN_BURST_INTERVAL: f64 = 0.2;

/// Decay runs at most this often, in seconds.
const DECAY_INTERVAL: f64 = 0.5;

/// The kind of command being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    /// Movement commands.
    Move,
    /// Console string commands.
    String,
}

/// Which threshold was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateBreach {
    Burst,
    Average,
}

impl CommandClass {
    /// The drop reason shown to a client removed for flooding.
    #[must_use]
    pub const fn drop_reason(self, breach: RateBreach) -> &'static str {
        match (self, breach) {
            (Self::Move, RateBreach::Burst) => "Banned for move commands flooding (burst)",
            (Self::Move, RateBreach::Average) => "Banned for move commands flooding (Avg)",
            (Self::String, RateBreach::Burst) => "Banned for string commands flooding (burst)",
            (Self::String, RateBreach::Average) => "Banned for string commands flooding (Avg)",
        }
    }
}

/// Thresholds for one limiter, in commands per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub max_avg: f32,
    pub max_burst: f32,
}

/// Counts one class of commands for every slot.
#[derive(Debug, Clone)]
pub struct CommandRateLimiter {
    limit: RateLimit,
    current: Vec<u32>,
    average: Vec<f64>,
    last_check: f64,
}

impl CommandRateLimiter {
    #[must_use]
    pub fn new(limit: RateLimit, slots: usize) -> Self {
        Self {
            limit,
            current: vec![0; slots],
            average: vec![0.0; slots],
            last_check: 0.0,
        }
    }

    /// Commands counted for `slot` since the last decay.
    #[must_use]
    pub fn current(&self, slot: usize) -> u32 {
        self.current.get(slot).copied().unwrap_or(0)
    }

    /// Decayed average rate for `slot`.
    #[must_use]
    pub fn average(&self, slot: usize) -> f64 {
        self.average.get(slot).copied().unwrap_or(0.0)
    }

    /// Adds `count` commands for `slot`; returns `true` on a burst breach.
    ///
    /// `active` is whether the client is in game; others are counted but
    /// never checked.
    pub fn issued(&mut self, slot: usize, count: u32, active: bool, now: f64) -> bool {
        let Some(current) = self.current.get_mut(slot) else {
            return false;
        };
        *current = current.saturating_add(count);

        if !active || self.limit.max_burst <= 0.0 {
            return false;
        }
        let dt = (now - self.last_check).max(MIN_BURST_INTERVAL);
        f64::from(*current) / dt > f64::from(self.limit.max_burst)
    }

    /// Folds the current counts into the averages.
    ///
    /// Does nothing until [`DECAY_INTERVAL`] has passed since the last decay.
    /// Returns the active slots whose average now exceeds the limit;
    /// `active(slot)` tells which slots to check.
    pub fn decay(&mut self, now: f64, active: impl Fn(usize) -> bool) -> Vec<usize> {
        let dt = now - self.last_check;
        if dt < DECAY_INTERVAL {
            return Vec::new();
        }
        self.last_check = now;

        let mut breached = Vec::new();
        for (slot, (current, average)) in self
            .current
            .iter_mut()
            .zip(self.average.iter_mut())
            .enumerate()
        {
            *average = 2.0 * *average / 3.0 + f64::from(*current) / dt / 3.0;
            *current = 0;
            if active(slot) && self.limit.max_avg > 0.0 && *average > f64::from(self.limit.max_avg) {
                breached.push(slot);
            }
        }
        breached
    }

    /// Clears the counters of one slot.
    pub fn reset_slot(&mut self, slot: usize) {
        if let Some(current) = self.current.get_mut(slot) {
            *current = 0;
        }
        if let Some(average) = self.average.get_mut(slot) {
            *average = 0.0;
        }
    }
}

/// The move and string command limiters together.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub moves: CommandRateLimiter,
    pub strings: CommandRateLimiter,
}

impl RateLimiters {
    #[must_use]
    pub fn new(config: &RateLimitConfig, slots: usize) -> Self {
        Self {
            moves: CommandRateLimiter::new(
                RateLimit {
                    max_avg: config.move_max_avg,
                    max_burst: config.move_max_burst,
                },
                slots,
            ),
            strings: CommandRateLimiter::new(
                RateLimit {
                    max_avg: config.string_max_avg,
                    max_burst: config.string_max_burst,
                },
                slots,
            ),
        }
    }

    /// Returns the limiter for a command class.
    pub fn for_class(&mut self, class: CommandClass) -> &mut CommandRateLimiter {
        match class {
            CommandClass::Move => &mut self.moves,
            CommandClass::String => &mut self.strings,
        }
    }

    /// Starts a new client in `slot` with clean counters.
    pub fn client_connected(&mut self, slot: usize) {
        self.moves.reset_slot(slot);
        self.strings.reset_slot(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_avg: f32, max_burst: f32) -> CommandRateLimiter {
        CommandRateLimiter::new(RateLimit { max_avg, max_burst }, 4)
    }

    #[test]
    fn burst_uses_minimum_interval() {
        let mut rl = limiter(100.0, 100.0);
        // 20 commands over at least 0.2s is exactly 100/s: allowed
        assert!(!rl.issued(0, 20, true, 0.0));
        assert!(rl.issued(0, 1, true, 0.0));
    }

    #[test]
    fn inactive_clients_are_not_checked() {
        let mut rl = limiter(100.0, 10.0);
        assert!(!rl.issued(1, 1000, false, 0.0));
        assert_eq!(rl.current(1), 1000);
    }

    #[test]
    fn zero_burst_disables_check() {
        let mut rl = limiter(100.0, 0.0);
        assert!(!rl.issued(0, 10_000, true, 0.0));
    }

    #[test]
    fn decay_waits_for_interval() {
        let mut rl = limiter(10.0, 1000.0);
        rl.issued(0, 100, true, 0.1);
        assert!(rl.decay(0.3, |_| true).is_empty());
        assert_eq!(rl.current(0), 100);
    }

    #[test]
    fn decay_folds_and_flags_average() {
        let mut rl = limiter(10.0, 1000.0);
        rl.issued(0, 60, true, 0.5);
        rl.issued(2, 3, true, 0.5);
        // dt = 1.0: avg = 60 / 3 = 20 > 10
        let breached = rl.decay(1.0, |_| true);
        assert_eq!(breached, vec![0]);
        assert!((rl.average(0) - 20.0).abs() < 1e-9);
        assert!((rl.average(2) - 1.0).abs() < 1e-9);
        assert_eq!(rl.current(0), 0);

        // quiet second: 2/3 * 20 = 13.3, still over
        assert_eq!(rl.decay(2.0, |_| true), vec![0]);
        // only active slots are reported
        assert!(rl.decay(3.0, |slot| slot != 0).is_empty());
    }

    #[test]
    fn reset_slot_clears_counters() {
        let mut rl = limiter(10.0, 1000.0);
        rl.issued(0, 60, true, 0.5);
        rl.decay(1.0, |_| true);
        rl.reset_slot(0);
        assert_eq!(rl.current(0), 0);
        assert!(rl.average(0).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_slot_is_ignored() {
        let mut rl = limiter(10.0, 1.0);
        assert!(!rl.issued(99, 1000, true, 0.0));
        assert_eq!(rl.current(99), 0);
    }

    #[test]
    fn drop_reasons() {
        assert_eq!(
            CommandClass::Move.drop_reason(RateBreach::Burst),
            "Banned for move commands flooding (burst)"
        );
        assert_eq!(
            CommandClass::String.drop_reason(RateBreach::Average),
            "Banned for string commands flooding (Avg)"
        );
    }

    #[test]
    fn limiters_reset_together() {
        let mut limiters = RateLimiters::new(&RateLimitConfig::default(), 2);
        limiters.for_class(CommandClass::Move).issued(1, 5, true, 0.0);
        limiters.for_class(CommandClass::String).issued(1, 5, true, 0.0);
        limiters.client_connected(1);
        assert_eq!(limiters.moves.current(1), 0);
        assert_eq!(limiters.strings.current(1), 0);
    }
}
