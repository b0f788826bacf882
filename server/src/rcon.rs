//! Remote console password checks and brute-force tracking.

use std::collections::VecDeque;

use tracing::warn;
use wire::CommandLine;

use crate::address::NetAddress;
use crate::challenge::{ChallengeCheck, ChallengeRegistry};
use crate::config::RconConfig;

/// Addresses tracked for failed password attempts.
pub const MAX_TRACKED_ADDRESSES: usize = 32;

/// Outcome of validating an `rcon` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconVerdict {
    Valid,
    /// Missing or wrong password.
    Invalid,
    /// The challenge number did not check out.
    BadChallenge(ChallengeCheck),
    /// The address was flagged for password guessing.
    Ban,
}

#[derive(Debug, Clone)]
struct FailureRecord {
    address: NetAddress,
    failures: VecDeque<f64>,
    last_update: f64,
    should_reject: bool,
}

impl FailureRecord {
    fn new(address: NetAddress) -> Self {
        Self {
            address,
            failures: VecDeque::new(),
            last_update: 0.0,
            should_reject: false,
        }
    }
}

/// Validates rcon attempts and flags addresses that keep guessing.
#[derive(Debug, Clone)]
pub struct RconGuard {
    config: RconConfig,
    records: Vec<FailureRecord>,
}

impl RconGuard {
    #[must_use]
    pub fn new(config: &RconConfig) -> Self {
        Self {
            config: config.normalized(),
            records: Vec::new(),
        }
    }

    /// Whether an rcon password is configured.
    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.config.password.is_empty()
    }

    /// Ban length for flagged addresses, in minutes.
    #[must_use]
    pub fn ban_penalty(&self) -> f32 {
        self.config.ban_penalty_minutes
    }

    /// Whether the address has been flagged for password guessing.
    #[must_use]
    pub fn is_flagged(&self, address: &NetAddress) -> bool {
        self.records
            .iter()
            .any(|record| record.address == *address && record.should_reject)
    }

    /// Forgets every tracked address.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Records one failed attempt; returns `true` once the address is flagged.
    pub fn record_failure(&mut self, address: &NetAddress, now: f64) -> bool {
        let index = self.record_index(address, now);
        let min_failures = self.config.min_failures as usize;
        let max_failures = self.config.max_failures as usize;
        let window = f64::from(self.config.min_failure_time);

        let record = &mut self.records[index];
        if record.should_reject {
            return true;
        }

        record.last_update = now;
        while record.failures.len() >= max_failures {
            record.failures.pop_front();
        }
        record.failures.push_back(now);

        let recent = record
            .failures
            .iter()
            .filter(|&&at| now - at <= window)
            .count();
        if recent >= min_failures {
            warn!(address = %address, "User {address} will be banned for rcon hacking");
            record.should_reject = true;
        }
        record.should_reject
    }

    /// Finds the record for `address`, making room for a new one if needed.
    fn record_index(&mut self, address: &NetAddress, now: f64) -> usize {
        if let Some(index) = self.records.iter().position(|r| r.address == *address) {
            return index;
        }
        if self.records.len() < MAX_TRACKED_ADDRESSES {
            self.records.push(FailureRecord::new(*address));
            return self.records.len() - 1;
        }

        let mut stalest = 0;
        let mut longest = f64::NEG_INFINITY;
        for (i, record) in self.records.iter().enumerate() {
            let idle = now - record.last_update;
            if idle >= longest {
                stalest = i;
                longest = idle;
            }
        }
        self.records[stalest] = FailureRecord::new(*address);
        stalest
    }

    /// Checks an `rcon <challenge> <password> <command...>` line.
    ///
    /// Order: shape and password presence, flagged address, challenge,
    /// password. Only a wrong password counts as a failure.
    pub fn validate(
        &mut self,
        command: &CommandLine,
        address: &NetAddress,
        challenges: &ChallengeRegistry,
        now: f64,
    ) -> RconVerdict {
        if command.argc() < 3 || !self.has_password() {
            return RconVerdict::Invalid;
        }
        if self.is_flagged(address) {
            return RconVerdict::Ban;
        }

        let challenge = command.argv(1).parse::<u32>().unwrap_or(0);
        let check = challenges.check(address, challenge);
        if !check.is_ok() {
            return RconVerdict::BadChallenge(check);
        }

        if command.argv(2) != self.config.password {
            self.record_failure(address, now);
            return RconVerdict::Invalid;
        }
        RconVerdict::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChallengeConfig;

    fn guard() -> RconGuard {
        RconGuard::new(&RconConfig {
            password: "letmein".to_string(),
            min_failures: 3,
            max_failures: 5,
            min_failure_time: 10.0,
            ban_penalty_minutes: 0.0,
        })
    }

    fn addr(last: u8) -> NetAddress {
        NetAddress::ip([198, 51, 100, last], 27005)
    }

    fn line(text: &str) -> CommandLine {
        CommandLine::parse(text, &wire::Limits::default())
    }

    #[test]
    fn failures_in_window_flag_address() {
        let mut guard = guard();
        assert!(!guard.record_failure(&addr(1), 0.0));
        assert!(!guard.record_failure(&addr(1), 1.0));
        assert!(guard.record_failure(&addr(1), 2.0));
        assert!(guard.is_flagged(&addr(1)));
        assert!(!guard.is_flagged(&addr(2)));
    }

    #[test]
    fn slow_failures_are_tolerated() {
        let mut guard = guard();
        for i in 0..10 {
            assert!(!guard.record_failure(&addr(1), f64::from(i) * 20.0));
        }
    }

    #[test]
    fn stalest_record_is_replaced_when_full() {
        let mut guard = guard();
        for i in 0..MAX_TRACKED_ADDRESSES as u8 {
            guard.record_failure(&addr(i), 100.0 + f64::from(i));
        }
        guard.record_failure(&addr(200), 500.0);
        assert_eq!(guard.records.len(), MAX_TRACKED_ADDRESSES);
        assert!(guard.records.iter().all(|r| r.address != addr(0)));
        assert!(guard.records.iter().any(|r| r.address == addr(200)));
    }

    #[test]
    fn validate_order() {
        let mut guard = guard();
        let mut challenges = ChallengeRegistry::with_seed(&ChallengeConfig::default(), 3);
        let client = addr(9);

        assert_eq!(
            guard.validate(&line("rcon 1"), &client, &challenges, 0.0),
            RconVerdict::Invalid
        );
        assert_eq!(
            guard.validate(&line("rcon 1 letmein status"), &client, &challenges, 0.0),
            RconVerdict::BadChallenge(ChallengeCheck::Missing)
        );

        let value = challenges.issue(&client, 0.0);
        let good = format!("rcon {value} letmein status");
        assert_eq!(
            guard.validate(&line(&good), &client, &challenges, 0.0),
            RconVerdict::Valid
        );

        let bad = format!("rcon {value} guess status");
        for t in 0..3 {
            assert_eq!(
                guard.validate(&line(&bad), &client, &challenges, f64::from(t)),
                RconVerdict::Invalid
            );
        }
        assert_eq!(
            guard.validate(&line(&good), &client, &challenges, 4.0),
            RconVerdict::Ban
        );
    }

    #[test]
    fn no_password_is_always_invalid() {
        let mut guard = RconGuard::new(&RconConfig::default());
        let challenges = ChallengeRegistry::with_seed(&ChallengeConfig::default(), 3);
        assert_eq!(
            guard.validate(
                &line("rcon 1 x status"),
                &NetAddress::Loopback,
                &challenges,
                0.0
            ),
            RconVerdict::Invalid
        );
    }

    #[test]
    fn reset_clears_flags() {
        let mut guard = guard();
        for t in 0..3 {
            guard.record_failure(&addr(1), f64::from(t));
        }
        guard.reset();
        assert!(!guard.is_flagged(&addr(1)));
    }
}
