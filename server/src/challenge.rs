//! Anti-spoofing challenges.
//!
//! A client asks for a challenge with `getchallenge`, then echoes the number
//! back in `connect`. Only a peer that can receive at its claimed address
//! learns the number.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::address::NetAddress;
use crate::config::{ChallengeConfig, ChallengeEviction};

/// A challenge issued to one address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Challenge {
    pub address: NetAddress,
    pub value: u32,
    pub issued_at: f64,
}

/// Result of checking a challenge number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeCheck {
    /// Loopback never needs a challenge.
    Bypass,
    Valid,
    /// The address has a challenge but the number differs.
    Mismatch,
    /// The address was never issued a challenge, or it was evicted.
    Missing,
}

impl ChallengeCheck {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Bypass | Self::Valid)
    }
}

/// Fixed-capacity table of outstanding challenges keyed by base address.
#[derive(Debug, Clone)]
pub struct ChallengeRegistry {
    slots: Vec<Option<Challenge>>,
    eviction: ChallengeEviction,
    next_victim: usize,
    rng: StdRng,
}

impl ChallengeRegistry {
    /// Creates a registry seeded from system entropy.
    #[must_use]
    pub fn new(config: &ChallengeConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates a registry with a fixed seed, for reproducible tests.
    #[must_use]
    pub fn with_seed(config: &ChallengeConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &ChallengeConfig, rng: StdRng) -> Self {
        Self {
            slots: vec![None; config.capacity.max(1)],
            eviction: config.eviction,
            next_victim: 0,
            rng,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of outstanding challenges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the challenge for `address`, issuing one if needed.
    ///
    /// An address that already holds a challenge gets the same number back.
    pub fn issue(&mut self, address: &NetAddress, now: f64) -> u32 {
        if let Some(existing) = self.find(address) {
            return existing.value;
        }

        let index = self.victim();
        let value = (self.rng.gen_range(0..=0x7fff_u32) << 16) | self.rng.gen_range(0..=0xffff_u32);
        self.slots[index] = Some(Challenge {
            address: *address,
            value,
            issued_at: now,
        });
        value
    }

    /// Checks the number a client echoed back.
    #[must_use]
    pub fn check(&self, address: &NetAddress, value: u32) -> ChallengeCheck {
        if address.is_loopback() {
            return ChallengeCheck::Bypass;
        }
        match self.find(address) {
            Some(challenge) if challenge.value == value => ChallengeCheck::Valid,
            Some(_) => ChallengeCheck::Mismatch,
            None => ChallengeCheck::Missing,
        }
    }

    /// Returns the outstanding challenge for an address.
    #[must_use]
    pub fn find(&self, address: &NetAddress) -> Option<&Challenge> {
        self.slots
            .iter()
            .flatten()
            .find(|challenge| challenge.address.same_base(address))
    }

    fn victim(&mut self) -> usize {
        match self.eviction {
            ChallengeEviction::Oldest => {
                if let Some(free) = self.slots.iter().position(Option::is_none) {
                    return free;
                }
                let mut oldest = 0;
                let mut oldest_time = f64::INFINITY;
                for (i, challenge) in self.slots.iter().enumerate() {
                    if let Some(challenge) = challenge {
                        if challenge.issued_at < oldest_time {
                            oldest = i;
                            oldest_time = challenge.issued_at;
                        }
                    }
                }
                oldest
            }
            ChallengeEviction::RoundRobin => {
                let index = self.next_victim;
                self.next_victim = (self.next_victim + 1) % self.slots.len();
                index
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize, eviction: ChallengeEviction) -> ChallengeRegistry {
        ChallengeRegistry::with_seed(&ChallengeConfig { capacity, eviction }, 7)
    }

    fn addr(last: u8) -> NetAddress {
        NetAddress::ip([192, 0, 2, last], 27005)
    }

    #[test]
    fn same_address_gets_same_challenge() {
        let mut reg = registry(4, ChallengeEviction::Oldest);
        let first = reg.issue(&addr(1), 1.0);
        let second = reg.issue(&addr(1), 2.0);
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn port_is_ignored() {
        let mut reg = registry(4, ChallengeEviction::Oldest);
        let value = reg.issue(&addr(1), 1.0);
        let other_port = NetAddress::ip([192, 0, 2, 1], 40000);
        assert_eq!(reg.check(&other_port, value), ChallengeCheck::Valid);
    }

    #[test]
    fn values_fit_in_31_bits() {
        let mut reg = registry(64, ChallengeEviction::Oldest);
        for i in 0..64 {
            let value = reg.issue(&addr(i), f64::from(i));
            assert!(value <= 0x7fff_ffff);
        }
    }

    #[test]
    fn check_outcomes() {
        let mut reg = registry(4, ChallengeEviction::Oldest);
        let value = reg.issue(&addr(1), 1.0);
        assert_eq!(reg.check(&addr(1), value), ChallengeCheck::Valid);
        assert_eq!(reg.check(&addr(1), value ^ 1), ChallengeCheck::Mismatch);
        assert_eq!(reg.check(&addr(2), value), ChallengeCheck::Missing);
        assert_eq!(reg.check(&NetAddress::Loopback, 0), ChallengeCheck::Bypass);
        assert!(!ChallengeCheck::Missing.is_ok());
        assert!(ChallengeCheck::Bypass.is_ok());
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let mut reg = registry(2, ChallengeEviction::Oldest);
        reg.issue(&addr(1), 5.0);
        reg.issue(&addr(2), 1.0);
        reg.issue(&addr(3), 9.0);
        assert!(reg.find(&addr(2)).is_none());
        assert!(reg.find(&addr(1)).is_some());
        assert!(reg.find(&addr(3)).is_some());
    }

    #[test]
    fn round_robin_cycles_slots() {
        let mut reg = registry(2, ChallengeEviction::RoundRobin);
        reg.issue(&addr(1), 5.0);
        reg.issue(&addr(2), 1.0);
        reg.issue(&addr(3), 9.0);
        assert!(reg.find(&addr(1)).is_none());
        assert!(reg.find(&addr(2)).is_some());
        reg.issue(&addr(4), 10.0);
        assert!(reg.find(&addr(2)).is_none());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn evicted_challenge_is_reissued_fresh() {
        let mut reg = registry(1, ChallengeEviction::Oldest);
        let first = reg.issue(&addr(1), 1.0);
        reg.issue(&addr(2), 2.0);
        assert_eq!(reg.check(&addr(1), first), ChallengeCheck::Missing);
    }
}
