//! Server configuration.
//!
//! Every tunable the core reads lives in [`ServerConfig`]. It deserializes
//! from JSON with missing fields taking their defaults, so a config file only
//! lists what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Hard cap on client slots; the ping table encodes slots in 5 bits.
pub const MAX_CLIENTS: usize = 32;

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Number of client slots.
    pub max_clients: usize,
    /// LAN mode: relaxed authentication, private addresses only.
    pub lan: bool,
    /// Join password; empty or `none` disables it.
    pub password: String,
    /// Shown to clients whose protocol is newer than the server's.
    pub admin_contact: String,
    /// Slots available to HLTV proxies.
    pub max_proxies: usize,
    /// `true`: filters ban matching addresses. `false`: only matching
    /// addresses may connect.
    pub filter_ban: bool,
    /// Seconds of silence before a client is dropped.
    pub timeout_secs: f64,
    /// Allow instance baselines in packet entities.
    pub instanced_baselines: bool,
    pub protocol_version: i32,
    pub build_number: i32,
    /// Advertised in challenge responses and accept packets.
    pub secure: bool,
    /// Frames kept per client; a power of two.
    pub update_backup: usize,
    pub challenges: ChallengeConfig,
    /// Connected but not fully connected clients allowed per address.
    pub max_half_open_per_address: usize,
    pub rate_limits: RateLimitConfig,
    pub rcon: RconConfig,
    /// Capacity of each ban list.
    pub max_filters: usize,
    /// Echo `log` packets from other servers into our log.
    pub log_relay: bool,
}

/// Challenge ring settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub capacity: usize,
    pub eviction: ChallengeEviction,
}

/// Which challenge is replaced when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeEviction {
    /// The entry with the oldest issue time.
    #[default]
    Oldest,
    /// The slot after the last replaced one.
    RoundRobin,
}

/// Flood control thresholds, in commands per second.
///
/// A burst limit of zero or less disables that limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub move_max_avg: f32,
    pub move_max_burst: f32,
    pub string_max_avg: f32,
    pub string_max_burst: f32,
    /// Length of the address ban applied on a breach.
    pub flood_ban_minutes: f32,
}

/// Remote console settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    /// Empty disables rcon.
    pub password: String,
    /// Failures within `min_failure_time` that get an address banned.
    pub min_failures: i32,
    /// Failure times remembered per address.
    pub max_failures: i32,
    /// Window in seconds for counting failures.
    pub min_failure_time: f32,
    /// Ban length for flagged addresses; 0 is permanent.
    pub ban_penalty_minutes: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: MAX_CLIENTS,
            lan: false,
            password: String::new(),
            admin_contact: String::new(),
            max_proxies: 1,
            filter_ban: true,
            timeout_secs: 65.0,
            instanced_baselines: true,
            protocol_version: wire::PROTOCOL_VERSION,
            build_number: 8684,
            secure: false,
            update_backup: wire::UPDATE_BACKUP,
            challenges: ChallengeConfig::default(),
            max_half_open_per_address: 5,
            rate_limits: RateLimitConfig::default(),
            rcon: RconConfig::default(),
            max_filters: 32768,
            log_relay: false,
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            eviction: ChallengeEviction::Oldest,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            move_max_avg: 750.0,
            move_max_burst: 3500.0,
            string_max_avg: 32.0,
            string_max_burst: 80.0,
            flood_ban_minutes: 5.0,
        }
    }
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            min_failures: 5,
            max_failures: 10,
            min_failure_time: 30.0,
            ban_penalty_minutes: 0.0,
        }
    }
}

impl RconConfig {
    /// Returns the settings clamped to usable ranges.
    ///
    /// Failure counts go into `1..=20` with `max >= min` (swapping if
    /// needed), the window is at least one second and a negative penalty
    /// becomes permanent.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut min = self.min_failures.clamp(1, 20);
        let mut max = self.max_failures.clamp(1, 20);
        if max < min {
            std::mem::swap(&mut min, &mut max);
        }
        Self {
            password: self.password.clone(),
            min_failures: min,
            max_failures: max,
            min_failure_time: self.min_failure_time.max(1.0),
            ban_penalty_minutes: self.ban_penalty_minutes.max(0.0),
        }
    }
}

impl ServerConfig {
    /// Small tables and short timeouts for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_clients: 4,
            max_proxies: 1,
            timeout_secs: 10.0,
            update_backup: 8,
            challenges: ChallengeConfig {
                capacity: 4,
                eviction: ChallengeEviction::Oldest,
            },
            max_half_open_per_address: 2,
            max_filters: 8,
            ..Self::default()
        }
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> ServerResult<()> {
        let invalid = |field: &'static str, reason: String| {
            Err(ServerError::InvalidConfig { field, reason })
        };

        if self.max_clients == 0 || self.max_clients > MAX_CLIENTS {
            return invalid(
                "max_clients",
                format!("{} not in 1..={MAX_CLIENTS}", self.max_clients),
            );
        }
        if !self.update_backup.is_power_of_two() || !(2..=256).contains(&self.update_backup) {
            return invalid(
                "update_backup",
                format!("{} is not a power of two in 2..=256", self.update_backup),
            );
        }
        if self.challenges.capacity == 0 {
            return invalid("challenges.capacity", "must be at least 1".to_string());
        }
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return invalid("timeout_secs", format!("{} is not positive", self.timeout_secs));
        }
        if self.max_filters == 0 {
            return invalid("max_filters", "must be at least 1".to_string());
        }
        let limits = &self.rate_limits;
        for (field, value) in [
            ("rate_limits.move_max_avg", limits.move_max_avg),
            ("rate_limits.move_max_burst", limits.move_max_burst),
            ("rate_limits.string_max_avg", limits.string_max_avg),
            ("rate_limits.string_max_burst", limits.string_max_burst),
            ("rate_limits.flood_ban_minutes", limits.flood_ban_minutes),
        ] {
            if !value.is_finite() {
                return invalid(field, format!("{value} is not finite"));
            }
        }
        Ok(())
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(text: &str) -> ServerResult<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| ServerError::ConfigParse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ServerError::ConfigRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Whether a join password is set.
    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.is_empty() && !self.password.eq_ignore_ascii_case("none")
    }
}
