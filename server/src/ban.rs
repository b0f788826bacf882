//! IP and user id ban lists.
//!
//! Both lists keep insertion order. Lookups walk from the newest entry to the
//! oldest and drop expired entries as they pass them, so there is no separate
//! sweep.

use std::fmt;

use tracing::{info, warn};

use crate::address::NetAddress;
use crate::error::{FilterKind, ServerError, ServerResult};
use crate::userid::NetworkUserId;

/// Ban lengths below this many minutes are permanent.
const MIN_BAN_MINUTES: f32 = 0.01;

/// An address pattern: zero octets in the filter text are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpFilter {
    mask: [u8; 4],
    compare: [u8; 4],
}

impl IpFilter {
    /// Parses up to four dotted numbers; `192.168` covers `192.168.*.*`.
    pub fn parse(text: &str) -> ServerResult<Self> {
        let invalid = || ServerError::InvalidFilter {
            text: text.to_string(),
        };

        let mut mask = [0u8; 4];
        let mut compare = [0u8; 4];
        for (i, part) in text.split('.').enumerate() {
            if i >= 4 {
                break;
            }
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let octet: u8 = part.parse().map_err(|_| invalid())?;
            compare[i] = octet;
            if octet != 0 {
                mask[i] = 0xFF;
            }
        }
        Ok(Self { mask, compare })
    }

    #[must_use]
    pub const fn compare(&self) -> [u8; 4] {
        self.compare
    }

    #[must_use]
    pub const fn mask(&self) -> [u8; 4] {
        self.mask
    }

    /// `255.255.255.255` filters never expire.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.compare == [0xFF; 4]
    }

    #[must_use]
    pub fn matches(&self, ip: [u8; 4]) -> bool {
        (u32::from_be_bytes(ip) & u32::from_be_bytes(self.mask)) == u32::from_be_bytes(self.compare)
    }
}

impl fmt::Display for IpFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.compare;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

/// Length and expiry of one ban.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BanTime {
    minutes: f32,
    /// Server time the ban ends; 0 is permanent.
    ends_at: f64,
}

impl BanTime {
    fn new(minutes: f32, now: f64) -> Self {
        let minutes = if minutes < MIN_BAN_MINUTES { 0.0 } else { minutes };
        let ends_at = if minutes == 0.0 {
            0.0
        } else {
            f64::from(minutes).mul_add(60.0, now)
        };
        Self { minutes, ends_at }
    }

    fn is_permanent(self) -> bool {
        self.minutes == 0.0
    }

    fn is_live(self, now: f64) -> bool {
        self.ends_at == 0.0 || self.ends_at > now
    }

    fn describe(self) -> String {
        if self.is_permanent() {
            "permanent".to_string()
        } else {
            format!("{:.3} min", self.minutes)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct IpBan {
    filter: IpFilter,
    time: BanTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct UserBan {
    id: NetworkUserId,
    time: BanTime,
}

/// Address and user bans with lazy expiry.
#[derive(Debug, Clone)]
pub struct BanRegistry {
    ips: Vec<IpBan>,
    users: Vec<UserBan>,
    max_filters: usize,
    filter_ban: bool,
    lan: bool,
}

impl BanRegistry {
    /// Creates empty lists.
    ///
    /// With `filter_ban` unset the lists work as allow lists.
    #[must_use]
    pub fn new(max_filters: usize, filter_ban: bool, lan: bool) -> Self {
        Self {
            ips: Vec::new(),
            users: Vec::new(),
            max_filters,
            filter_ban,
            lan,
        }
    }

    #[must_use]
    pub fn ip_count(&self) -> usize {
        self.ips.len()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Bans an address pattern for `minutes` (0 = permanent).
    ///
    /// Re-adding an existing pattern only updates its time. Returns the
    /// filter so the caller can kick matching clients.
    pub fn add_ip(&mut self, minutes: f32, text: &str, now: f64) -> ServerResult<IpFilter> {
        let filter = IpFilter::parse(text)?;
        let time = BanTime::new(minutes, now);

        if let Some(existing) = self.ips.iter_mut().find(|ban| ban.filter == filter) {
            existing.time = time;
            info!(filter = %filter, ban = %time.describe(), "IP filter updated");
            return Ok(filter);
        }
        if self.ips.len() >= self.max_filters {
            warn!(max = self.max_filters, "IP filter list is full");
            return Err(ServerError::FilterListFull {
                kind: FilterKind::Ip,
                max: self.max_filters,
            });
        }
        self.ips.push(IpBan { filter, time });
        info!(filter = %filter, ban = %time.describe(), "IP filter added");
        Ok(filter)
    }

    /// Removes the filter with exactly this pattern.
    pub fn remove_ip(&mut self, text: &str) -> ServerResult<IpFilter> {
        let filter = IpFilter::parse(text)?;
        let Some(index) = self.ips.iter().position(|ban| ban.filter == filter) else {
            return Err(ServerError::FilterNotFound {
                kind: FilterKind::Ip,
                selector: text.to_string(),
            });
        };
        self.ips.remove(index);
        info!(filter = %filter, "IP filter removed");
        Ok(filter)
    }

    /// One line per filter, as `listip` prints them.
    #[must_use]
    pub fn list_ip(&self) -> Vec<String> {
        self.ips
            .iter()
            .map(|ban| {
                let [a, b, c, d] = ban.filter.compare;
                format!("{a:3}.{b:3}.{c:3}.{d:3} : {}", ban.time.describe())
            })
            .collect()
    }

    /// Permanent address bans as `addip` lines.
    #[must_use]
    pub fn write_ip(&self) -> String {
        self.ips
            .iter()
            .filter(|ban| ban.time.is_permanent())
            .map(|ban| format!("addip 0.0 {}\n", ban.filter))
            .collect()
    }

    /// Bans a user id for `minutes` (0 = permanent).
    pub fn ban_id(&mut self, minutes: f32, id: NetworkUserId, now: f64) -> ServerResult<()> {
        let time = BanTime::new(minutes, now);
        let lan = self.lan;
        if let Some(existing) = self.users.iter_mut().find(|ban| ban.id.matches(&id, lan)) {
            existing.id = id;
            existing.time = time;
        } else {
            if self.users.len() >= self.max_filters {
                warn!(max = self.max_filters, "User filter list is full");
                return Err(ServerError::FilterListFull {
                    kind: FilterKind::User,
                    max: self.max_filters,
                });
            }
            self.users.push(UserBan { id, time });
        }
        info!(id = %id.id_string(lan), ban = %time.describe(), "UserID filter added");
        Ok(())
    }

    /// Removes a user ban by `#n` (1-based list position) or by id string.
    pub fn remove_id(&mut self, selector: &str) -> ServerResult<NetworkUserId> {
        let not_found = || ServerError::FilterNotFound {
            kind: FilterKind::User,
            selector: selector.to_string(),
        };

        let index = if let Some(position) = selector.strip_prefix('#') {
            let n: usize = position.parse().map_err(|_| not_found())?;
            if n == 0 || n > self.users.len() {
                return Err(not_found());
            }
            n - 1
        } else {
            let lan = self.lan;
            self.users
                .iter()
                .position(|ban| ban.id.id_string(lan).eq_ignore_ascii_case(selector))
                .ok_or_else(not_found)?
        };

        let removed = self.users.remove(index).id;
        info!(id = %removed.id_string(self.lan), "UserID filter removed");
        Ok(removed)
    }

    /// One line per user ban, as `listid` prints them.
    #[must_use]
    pub fn list_id(&self) -> Vec<String> {
        self.users
            .iter()
            .enumerate()
            .map(|(i, ban)| {
                format!("{i} {} : {}", ban.id.id_string(self.lan), ban.time.describe())
            })
            .collect()
    }

    /// Permanent user bans as `banid` lines.
    #[must_use]
    pub fn write_id(&self) -> String {
        self.users
            .iter()
            .filter(|ban| ban.time.is_permanent())
            .map(|ban| format!("banid 0.0 {}\n", ban.id.id_string(self.lan)))
            .collect()
    }

    /// Returns `true` if traffic from `address` must be refused.
    ///
    /// A matching filter answers with the filter mode; no match answers with
    /// its opposite.
    pub fn filter_packet(&mut self, address: &NetAddress, now: f64) -> bool {
        let ip = address.octets();
        let mut i = self.ips.len();
        while i > 0 {
            i -= 1;
            let ban = self.ips[i];
            if ban.filter.is_broadcast() || ban.time.is_live(now) {
                if ban.filter.matches(ip) {
                    return self.filter_ban;
                }
            } else {
                self.ips.remove(i);
            }
        }
        !self.filter_ban
    }

    /// Returns `true` if the user id must be refused.
    pub fn filter_user(&mut self, id: &NetworkUserId, now: f64) -> bool {
        let mut i = self.users.len();
        while i > 0 {
            i -= 1;
            let ban = self.users[i];
            if ban.time.is_live(now) {
                if ban.id.matches(id, self.lan) {
                    return self.filter_ban;
                }
            } else {
                self.users.remove(i);
            }
        }
        !self.filter_ban
    }

    /// Replays persisted `addip` / `banid` lines; returns how many applied.
    ///
    /// Blank lines and `//` comments are skipped; unknown or malformed lines
    /// are logged and skipped.
    pub fn load(&mut self, text: &str, now: f64) -> usize {
        let mut applied = 0;
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let command = tokens.next().unwrap_or_default();
            let minutes = tokens.next().and_then(|m| m.parse::<f32>().ok());
            let target = tokens.next();

            let result = match (command, minutes, target) {
                ("addip", Some(minutes), Some(ip)) => self.add_ip(minutes, ip, now).map(|_| ()),
                ("banid", Some(minutes), Some(id)) => NetworkUserId::parse(id)
                    .ok_or_else(|| ServerError::InvalidUserId {
                        text: id.to_string(),
                    })
                    .and_then(|id| self.ban_id(minutes, id, now)),
                _ => {
                    warn!(line = number + 1, text = line, "Unknown ban list command");
                    continue;
                }
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => warn!(line = number + 1, error = %err, "Skipping ban list entry"),
            }
        }
        applied
    }
}
