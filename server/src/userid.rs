//! Network user ids and their textual `STEAM_x:y:z` form.

use std::fmt;

/// Steam id of account 0 in the public universe; account ids are added to it.
pub const STEAM_ID_BASE: u64 = 76_561_197_960_265_728;

/// How a client was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthIdType {
    #[default]
    None,
    Steam,
    Valve,
    /// HLTV proxies and other locally trusted peers.
    Local,
}

/// Authentication protocol requested in a connect packet's protinfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// Legacy CD key authentication.
    Wonid = 1,
    /// Hashed key, used by HLTV proxies.
    HashedKey = 2,
    /// Steam ticket.
    Steam = 3,
    /// Steam with a hashed key.
    SteamHashed = 4,
}

impl AuthProtocol {
    /// Maps the numeric `prot` value; `None` outside `1..=4`.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Wonid),
            2 => Some(Self::HashedKey),
            3 => Some(Self::Steam),
            4 => Some(Self::SteamHashed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self as i32
    }
}

/// Identity of a connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetworkUserId {
    pub id_type: AuthIdType,
    pub steam_id: u64,
    pub client_ip: u32,
}

impl NetworkUserId {
    #[must_use]
    pub const fn steam(steam_id: u64) -> Self {
        Self {
            id_type: AuthIdType::Steam,
            steam_id,
            client_ip: 0,
        }
    }

    #[must_use]
    pub const fn valve(steam_id: u64) -> Self {
        Self {
            id_type: AuthIdType::Valve,
            steam_id,
            client_ip: 0,
        }
    }

    #[must_use]
    pub const fn local(client_ip: u32) -> Self {
        Self {
            id_type: AuthIdType::Local,
            steam_id: 0,
            client_ip,
        }
    }

    #[must_use]
    pub const fn with_ip(mut self, client_ip: u32) -> Self {
        self.client_ip = client_ip;
        self
    }

    /// The 32-bit account number carried in the low half of the Steam id.
    #[must_use]
    pub const fn account_id(&self) -> u32 {
        self.steam_id as u32
    }

    /// Renders the id the way ban lists and logs show it.
    ///
    /// On LAN servers every Steam or Valve id renders as `*_ID_LAN`.
    #[must_use]
    pub fn id_string(&self, lan: bool) -> String {
        let prefix = match self.id_type {
            AuthIdType::Steam => "STEAM",
            AuthIdType::Valve => "VALVE",
            AuthIdType::Local => return "HLTV".to_string(),
            AuthIdType::None => return "UNKNOWN".to_string(),
        };
        if lan {
            format!("{prefix}_ID_LAN")
        } else if self.steam_id == 0 {
            format!("{prefix}_ID_PENDING")
        } else {
            let account = self.account_id();
            format!("{prefix}_0:{}:{}", account & 1, account >> 1)
        }
    }

    /// Parses `STEAM_x:y:z` or `VALVE_x:y:z` (prefix case-insensitive).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let prefix = text.get(..6)?;
        let id_type = if prefix.eq_ignore_ascii_case("STEAM_") {
            AuthIdType::Steam
        } else if prefix.eq_ignore_ascii_case("VALVE_") {
            AuthIdType::Valve
        } else {
            return None;
        };

        let mut parts = text[6..].split(':');
        let _instance: u32 = parts.next()?.trim().parse().ok()?;
        let low: u32 = parts.next()?.trim().parse().ok()?;
        let high: u32 = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() || low > 1 {
            return None;
        }
        let account = high.checked_mul(2)?.checked_add(low)?;
        Some(Self {
            id_type,
            steam_id: STEAM_ID_BASE + u64::from(account),
            client_ip: 0,
        })
    }

    /// Returns `true` if both ids name the same Steam or Valve user.
    ///
    /// Other id types never match.
    #[must_use]
    pub fn matches(&self, other: &Self, lan: bool) -> bool {
        self.id_type == other.id_type
            && matches!(self.id_type, AuthIdType::Steam | AuthIdType::Valve)
            && self
                .id_string(lan)
                .eq_ignore_ascii_case(&other.id_string(lan))
    }
}

impl fmt::Display for NetworkUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_string(false))
    }
}
