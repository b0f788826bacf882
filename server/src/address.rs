//! Network addresses as the server sees them.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// Address of a remote peer.
///
/// Loopback is a distinct kind, not `127.0.0.1`: a listen server's own client
/// talks over loopback and skips the challenge and password checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetAddress {
    /// The in-process client.
    Loopback,
    /// An IPv4 peer.
    Ip(SocketAddrV4),
}

impl NetAddress {
    /// Creates an IPv4 address.
    #[must_use]
    pub const fn ip(octets: [u8; 4], port: u16) -> Self {
        Self::Ip(SocketAddrV4::new(
            Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
            port,
        ))
    }

    #[must_use]
    pub const fn is_loopback(&self) -> bool {
        matches!(self, Self::Loopback)
    }

    /// Returns the IPv4 octets; loopback reports `127.0.0.1`.
    #[must_use]
    pub const fn octets(&self) -> [u8; 4] {
        match self {
            Self::Loopback => [127, 0, 0, 1],
            Self::Ip(addr) => addr.ip().octets(),
        }
    }

    /// Returns the port; loopback has none.
    #[must_use]
    pub const fn port(&self) -> u16 {
        match self {
            Self::Loopback => 0,
            Self::Ip(addr) => addr.port(),
        }
    }

    /// Compares kind and IP, ignoring the port.
    #[must_use]
    pub fn same_base(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Loopback, Self::Loopback) => true,
            (Self::Ip(a), Self::Ip(b)) => a.ip() == b.ip(),
            _ => false,
        }
    }

    /// Returns `true` for loopback and private IPv4 ranges.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        match self {
            Self::Loopback => true,
            Self::Ip(addr) => {
                let [a, b, ..] = addr.ip().octets();
                a == 10 || a == 127 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168)
            }
        }
    }

    /// Formats the address without its port.
    #[must_use]
    pub fn base_string(&self) -> String {
        match self {
            Self::Loopback => "loopback".to_string(),
            Self::Ip(addr) => addr.ip().to_string(),
        }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loopback => write!(f, "loopback"),
            Self::Ip(addr) => write!(f, "{addr}"),
        }
    }
}

impl From<SocketAddrV4> for NetAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::Ip(addr)
    }
}

/// Error returned when an address string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError {
    text: String,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.text)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for NetAddress {
    type Err = AddressParseError;

    /// Accepts `loopback`, `a.b.c.d:port` or a bare `a.b.c.d` (port 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("loopback") {
            return Ok(Self::Loopback);
        }
        let err = || AddressParseError {
            text: s.to_string(),
        };
        if let Ok(addr) = s.parse::<SocketAddrV4>() {
            return Ok(Self::Ip(addr));
        }
        s.parse::<Ipv4Addr>()
            .map(|ip| Self::Ip(SocketAddrV4::new(ip, 0)))
            .map_err(|_| err())
    }
}
