//! Server-side protocol core: who may connect and what they are sent.
//!
//! This crate sits on top of wire and codec. It owns the tables a game
//! server keeps about its peers and drives the connectionless handshake,
//! while sockets, ticket validation and game rules stay behind traits.
//!
//! # Features
//!
//! - Challenge issuance with bounded, evicting storage
//! - Connection admission with every legacy rejection message
//! - Address and user id ban lists with expiry and persistence
//! - Rcon password checks with failure tracking and auto-ban
//! - Per-client move and string command flood limits
//! - Per-client datagram assembly: time, packet entities and pings
//!
//! # Design Principles
//!
//! - **Reject before mutate** - A refused client leaves no trace but one reply packet.
//! - **Collaborators as traits** - [`Transport`], [`AuthBackend`] and [`GameLogic`] are injected.
//! - **Explicit clock** - Time only moves through [`Server::set_time`].
//! - **Observable** - Drops, bans and floods are logged through `tracing`.

mod address;
mod admission;
mod ban;
mod challenge;
mod client;
mod collab;
mod config;
mod connectionless;
mod error;
mod rate_limit;
mod rcon;
mod server;
mod userid;

pub use address::{AddressParseError, NetAddress};
pub use admission::AdmissionOutcome;
pub use ban::{BanRegistry, IpFilter};
pub use challenge::{Challenge, ChallengeCheck, ChallengeRegistry};
pub use client::{Client, ClientTable, ConnectionState, Resource, MAX_DATAGRAM};
pub use collab::{AuthBackend, GameLogic, MemoryTransport, SentPacket, SocketKind, Transport};
pub use config::{
    ChallengeConfig, ChallengeEviction, RateLimitConfig, RconConfig, ServerConfig, MAX_CLIENTS,
};
pub use error::{FilterKind, ServerError, ServerResult};
pub use rate_limit::{CommandClass, CommandRateLimiter, RateBreach, RateLimit, RateLimiters};
pub use rcon::{RconGuard, RconVerdict, MAX_TRACKED_ADDRESSES};
pub use server::{PacketDisposition, Server, MAX_EDICTS};
pub use userid::{AuthIdType, AuthProtocol, NetworkUserId, STEAM_ID_BASE};
