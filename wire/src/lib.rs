//! Message framing for the svproto server protocol.
//!
//! This crate handles the byte-aligned parts of the wire format: typed
//! little-endian message helpers, bit-section bracketing, backslash info
//! strings and connectionless (out-of-band) packets. It knows nothing about
//! clients or entities, only the shape of messages.
//!
//! # Design Principles
//!
//! - **Legacy compatible** - Layouts match what deployed clients expect, byte for byte.
//! - **Bounded decoding** - String and token lengths are capped by [`Limits`].
//! - **Sticky failures** - Truncated messages set a bad-read flag instead of erroring.
//! - **No domain knowledge** - This crate handles framing, not game logic.

mod connectionless;
mod error;
mod info;
mod limits;
mod message;
mod protocol;

pub use connectionless::{
    accept_packet, bad_password_packet, banned_packet, challenge_response, is_connectionless,
    ping_reply, print_packet, rcon_challenge_response, redirect_packet, reject_packet,
    ChallengeAuth, CommandKind, CommandLine, ConnectionlessPacket, OOB_PREFIX,
};
pub use error::{WireError, WireResult};
pub use info::InfoString;
pub use limits::Limits;
pub use message::{write_bit_section, write_vec3_coord, MessageReader, MessageWrite};
pub use protocol::{
    oob, SvcOp, ENTITY_SENTINEL, MAX_INFO_STRING, MAX_KV_LEN, MAX_NAME, MAX_STRING_LEN,
    MAX_STRING_LINE_LEN, PROTOCOL_VERSION, UPDATE_BACKUP,
};
