//! Protocol constants and server message opcodes.

use crate::error::{WireError, WireResult};

/// Network protocol version spoken by this server.
pub const PROTOCOL_VERSION: i32 = 48;

/// Number of frames kept per client for delta compression.
pub const UPDATE_BACKUP: usize = 64;

/// Longest string accepted by [`MessageReader::read_string`](crate::MessageReader::read_string), plus the terminator.
pub const MAX_STRING_LEN: usize = 8192;

/// Longest line accepted by [`MessageReader::read_string_line`](crate::MessageReader::read_string_line), plus the terminator.
pub const MAX_STRING_LINE_LEN: usize = 2048;

/// Maximum size of an info string, including the terminator.
pub const MAX_INFO_STRING: usize = 256;

/// Keys and values of an info string must be shorter than this.
pub const MAX_KV_LEN: usize = 128;

/// Player names are truncated to fewer than this many bytes.
pub const MAX_NAME: usize = 32;

/// Entity number used as the end-of-list sentinel during merge walks.
pub const ENTITY_SENTINEL: u32 = 9999;

/// Out-of-band reply bytes, following the `0xFFFFFFFF` prefix.
pub mod oob {
    /// Ping request.
    pub const A2A_PING: u8 = b'i';
    /// Ping acknowledgment.
    pub const A2A_ACK: u8 = b'j';
    /// Print text.
    pub const A2A_PRINT: u8 = b'l';
    /// Challenge response.
    pub const S2C_CHALLENGE: u8 = b'A';
    /// Connection accepted.
    pub const S2C_CONNECTION: u8 = b'B';
    /// Connection rejected with a reason.
    pub const S2C_REJECT: u8 = b'9';
    /// Connection rejected for a bad password.
    pub const S2C_BADPASSWORD: u8 = b'8';

    /// Master and query request bytes the core does not answer.
    pub const IGNORED: [u8; 7] = [b'W', b'T', b'U', b'V', b'R', b'O', b's'];
}

/// Server-to-client message opcodes used by the protocol core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum SvcOp {
    /// Server time for the frame.
    Time = 7,
    /// Console print.
    Print = 8,
    /// Ping and loss table.
    Pings = 17,
    /// Full packet entities.
    PacketEntities = 40,
    /// Packet entities delta-compressed against an acknowledged frame.
    DeltaPacketEntities = 41,
}

impl SvcOp {
    /// Parses an opcode from a raw byte.
    pub fn parse(op: u8) -> WireResult<Self> {
        match op {
            7 => Ok(Self::Time),
            8 => Ok(Self::Print),
            17 => Ok(Self::Pings),
            40 => Ok(Self::PacketEntities),
            41 => Ok(Self::DeltaPacketEntities),
            _ => Err(WireError::UnknownOpcode { op }),
        }
    }

    /// Returns the raw opcode byte.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svc_op_parse_known() {
        assert_eq!(SvcOp::parse(41).unwrap(), SvcOp::DeltaPacketEntities);
        assert_eq!(SvcOp::parse(17).unwrap(), SvcOp::Pings);
        assert_eq!(SvcOp::Time.raw(), 7);
    }

    #[test]
    fn svc_op_parse_unknown() {
        assert!(matches!(
            SvcOp::parse(200),
            Err(WireError::UnknownOpcode { op: 200 })
        ));
    }

    #[test]
    fn ignored_bytes_do_not_collide_with_handled_ones() {
        for b in oob::IGNORED {
            assert_ne!(b, oob::A2A_PING);
            assert_ne!(b, oob::A2A_ACK);
        }
    }
}
