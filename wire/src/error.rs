//! Error types for message framing and info strings.

use std::fmt;

use bitstream::BitError;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised by the message codec and info string editing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// A buffer or bit session fault.
    Buffer(BitError),

    /// Unknown server message opcode.
    UnknownOpcode { op: u8 },

    /// Star keys (`*name`) can only be set through the star-key path.
    StarKey { key: String },

    /// Key or value contains a character that would break the info string.
    InvalidInfoChar { ch: char },

    /// Key or value is too long.
    InfoFieldTooLong { len: usize, max: usize },

    /// The info string would exceed its maximum size.
    InfoStringFull { len: usize, max: usize },
}

impl WireError {
    /// Returns `true` if the error indicates a server-side construction bug.
    #[must_use]
    pub const fn is_internal_fault(&self) -> bool {
        match self {
            Self::Buffer(err) => err.is_internal_fault(),
            _ => false,
        }
    }
}

impl From<BitError> for WireError {
    fn from(err: BitError) -> Self {
        Self::Buffer(err)
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(err) => write!(f, "buffer error: {err}"),
            Self::UnknownOpcode { op } => write!(f, "unknown server opcode: {op}"),
            Self::StarKey { key } => write!(f, "can't set star key {key}"),
            Self::InvalidInfoChar { ch } => {
                write!(f, "can't use keys or values with a {ch:?}")
            }
            Self::InfoFieldTooLong { len, max } => {
                write!(f, "keys and values must be < {max} characters, got {len}")
            }
            Self::InfoStringFull { len, max } => {
                write!(f, "info string length exceeded: {len} >= {max}")
            }
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Buffer(err) => Some(err),
            _ => None,
        }
    }
}
