//! Error types for buffer and bitstream operations.

use std::fmt;

/// Result type for buffer and bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors raised by [`ByteBuffer`](crate::ByteBuffer) and the bit sessions.
///
/// Every variant is an internal fault: it can only be reached by server code
/// that sized a buffer wrong or asked for an impossible field width. Attacker
/// controlled input never produces a `BitError`; malformed reads are reported
/// through the sticky bad-read flag instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    /// Space was requested from a buffer with zero capacity.
    UninitializedBuffer {
        /// Name of the buffer.
        name: String,
    },

    /// A single reservation is larger than the whole buffer, and the buffer
    /// does not allow overflow.
    LengthExceedsCapacity {
        /// Name of the buffer.
        name: String,
        /// Requested length in bytes.
        length: usize,
        /// Buffer capacity in bytes.
        capacity: usize,
    },

    /// A reservation would overrun a buffer that does not allow overflow.
    OverflowDisallowed {
        /// Name of the buffer.
        name: String,
        /// Requested length in bytes.
        length: usize,
        /// Bytes already used.
        used: usize,
        /// Buffer capacity in bytes.
        capacity: usize,
    },

    /// Invalid bit count for the operation.
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: u32,
        /// Maximum allowed bits for this operation.
        max_bits: u32,
    },
}

impl BitError {
    /// Returns `true` if the error indicates a server-side construction bug.
    ///
    /// This holds for every current variant.
    #[must_use]
    pub const fn is_internal_fault(&self) -> bool {
        matches!(
            self,
            Self::UninitializedBuffer { .. }
                | Self::LengthExceedsCapacity { .. }
                | Self::OverflowDisallowed { .. }
                | Self::InvalidBitCount { .. }
        )
    }
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UninitializedBuffer { name } => {
                write!(f, "tried to write to an uninitialized buffer: {name}")
            }
            Self::LengthExceedsCapacity {
                name,
                length,
                capacity,
            } => {
                write!(
                    f,
                    "{length} is > full buffer size {capacity} on {name}"
                )
            }
            Self::OverflowDisallowed {
                name,
                length,
                used,
                capacity,
            } => {
                write!(
                    f,
                    "overflow without allow-overflow set on {name}: {used} + {length} > {capacity}"
                )
            }
            Self::InvalidBitCount { bits, max_bits } => {
                write!(f, "invalid bit count {bits}, maximum allowed is {max_bits}")
            }
        }
    }
}

impl std::error::Error for BitError {}
