//! Error types for codec operations.

use std::fmt;

use crate::types::FrameSequence;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building or reading packet entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Wire format error.
    Wire(wire::WireError),

    /// Bitstream error.
    Bitstream(bitstream::BitError),

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Entities are not in strictly ascending number order.
    InvalidEntityOrder { previous: u32, current: u32 },

    /// No static baseline exists for the entity number.
    MissingBaseline { number: u32 },

    /// An instance baseline index does not exist.
    MissingInstanceBaseline { index: u32 },

    /// A baseline offset points before the start of the packet.
    InvalidBaselineOffset { offset: u32, available: usize },

    /// A received packet entity stream ended early.
    Truncated,

    /// A message other than packet entities was found.
    UnexpectedOpcode { op: u8 },

    /// A received record does not follow the previous entity number.
    UnorderedRecord { previous: u32, current: u32 },

    /// A delta packet arrived without the frame it was built against.
    MissingDeltaFrame { sequence: u8 },

    /// The decoded entity count disagrees with the message header.
    CountMismatch { expected: usize, actual: usize },

    /// Frame sequences must not go backwards.
    HistoryOutOfOrder {
        last: FrameSequence,
        new: FrameSequence,
    },
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PacketEntities,
    InstanceBaselines,
}

impl CodecError {
    /// Returns `true` if the error indicates a server-side construction bug
    /// rather than bad input.
    #[must_use]
    pub const fn is_internal_fault(&self) -> bool {
        match self {
            Self::Wire(e) => e.is_internal_fault(),
            Self::Bitstream(e) => e.is_internal_fault(),
            Self::InvalidEntityOrder { .. } | Self::HistoryOutOfOrder { .. } => true,
            Self::LimitsExceeded { .. }
            | Self::MissingBaseline { .. }
            | Self::MissingInstanceBaseline { .. }
            | Self::InvalidBaselineOffset { .. }
            | Self::Truncated
            | Self::UnexpectedOpcode { .. }
            | Self::UnorderedRecord { .. }
            | Self::MissingDeltaFrame { .. }
            | Self::CountMismatch { .. } => false,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Bitstream(e) => write!(f, "bitstream error: {e}"),
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::InvalidEntityOrder { previous, current } => {
                write!(f, "entity order invalid: {previous} then {current}")
            }
            Self::MissingBaseline { number } => {
                write!(f, "no baseline for entity {number}")
            }
            Self::MissingInstanceBaseline { index } => {
                write!(f, "instance baseline {index} not found")
            }
            Self::InvalidBaselineOffset { offset, available } => {
                write!(
                    f,
                    "baseline offset {offset} exceeds {available} decoded entities"
                )
            }
            Self::Truncated => write!(f, "packet entities truncated"),
            Self::UnexpectedOpcode { op } => {
                write!(f, "expected packet entities, found opcode {op}")
            }
            Self::UnorderedRecord { previous, current } => {
                write!(f, "entity record {current} follows {previous}")
            }
            Self::MissingDeltaFrame { sequence } => {
                write!(f, "no frame for delta sequence {sequence}")
            }
            Self::CountMismatch { expected, actual } => {
                write!(f, "header announced {expected} entities, decoded {actual}")
            }
            Self::HistoryOutOfOrder { last, new } => {
                write!(
                    f,
                    "frame sequence {} is older than {}",
                    new.raw(),
                    last.raw()
                )
            }
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PacketEntities => "packet entities",
            Self::InstanceBaselines => "instance baselines",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wire(e) => Some(e),
            Self::Bitstream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wire::WireError> for CodecError {
    fn from(err: wire::WireError) -> Self {
        Self::Wire(err)
    }
}

impl From<bitstream::BitError> for CodecError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Bitstream(err)
    }
}
