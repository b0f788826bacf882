//! Error types for server operations.

use std::fmt;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised by the server core.
///
/// Rejected connections are not errors; see
/// [`AdmissionOutcome`](crate::AdmissionOutcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Buffer or bit session error.
    Bitstream(bitstream::BitError),

    /// Message framing error.
    Wire(wire::WireError),

    /// Packet entity encoding error.
    Codec(codec::CodecError),

    /// A configuration value is out of range.
    InvalidConfig { field: &'static str, reason: String },

    /// The configuration file could not be read.
    ConfigRead { path: String, reason: String },

    /// The configuration text is not valid JSON for [`ServerConfig`](crate::ServerConfig).
    ConfigParse { reason: String },

    /// An IP filter string could not be parsed.
    InvalidFilter { text: String },

    /// A user id string could not be parsed.
    InvalidUserId { text: String },

    /// A filter list reached its configured size.
    FilterListFull { kind: FilterKind, max: usize },

    /// No filter matches the given selector.
    FilterNotFound { kind: FilterKind, selector: String },

    /// A client slot index is out of range.
    InvalidSlot { slot: usize },
}

/// Which ban list an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Ip,
    User,
}

impl ServerError {
    /// Returns `true` if the error indicates a server-side construction bug.
    ///
    /// Such errors abort the current frame; everything else is an operator
    /// or input problem.
    #[must_use]
    pub const fn is_internal_fault(&self) -> bool {
        match self {
            Self::Bitstream(e) => e.is_internal_fault(),
            Self::Wire(e) => e.is_internal_fault(),
            Self::Codec(e) => e.is_internal_fault(),
            Self::InvalidSlot { .. } => true,
            Self::InvalidConfig { .. }
            | Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::InvalidFilter { .. }
            | Self::InvalidUserId { .. }
            | Self::FilterListFull { .. }
            | Self::FilterNotFound { .. } => false,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "IP"),
            Self::User => write!(f, "UserID"),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitstream(e) => write!(f, "bitstream error: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid config value for {field}: {reason}")
            }
            Self::ConfigRead { path, reason } => {
                write!(f, "couldn't read config {path}: {reason}")
            }
            Self::ConfigParse { reason } => write!(f, "couldn't parse config: {reason}"),
            Self::InvalidFilter { text } => write!(f, "bad filter address: {text}"),
            Self::InvalidUserId { text } => write!(f, "couldn't resolve uniqueid {text}"),
            Self::FilterListFull { kind, max } => {
                write!(f, "{kind} filter list is full ({max} entries)")
            }
            Self::FilterNotFound { kind, selector } => {
                write!(f, "no {kind} filter matches {selector}")
            }
            Self::InvalidSlot { slot } => write!(f, "client slot {slot} out of range"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(e) => Some(e),
            Self::Wire(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bitstream::BitError> for ServerError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Bitstream(err)
    }
}

impl From<wire::WireError> for ServerError {
    fn from(err: wire::WireError) -> Self {
        Self::Wire(err)
    }
}

impl From<codec::CodecError> for ServerError {
    fn from(err: codec::CodecError) -> Self {
        Self::Codec(err)
    }
}
