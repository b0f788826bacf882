//! Byte buffers and bit packing primitives for the svproto server protocol.
//!
//! This crate provides [`ByteBuffer`], a fixed-capacity message buffer with an
//! overflow policy, and the bracketed [`BitWriter`] / [`BitReader`] sessions
//! used for the LSB-first bit-packed sections of server messages.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Overflow is a state, not a crash** - Buffers that allow overflow are
//!   cleared and flagged; buffers that don't return an internal-fault error.
//! - **Malformed input never errors** - Reads past the end set a sticky
//!   bad-read flag and return sentinel values.
//! - **No domain knowledge** - This crate knows nothing about entities,
//!   clients or game state.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter, ByteBuffer};
//!
//! let mut buf = ByteBuffer::new("example", 64);
//! let mut writer = BitWriter::begin(&mut buf);
//! writer.write_one_bit(true).unwrap();
//! writer.write_bits(42, 7).unwrap();
//! writer.end().unwrap();
//!
//! let mut reader = BitReader::new(buf.as_slice());
//! assert!(reader.read_one_bit());
//! assert_eq!(reader.read_bits(7).unwrap(), 42);
//! assert_eq!(reader.end().next_byte, 1);
//! ```

mod buffer;
mod error;
mod reader;
mod writer;

pub use buffer::{BufferFlags, ByteBuffer, MIN_ALLOC_SIZE};
pub use error::{BitError, BitResult};
pub use reader::{BitReadEnd, BitReader, MAX_BIT_STRING_LEN};
pub use writer::{BitWriter, COORD_FRACT_BITS, COORD_INT_BITS, MAX_FIELD_BITS};
