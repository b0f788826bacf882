//! Bit-level writer session over a [`ByteBuffer`].

use crate::buffer::ByteBuffer;
use crate::error::{BitError, BitResult};

/// Widest field accepted by [`BitWriter::write_bits`].
pub const MAX_FIELD_BITS: u32 = 32;

/// Number of magnitude bits in a bit coordinate's integer part.
pub const COORD_INT_BITS: u32 = 12;

/// Number of bits in a bit coordinate's fraction (eighths).
pub const COORD_FRACT_BITS: u32 = 3;

/// A bracketed bit-writing session.
///
/// Bits are packed LSB-first into a 64-bit pending accumulator that is
/// flushed to the buffer 32 bits at a time. The session holds the buffer
/// exclusively from [`begin`](Self::begin) until [`end`](Self::end), which
/// flushes the trailing partial byte.
///
/// Dropping a session without calling `end` discards the pending bits.
#[derive(Debug)]
pub struct BitWriter<'a> {
    buffer: &'a mut ByteBuffer,
    pending: u64,
    bit_count: u32,
    flushed_bytes: usize,
}

impl<'a> BitWriter<'a> {
    /// Starts a bit session at the end of `buffer`.
    #[must_use]
    pub fn begin(buffer: &'a mut ByteBuffer) -> Self {
        Self {
            buffer,
            pending: 0,
            bit_count: 0,
            flushed_bytes: 0,
        }
    }

    /// Returns the number of bits written in this session.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.flushed_bytes * 8 + self.bit_count as usize
    }

    /// Returns `true` if the target buffer has overflowed.
    #[must_use]
    pub const fn is_overflowed(&self) -> bool {
        self.buffer.is_overflowed()
    }

    /// Writes the low `bits` bits of `value`.
    ///
    /// Values above `2^bits - 1` saturate to that maximum. Zero-width writes
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 32`, or a buffer fault
    /// if a flush cannot reserve space.
    pub fn write_bits(&mut self, value: u32, bits: u32) -> BitResult<()> {
        if bits > MAX_FIELD_BITS {
            return Err(BitError::InvalidBitCount {
                bits,
                max_bits: MAX_FIELD_BITS,
            });
        }
        if bits == 0 {
            return Ok(());
        }

        let max = (1u64 << bits) - 1;
        let value = u64::from(value).min(max);

        self.maybe_flush()?;
        self.pending |= value << self.bit_count;
        self.bit_count += bits;
        Ok(())
    }

    /// Writes a single bit.
    pub fn write_one_bit(&mut self, value: bool) -> BitResult<()> {
        self.write_bits(u32::from(value), 1)
    }

    /// Writes a sign bit followed by `bits - 1` magnitude bits.
    ///
    /// Below 32 bits the value is first clamped to `±(2^(bits-1) - 1)`.
    pub fn write_signed_bits(&mut self, value: i32, bits: u32) -> BitResult<()> {
        if bits > MAX_FIELD_BITS {
            return Err(BitError::InvalidBitCount {
                bits,
                max_bits: MAX_FIELD_BITS,
            });
        }
        if bits == 0 {
            return Ok(());
        }

        let value = if bits < MAX_FIELD_BITS {
            let max = (1i32 << (bits - 1)) - 1;
            value.clamp(-max, max)
        } else {
            value
        };

        self.write_one_bit(value < 0)?;
        self.write_bits(value.unsigned_abs(), bits - 1)
    }

    /// Writes an angle in degrees as a `bits`-wide fraction of a full turn.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits >= 32`.
    pub fn write_bit_angle(&mut self, degrees: f32, bits: u32) -> BitResult<()> {
        if bits >= MAX_FIELD_BITS {
            return Err(BitError::InvalidBitCount {
                bits,
                max_bits: MAX_FIELD_BITS - 1,
            });
        }

        let shift = 1u64 << bits;
        let mask = shift - 1;
        let scaled = (shift as f64 * (f64::from(degrees) % 360.0)) as i64 / 360;
        self.write_bits((scaled as u64 & mask) as u32, bits)
    }

    /// Writes a coordinate with 1/8 unit precision.
    ///
    /// Layout: integer-present bit, fraction-present bit, then (if either is
    /// set) a sign bit, a 12-bit integer part and a 3-bit fraction, each only
    /// when present.
    pub fn write_bit_coord(&mut self, value: f32) -> BitResult<()> {
        let negative = value <= -0.125;
        let int_part = (value as i32).unsigned_abs();
        let fract_part = ((value * 8.0) as i32).unsigned_abs() & 7;

        self.write_one_bit(int_part != 0)?;
        self.write_one_bit(fract_part != 0)?;

        if int_part != 0 || fract_part != 0 {
            self.write_one_bit(negative)?;
            if int_part != 0 {
                self.write_bits(int_part, COORD_INT_BITS)?;
            }
            if fract_part != 0 {
                self.write_bits(fract_part, COORD_FRACT_BITS)?;
            }
        }
        Ok(())
    }

    /// Writes three presence flags followed by a coordinate per present axis.
    ///
    /// An axis is present when its magnitude is at least 1/8.
    pub fn write_bit_vec3_coord(&mut self, v: [f32; 3]) -> BitResult<()> {
        let present = v.map(|axis| axis <= -0.125 || axis >= 0.125);
        for flag in present {
            self.write_one_bit(flag)?;
        }
        for (axis, flag) in v.into_iter().zip(present) {
            if flag {
                self.write_bit_coord(axis)?;
            }
        }
        Ok(())
    }

    /// Writes a string as 8-bit characters followed by a zero terminator.
    ///
    /// Input stops at its first NUL byte, if any.
    pub fn write_bit_string(&mut self, text: impl AsRef<[u8]>) -> BitResult<()> {
        for &byte in text.as_ref().iter().take_while(|&&b| b != 0) {
            self.write_bits(u32::from(byte), 8)?;
        }
        self.write_bits(0, 8)
    }

    /// Writes raw bytes as 8-bit fields with no framing.
    pub fn write_bit_data(&mut self, bytes: &[u8]) -> BitResult<()> {
        for &byte in bytes {
            self.write_bits(u32::from(byte), 8)?;
        }
        Ok(())
    }

    /// Ends the session, flushing the pending bits rounded up to whole bytes.
    ///
    /// At least one byte is always written.
    pub fn end(mut self) -> BitResult<()> {
        let mut bytes = (self.bit_count / 8) as usize;
        if self.bit_count % 8 != 0 || bytes == 0 {
            bytes += 1;
        }
        let pending = self.pending.to_le_bytes();
        if let Some(dst) = self.buffer.reserve_space(bytes)? {
            dst.copy_from_slice(&pending[..bytes]);
        }
        self.flushed_bytes += bytes;
        self.pending = 0;
        self.bit_count = 0;
        Ok(())
    }

    fn maybe_flush(&mut self) -> BitResult<()> {
        if self.bit_count < 32 {
            return Ok(());
        }
        let low = (self.pending as u32).to_le_bytes();
        if let Some(dst) = self.buffer.reserve_space(4)? {
            dst.copy_from_slice(&low);
        }
        self.pending >>= 32;
        self.bit_count -= 32;
        self.flushed_bytes += 4;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut BitWriter<'_>),
    {
        let mut buf = ByteBuffer::new("test", 64);
        let mut writer = BitWriter::begin(&mut buf);
        f(&mut writer);
        writer.end().unwrap();
        buf.as_slice().to_vec()
    }

    #[test]
    fn empty_session_writes_one_byte() {
        let bytes = session(|_| {});
        assert_eq!(bytes, vec![0]);
    }

    #[test]
    fn bits_are_lsb_first() {
        let bytes = session(|w| {
            w.write_one_bit(true).unwrap();
            w.write_one_bit(false).unwrap();
            w.write_one_bit(true).unwrap();
        });
        assert_eq!(bytes, vec![0b0000_0101]);
    }

    #[test]
    fn multi_byte_values_are_little_endian() {
        let bytes = session(|w| w.write_bits(0xABCD, 16).unwrap());
        assert_eq!(bytes, vec![0xCD, 0xAB]);
    }

    #[test]
    fn write_across_byte_boundary() {
        let bytes = session(|w| {
            w.write_bits(0b1111, 4).unwrap();
            w.write_bits(0b1010_1010, 8).unwrap();
        });
        // low nibble 1111, then 10101010 shifted by 4
        assert_eq!(bytes, vec![0b1010_1111, 0b0000_1010]);
    }

    #[test]
    fn full_width_write() {
        let bytes = session(|w| w.write_bits(u32::MAX, 32).unwrap());
        assert_eq!(bytes, vec![0xFF; 4]);
    }

    #[test]
    fn flush_keeps_order_past_32_bits() {
        let bytes = session(|w| {
            w.write_bits(0x7F, 7).unwrap();
            w.write_bits(0xDEAD_BEEF, 32).unwrap();
            w.write_bits(0x1, 1).unwrap();
        });
        let packed = 0x7Fu64 | (0xDEAD_BEEFu64 << 7) | (1u64 << 39);
        assert_eq!(bytes, packed.to_le_bytes()[..5].to_vec());
    }

    #[test]
    fn saturates_oversized_values() {
        let bytes = session(|w| w.write_bits(300, 8).unwrap());
        assert_eq!(bytes, vec![0xFF]);
    }

    #[test]
    fn zero_width_is_noop() {
        let mut buf = ByteBuffer::new("test", 8);
        let mut writer = BitWriter::begin(&mut buf);
        writer.write_bits(0xFF, 0).unwrap();
        assert_eq!(writer.bits_written(), 0);
    }

    #[test]
    fn width_above_32_is_fault() {
        let mut buf = ByteBuffer::new("test", 8);
        let mut writer = BitWriter::begin(&mut buf);
        let err = writer.write_bits(0, 33).unwrap_err();
        assert!(matches!(
            err,
            BitError::InvalidBitCount {
                bits: 33,
                max_bits: 32
            }
        ));
        assert!(err.is_internal_fault());
    }

    #[test]
    fn signed_bits_layout() {
        let bytes = session(|w| w.write_signed_bits(-5, 8).unwrap());
        // sign bit 1, then 5 in 7 bits
        assert_eq!(bytes, vec![1 | (5 << 1)]);
    }

    #[test]
    fn signed_bits_clamp_symmetric() {
        let bytes = session(|w| w.write_signed_bits(-200, 8).unwrap());
        assert_eq!(bytes, vec![1 | (127 << 1)]);
        let bytes = session(|w| w.write_signed_bits(200, 8).unwrap());
        assert_eq!(bytes, vec![127 << 1]);
    }

    #[test]
    fn bit_angle_rejects_32_bits() {
        let mut buf = ByteBuffer::new("test", 8);
        let mut writer = BitWriter::begin(&mut buf);
        assert!(writer.write_bit_angle(90.0, 32).is_err());
        assert!(writer.write_bit_angle(90.0, 31).is_ok());
    }

    #[test]
    fn bit_angle_quarter_turn() {
        let bytes = session(|w| w.write_bit_angle(90.0, 8).unwrap());
        assert_eq!(bytes, vec![64]);
    }

    #[test]
    fn bit_angle_negative_wraps() {
        let bytes = session(|w| w.write_bit_angle(-90.0, 8).unwrap());
        assert_eq!(bytes, vec![192]);
    }

    #[test]
    fn bit_coord_zero_is_two_bits() {
        let mut buf = ByteBuffer::new("test", 8);
        let mut writer = BitWriter::begin(&mut buf);
        writer.write_bit_coord(0.05).unwrap();
        assert_eq!(writer.bits_written(), 2);
    }

    #[test]
    fn bit_coord_full_layout() {
        let mut buf = ByteBuffer::new("test", 8);
        let mut writer = BitWriter::begin(&mut buf);
        writer.write_bit_coord(-3.5).unwrap();
        // 2 flags + sign + 12 int + 3 fract
        assert_eq!(writer.bits_written(), 18);
        writer.end().unwrap();
        let out = buf.as_slice();
        let raw = u32::from_le_bytes([out[0], out[1], out[2], 0]);
        assert_eq!(raw & 0b11, 0b11);
        assert_eq!((raw >> 2) & 1, 1);
        assert_eq!((raw >> 3) & 0xFFF, 3);
        assert_eq!((raw >> 15) & 0b111, 4);
    }

    #[test]
    fn bit_string_terminated() {
        let bytes = session(|w| w.write_bit_string("hi").unwrap());
        assert_eq!(bytes, b"hi\0".to_vec());
    }

    #[test]
    fn bit_string_stops_at_interior_nul() {
        let bytes = session(|w| w.write_bit_string(b"ab\0cd").unwrap());
        assert_eq!(bytes, b"ab\0".to_vec());
    }

    #[test]
    fn overflow_during_session_drops_content() {
        let mut buf = ByteBuffer::overflowable("datagram", 4);
        let mut writer = BitWriter::begin(&mut buf);
        writer.write_bits(u32::MAX, 32).unwrap();
        writer.write_bits(u32::MAX, 32).unwrap();
        writer.write_bits(u32::MAX, 32).unwrap();
        assert!(writer.is_overflowed());
        writer.end().unwrap();
        assert!(buf.is_overflowed());
    }

    #[test]
    fn session_appends_after_existing_bytes() {
        let mut buf = ByteBuffer::new("test", 8);
        buf.write(&[0x29]).unwrap();
        let mut writer = BitWriter::begin(&mut buf);
        writer.write_bits(3, 2).unwrap();
        writer.end().unwrap();
        assert_eq!(buf.as_slice(), &[0x29, 0b11]);
    }
}
