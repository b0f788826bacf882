//! Bit-level reader session with a sticky bad-read flag.

use crate::error::{BitError, BitResult};
use crate::writer::{COORD_FRACT_BITS, COORD_INT_BITS, MAX_FIELD_BITS};

/// Longest string returned by [`BitReader::read_bit_string`], in bytes.
pub const MAX_BIT_STRING_LEN: usize = 8191;

/// Cursor state handed back by [`BitReader::end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitReadEnd {
    /// Index of the first byte after every byte the session touched.
    pub next_byte: usize,
    /// Whether the session read past the end of the data.
    pub bad_read: bool,
}

/// A bracketed bit-reading session.
///
/// Reads never fail on malformed input. Touching a byte past the end of the
/// data sets a sticky bad-read flag; from then on every read returns the
/// sentinel `1` (or `true`) without consuming anything, so a caller can parse
/// a whole packet and check [`is_bad_read`](Self::is_bad_read) once.
///
/// Only widths above 32 bits are rejected, as internal faults.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    start: usize,
    byte_pos: usize,
    cur_bit: u32,
    bad_read: bool,
}

impl<'a> BitReader<'a> {
    /// Starts a standalone session at the first byte of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self::begin(data, 0, false)
    }

    /// Starts a session at byte `start`.
    ///
    /// `bad_read` carries the caller's flag into the session; it is also set
    /// if no byte remains at `start`.
    #[must_use]
    pub fn begin(data: &'a [u8], start: usize, bad_read: bool) -> Self {
        Self {
            data,
            start,
            byte_pos: start,
            cur_bit: 0,
            bad_read: bad_read || start >= data.len(),
        }
    }

    /// Returns `true` once any read has gone past the end of the data.
    #[must_use]
    pub const fn is_bad_read(&self) -> bool {
        self.bad_read
    }

    /// Returns the number of bits consumed since the session started.
    #[must_use]
    pub const fn bits_read(&self) -> usize {
        (self.byte_pos - self.start) * 8 + self.cur_bit as usize
    }

    /// Returns the absolute bit position within the data.
    #[must_use]
    pub const fn current_bit(&self) -> usize {
        self.byte_pos * 8 + self.cur_bit as usize
    }

    /// Reads `bits` bits as an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 32`.
    pub fn read_bits(&mut self, bits: u32) -> BitResult<u32> {
        if bits > MAX_FIELD_BITS {
            return Err(BitError::InvalidBitCount {
                bits,
                max_bits: MAX_FIELD_BITS,
            });
        }
        Ok(self.read_field(bits))
    }

    /// Reads `bits` bits without consuming them.
    pub fn peek_bits(&mut self, bits: u32) -> BitResult<u32> {
        let (byte_pos, cur_bit, bad_read) = (self.byte_pos, self.cur_bit, self.bad_read);
        let value = self.read_bits(bits);
        self.byte_pos = byte_pos;
        self.cur_bit = cur_bit;
        self.bad_read = bad_read;
        value
    }

    /// Reads a single bit.
    pub fn read_one_bit(&mut self) -> bool {
        self.read_field(1) != 0
    }

    /// Reads a sign bit followed by `bits - 1` magnitude bits.
    pub fn read_signed_bits(&mut self, bits: u32) -> BitResult<i32> {
        if bits > MAX_FIELD_BITS {
            return Err(BitError::InvalidBitCount {
                bits,
                max_bits: MAX_FIELD_BITS,
            });
        }
        if bits == 0 {
            return Ok(0);
        }
        let negative = self.read_one_bit();
        let magnitude = self.read_field(bits - 1) as i32;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Reads a `bits`-wide angle and returns degrees.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits >= 32`.
    pub fn read_bit_angle(&mut self, bits: u32) -> BitResult<f32> {
        if bits >= MAX_FIELD_BITS {
            return Err(BitError::InvalidBitCount {
                bits,
                max_bits: MAX_FIELD_BITS - 1,
            });
        }
        let step = 360.0 / f64::from(1u32 << bits);
        Ok((f64::from(self.read_field(bits)) * step) as f32)
    }

    /// Reads a coordinate written by
    /// [`BitWriter::write_bit_coord`](crate::BitWriter::write_bit_coord).
    pub fn read_bit_coord(&mut self) -> f32 {
        let has_int = self.read_one_bit();
        let has_fract = self.read_one_bit();
        if !has_int && !has_fract {
            return 0.0;
        }

        let negative = self.read_one_bit();
        let int_part = if has_int {
            self.read_field(COORD_INT_BITS)
        } else {
            0
        };
        let fract_part = if has_fract {
            self.read_field(COORD_FRACT_BITS)
        } else {
            0
        };

        let value = (f64::from(fract_part) / 8.0 + f64::from(int_part)) as f32;
        if negative {
            -value
        } else {
            value
        }
    }

    /// Reads three presence flags and a coordinate per present axis.
    ///
    /// Absent axes decode as zero.
    pub fn read_bit_vec3_coord(&mut self) -> [f32; 3] {
        let present = [self.read_one_bit(), self.read_one_bit(), self.read_one_bit()];
        present.map(|flag| if flag { self.read_bit_coord() } else { 0.0 })
    }

    /// Reads 8-bit characters up to a zero terminator.
    ///
    /// Stops early on bad read or after [`MAX_BIT_STRING_LEN`] characters.
    pub fn read_bit_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < MAX_BIT_STRING_LEN {
            let c = self.read_field(8) as u8;
            if c == 0 || self.bad_read {
                break;
            }
            out.push(c);
        }
        out
    }

    /// Fills `dst` with raw 8-bit fields.
    pub fn read_bit_data(&mut self, dst: &mut [u8]) {
        for byte in dst {
            *byte = self.read_field(8) as u8;
        }
    }

    /// Ends the session and reports where byte-aligned reading resumes.
    #[must_use]
    pub const fn end(self) -> BitReadEnd {
        let next_byte = self.byte_pos + 1;
        BitReadEnd {
            next_byte,
            bad_read: self.bad_read || next_byte > self.data.len(),
        }
    }

    fn read_field(&mut self, bits: u32) -> u32 {
        if self.bad_read {
            return 1;
        }
        if bits == 0 {
            return 0;
        }

        if self.cur_bit >= 8 {
            self.byte_pos += 1;
            self.cur_bit = 0;
        }

        let first = self.byte_pos;
        let shift = self.cur_bit;
        let total = shift + bits;
        let mut advance = (total >> 3) as usize;
        if total & 7 == 0 {
            self.cur_bit = 8;
            advance -= 1;
        } else {
            self.cur_bit = total & 7;
        }
        self.byte_pos += advance;

        if self.byte_pos >= self.data.len() {
            self.bad_read = true;
            return 1;
        }

        let acc = self.data[first..=self.byte_pos]
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (8 * i)));
        ((acc >> shift) & ((1u64 << bits) - 1)) as u32
    }
}
