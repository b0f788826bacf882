//! Byte-aligned message helpers layered over [`ByteBuffer`] and raw datagrams.
//!
//! All multi-byte values are little-endian. Reads never fail: running out of
//! data sets a sticky bad-read flag and yields `-1` (or `-1.0`), so a handler
//! parses a whole message and checks [`MessageReader::is_bad_read`] once.

use bitstream::{BitReadEnd, BitReader, BitResult, BitWriter, ByteBuffer};

use crate::limits::Limits;

/// Byte-aligned writers shared by every message sink.
///
/// Implementors only provide [`write_bytes`](Self::write_bytes); the typed
/// helpers encode on top of it.
pub trait MessageWrite {
    /// Appends raw bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()>;

    /// Writes a signed byte.
    fn write_char(&mut self, c: i8) -> BitResult<()> {
        self.write_bytes(&c.to_le_bytes())
    }

    /// Writes an unsigned byte.
    fn write_byte(&mut self, c: u8) -> BitResult<()> {
        self.write_bytes(&[c])
    }

    /// Writes a little-endian `i16`.
    fn write_short(&mut self, c: i16) -> BitResult<()> {
        self.write_bytes(&c.to_le_bytes())
    }

    /// Writes a little-endian `u16`.
    fn write_word(&mut self, c: u16) -> BitResult<()> {
        self.write_bytes(&c.to_le_bytes())
    }

    /// Writes a little-endian `i32`.
    fn write_long(&mut self, c: i32) -> BitResult<()> {
        self.write_bytes(&c.to_le_bytes())
    }

    /// Writes a little-endian IEEE-754 `f32`.
    fn write_float(&mut self, f: f32) -> BitResult<()> {
        self.write_bytes(&f.to_le_bytes())
    }

    /// Writes a string and its NUL terminator.
    ///
    /// Text after an interior NUL is not written.
    fn write_string(&mut self, s: &str) -> BitResult<()> {
        let bytes = s.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.write_bytes(&bytes[..end])?;
        self.write_bytes(&[0])
    }

    /// Writes raw bytes with no framing.
    fn write_buf(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.write_bytes(bytes)
    }

    /// Writes an angle as one byte, 256 steps per turn.
    fn write_angle(&mut self, degrees: f32) -> BitResult<()> {
        let scaled = (f64::from(degrees) % 360.0 * 256.0 / 360.0) as i64;
        self.write_byte((scaled & 0xFF) as u8)
    }

    /// Writes an angle as a short, 65536 steps per turn.
    fn write_hires_angle(&mut self, degrees: f32) -> BitResult<()> {
        let scaled = (f64::from(degrees) % 360.0 * 65536.0 / 360.0) as i64;
        self.write_word((scaled & 0xFFFF) as u16)
    }

    /// Writes a coordinate as a short in eighths of a unit.
    fn write_coord(&mut self, value: f32) -> BitResult<()> {
        self.write_short((value * 8.0) as i32 as i16)
    }
}

impl MessageWrite for ByteBuffer {
    fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.write(bytes)
    }
}

impl MessageWrite for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Runs `f` inside a bit-writing session on `buf`.
///
/// The session is always ended, rounding the pending bits up to whole bytes,
/// unless `f` fails.
pub fn write_bit_section<F>(buf: &mut ByteBuffer, f: F) -> BitResult<()>
where
    F: FnOnce(&mut BitWriter<'_>) -> BitResult<()>,
{
    let mut writer = BitWriter::begin(buf);
    f(&mut writer)?;
    writer.end()
}

/// Writes three coordinates as a standalone bit session.
pub fn write_vec3_coord(buf: &mut ByteBuffer, v: [f32; 3]) -> BitResult<()> {
    write_bit_section(buf, |w| w.write_bit_vec3_coord(v))
}

/// Byte cursor over a received message.
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    read_count: usize,
    bad_read: bool,
    limits: Limits,
}

impl<'a> MessageReader<'a> {
    /// Starts reading `data` from its first byte with default limits.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limits(data, Limits::default())
    }

    /// Starts reading `data` with explicit limits.
    #[must_use]
    pub const fn with_limits(data: &'a [u8], limits: Limits) -> Self {
        Self {
            data,
            read_count: 0,
            bad_read: false,
            limits,
        }
    }

    /// Returns the number of bytes consumed.
    #[must_use]
    pub const fn read_count(&self) -> usize {
        self.read_count
    }

    /// Returns `true` once any read has run out of data.
    #[must_use]
    pub const fn is_bad_read(&self) -> bool {
        self.bad_read
    }

    /// Returns the unread tail of the message.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        self.data.get(self.read_count..).unwrap_or(&[])
    }

    /// Returns the whole message.
    #[must_use]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self
            .data
            .get(self.read_count..)
            .and_then(|rest| rest.get(..N))
            .and_then(|slice| <[u8; N]>::try_from(slice).ok());
        match bytes {
            Some(bytes) => {
                self.read_count += N;
                Some(bytes)
            }
            None => {
                self.bad_read = true;
                None
            }
        }
    }

    /// Reads a signed byte, or `-1` on underflow.
    pub fn read_char(&mut self) -> i32 {
        self.take::<1>().map_or(-1, |[b]| i32::from(b as i8))
    }

    /// Reads an unsigned byte, or `-1` on underflow.
    pub fn read_byte(&mut self) -> i32 {
        self.take::<1>().map_or(-1, |[b]| i32::from(b))
    }

    /// Reads a little-endian `i16`, or `-1` on underflow.
    pub fn read_short(&mut self) -> i32 {
        self.take::<2>().map_or(-1, |b| i32::from(i16::from_le_bytes(b)))
    }

    /// Reads a little-endian `u16`, or `-1` on underflow.
    pub fn read_word(&mut self) -> i32 {
        self.take::<2>().map_or(-1, |b| i32::from(u16::from_le_bytes(b)))
    }

    /// Reads a little-endian `i32`, or `-1` on underflow.
    pub fn read_long(&mut self) -> i32 {
        self.take::<4>().map_or(-1, i32::from_le_bytes)
    }

    /// Reads a little-endian `f32`, or `-1.0` on underflow.
    pub fn read_float(&mut self) -> f32 {
        self.take::<4>().map_or(-1.0, f32::from_le_bytes)
    }

    /// Reads `len` raw bytes.
    ///
    /// Returns `None` and sets the bad-read flag if fewer remain; nothing is
    /// consumed in that case.
    pub fn read_buf(&mut self, len: usize) -> Option<&'a [u8]> {
        let slice = self
            .data
            .get(self.read_count..)
            .and_then(|rest| rest.get(..len));
        match slice {
            Some(slice) => {
                self.read_count += len;
                Some(slice)
            }
            None => {
                self.bad_read = true;
                None
            }
        }
    }

    /// Reads a NUL-terminated string.
    ///
    /// Stops at the terminator (consumed), at underflow, or when the string
    /// buffer limit is reached.
    pub fn read_string(&mut self) -> String {
        let max = self.limits.max_string_len.saturating_sub(1);
        self.read_text(max, false)
    }

    /// Reads a string terminated by NUL or `'\n'`.
    pub fn read_string_line(&mut self) -> String {
        let max = self.limits.max_string_line_len.saturating_sub(1);
        self.read_text(max, true)
    }

    fn read_text(&mut self, max: usize, stop_at_newline: bool) -> String {
        let mut out = Vec::new();
        while out.len() < max {
            let c = self.read_byte();
            if c <= 0 || (stop_at_newline && c == i32::from(b'\n')) {
                break;
            }
            out.push(c as u8);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Reads a one-byte angle in degrees, or `0.0` on underflow.
    pub fn read_angle(&mut self) -> f32 {
        match self.take::<1>() {
            Some([b]) => (f64::from(b) * (360.0 / 256.0)) as f32,
            None => 0.0,
        }
    }

    /// Reads a two-byte angle in degrees, or `0.0` on underflow.
    pub fn read_hires_angle(&mut self) -> f32 {
        match self.take::<2>() {
            Some(b) => (f64::from(i16::from_le_bytes(b)) * (360.0 / 65536.0)) as f32,
            None => 0.0,
        }
    }

    /// Reads a short coordinate in eighths of a unit.
    pub fn read_coord(&mut self) -> f32 {
        (f64::from(self.read_short()) / 8.0) as f32
    }

    /// Reads three coordinates written by [`write_vec3_coord`].
    pub fn read_vec3_coord(&mut self) -> [f32; 3] {
        self.read_bit_section(|bits| bits.read_bit_vec3_coord())
    }

    /// Starts a bit session at the current byte.
    ///
    /// Pair with [`end_bit_reading`](Self::end_bit_reading).
    #[must_use]
    pub fn begin_bit_reading(&self) -> BitReader<'a> {
        BitReader::begin(self.data, self.read_count, self.bad_read)
    }

    /// Resumes byte reading after every byte the bit session touched.
    pub fn end_bit_reading(&mut self, end: BitReadEnd) {
        self.read_count = end.next_byte;
        self.bad_read |= end.bad_read;
    }

    /// Runs `f` inside a bit session starting at the current byte.
    pub fn read_bit_section<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut BitReader<'a>) -> T,
    {
        let mut reader = self.begin_bit_reading();
        let out = f(&mut reader);
        self.end_bit_reading(reader.end());
        out
    }
}
