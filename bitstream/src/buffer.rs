//! Named, bounded append buffer with overflow policies.

use std::ops::Range;

use tracing::{debug, warn};

use crate::error::{BitError, BitResult};

/// Smallest capacity handed out by [`ByteBuffer::allocate`].
pub const MIN_ALLOC_SIZE: usize = 256;

/// Overflow policy and state flags of a [`ByteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u8);

impl BufferFlags {
    /// Overruns are fatal (the default policy).
    pub const CHECK_OVERFLOW: u8 = 0;

    /// Overruns clear the buffer and mark it overflowed instead of failing.
    pub const ALLOW_OVERFLOW: u8 = 1 << 0;

    /// The buffer overflowed since the last [`ByteBuffer::clear`].
    pub const OVERFLOWED: u8 = 1 << 1;

    /// Creates flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Flags for a buffer that fails hard on overrun.
    #[must_use]
    pub const fn check_overflow() -> Self {
        Self(Self::CHECK_OVERFLOW)
    }

    /// Flags for a buffer that may overflow.
    #[must_use]
    pub const fn allow_overflow() -> Self {
        Self(Self::ALLOW_OVERFLOW)
    }

    /// Returns `true` if overruns are tolerated.
    #[must_use]
    pub const fn allows_overflow(self) -> bool {
        self.0 & Self::ALLOW_OVERFLOW != 0
    }

    /// Returns `true` if the buffer has overflowed.
    #[must_use]
    pub const fn is_overflowed(self) -> bool {
        self.0 & Self::OVERFLOWED != 0
    }

    const fn with(self, bits: u8) -> Self {
        Self(self.0 | bits)
    }

    const fn without(self, bits: u8) -> Self {
        Self(self.0 & !bits)
    }
}

/// A named, fixed-capacity append buffer.
///
/// All wire writes go through [`reserve_space`](Self::reserve_space). A buffer
/// that disallows overflow treats an overrun as an internal fault; a buffer
/// that allows it clears itself, sets the overflowed flag, and silently drops
/// the content of every write until [`clear`](Self::clear) is called.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    name: String,
    data: Vec<u8>,
    len: usize,
    flags: BufferFlags,
}

impl ByteBuffer {
    /// Creates a buffer with exactly `capacity` bytes that fails hard on overrun.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            data: vec![0; capacity],
            len: 0,
            flags: BufferFlags::check_overflow(),
        }
    }

    /// Creates a buffer with at least [`MIN_ALLOC_SIZE`] bytes.
    #[must_use]
    pub fn allocate(name: impl Into<String>, size: usize) -> Self {
        Self::new(name, size.max(MIN_ALLOC_SIZE))
    }

    /// Creates a buffer with exactly `capacity` bytes that may overflow.
    #[must_use]
    pub fn overflowable(name: impl Into<String>, capacity: usize) -> Self {
        Self::new(name, capacity).with_flags(BufferFlags::allow_overflow())
    }

    /// Replaces the policy flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets or clears the allow-overflow policy in place.
    pub fn set_allow_overflow(&mut self, allow: bool) {
        self.flags = if allow {
            self.flags.with(BufferFlags::ALLOW_OVERFLOW)
        } else {
            self.flags.without(BufferFlags::ALLOW_OVERFLOW)
        };
    }

    /// Renames the buffer (used in diagnostics).
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the buffer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of bytes used.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes are used.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of bytes that can still be reserved without overflow.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Returns the current flags.
    #[must_use]
    pub const fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Returns `true` if the buffer overflowed since the last clear.
    #[must_use]
    pub const fn is_overflowed(&self) -> bool {
        self.flags.is_overflowed()
    }

    /// Returns the used bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Resets the length to zero and clears the overflowed flag.
    pub fn clear(&mut self) {
        self.flags = self.flags.without(BufferFlags::OVERFLOWED);
        self.len = 0;
    }

    /// Reserves `length` bytes at the end of the buffer.
    ///
    /// Returns `Ok(None)` when the buffer is overflowed; callers must skip the
    /// copy in that case.
    ///
    /// # Errors
    ///
    /// Returns an internal-fault [`BitError`] if the reservation does not fit
    /// and the buffer does not allow overflow.
    pub fn reserve_space(&mut self, length: usize) -> BitResult<Option<&mut [u8]>> {
        Ok(self.reserve_range(length)?.map(|range| &mut self.data[range]))
    }

    /// Appends bytes, skipping the copy when the buffer is overflowed.
    pub fn write(&mut self, bytes: &[u8]) -> BitResult<()> {
        if let Some(dst) = self.reserve_space(bytes.len())? {
            dst.copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Appends a NUL-terminated string.
    ///
    /// When the buffer already ends in a NUL, the new text overwrites it so
    /// consecutive prints form a single string.
    pub fn print(&mut self, text: &str) -> BitResult<()> {
        let bytes = text.as_bytes();
        let merge = self.len > 0 && self.data[self.len - 1] == 0;
        let reserve = if merge { bytes.len() } else { bytes.len() + 1 };

        if let Some(range) = self.reserve_range(reserve)? {
            let start = if merge { range.start - 1 } else { range.start };
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            self.data[start + bytes.len()] = 0;
        }
        Ok(())
    }

    fn reserve_range(&mut self, length: usize) -> BitResult<Option<Range<usize>>> {
        let capacity = self.capacity();
        if self.len + length > capacity {
            if !self.flags.allows_overflow() {
                return Err(if capacity == 0 {
                    BitError::UninitializedBuffer {
                        name: self.name.clone(),
                    }
                } else if length > capacity {
                    BitError::LengthExceedsCapacity {
                        name: self.name.clone(),
                        length,
                        capacity,
                    }
                } else {
                    BitError::OverflowDisallowed {
                        name: self.name.clone(),
                        length,
                        used: self.len,
                        capacity,
                    }
                });
            }

            warn!(buffer = %self.name, length, used = self.len, capacity, "buffer overflow");
            self.clear();
            self.flags = self.flags.with(BufferFlags::OVERFLOWED);

            if length > capacity {
                debug!(buffer = %self.name, length, capacity, "reservation larger than buffer, ignoring");
                return Ok(None);
            }
        }

        let start = self.len;
        self.len += length;
        if self.flags.is_overflowed() {
            return Ok(None);
        }
        Ok(Some(start..self.len))
    }
}
