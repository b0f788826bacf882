//! Per-entity record headers inside a packet entities bit stream.
//!
//! Layout (bits):
//!
//! ```text
//! full update:   [next:1]  then unless next: [abs:1][number:11 | delta:6]
//! delta update:  [remove:1]            then: [abs:1][number:11 | delta:6]
//! unless remove: [custom:1]
//!                [instance:1][index:6]   only when instance baselines exist
//!                [offset:1][offset:6]    only for full updates without instance
//! ```
//!
//! `delta` is the distance from the previous record's number; gaps outside
//! `1..=63` fall back to the absolute 11-bit number.

use bitstream::{BitReader, BitResult, BitWriter};

use crate::types::EntityId;

const NUMBER_BITS: u32 = 11;
const DELTA_BITS: u32 = 6;
const MAX_NUMBER_DELTA: i64 = 63;

/// Widest baseline offset or instance index a header can carry.
pub const MAX_BASELINE_OFFSET: u32 = (1 << DELTA_BITS) - 1;

/// One record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaHeader {
    pub number: EntityId,
    /// The entity left the client's view; no body follows.
    pub remove: bool,
    /// The entity uses the custom descriptor.
    pub custom: bool,
    /// Index of the instance baseline the body is encoded against.
    pub instance_baseline: Option<u32>,
    /// Distance back to an earlier entity of this packet used as baseline.
    pub offset: u32,
}

impl DeltaHeader {
    /// Header for a removal.
    #[must_use]
    pub const fn remove(number: EntityId) -> Self {
        Self {
            number,
            remove: true,
            custom: false,
            instance_baseline: None,
            offset: 0,
        }
    }

    /// Header for an update or addition.
    #[must_use]
    pub const fn entity(number: EntityId, custom: bool) -> Self {
        Self {
            number,
            remove: false,
            custom,
            instance_baseline: None,
            offset: 0,
        }
    }
}

/// Shape of the stream a header belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderContext {
    /// The packet has no acknowledged frame to delta against.
    pub full: bool,
    /// The server has at least one instance baseline.
    pub has_instance_baselines: bool,
}

/// Writes `header` and advances `numbase` to its number.
pub fn write_delta_header(
    writer: &mut BitWriter<'_>,
    numbase: &mut u32,
    header: &DeltaHeader,
    ctx: HeaderContext,
) -> BitResult<()> {
    let num = header.number.raw();
    let delta = i64::from(num) - i64::from(*numbase);

    if ctx.full {
        writer.write_one_bit(delta == 1)?;
    } else {
        writer.write_one_bit(header.remove)?;
    }

    if !ctx.full || delta != 1 {
        if delta <= 0 || delta > MAX_NUMBER_DELTA {
            writer.write_one_bit(true)?;
            writer.write_bits(num, NUMBER_BITS)?;
        } else {
            writer.write_one_bit(false)?;
            writer.write_bits(delta as u32, DELTA_BITS)?;
        }
    }

    *numbase = num;
    if header.remove {
        return Ok(());
    }

    writer.write_one_bit(header.custom)?;
    if ctx.has_instance_baselines {
        match header.instance_baseline {
            Some(index) => {
                writer.write_one_bit(true)?;
                writer.write_bits(index, DELTA_BITS)?;
            }
            None => writer.write_one_bit(false)?,
        }
    }
    if ctx.full && header.instance_baseline.is_none() {
        if header.offset == 0 {
            writer.write_one_bit(false)?;
        } else {
            writer.write_one_bit(true)?;
            writer.write_bits(header.offset, DELTA_BITS)?;
        }
    }
    Ok(())
}

/// Reads a header written by [`write_delta_header`].
///
/// Truncation is reported through the reader's bad-read flag.
pub fn read_delta_header(
    reader: &mut BitReader<'_>,
    numbase: &mut u32,
    ctx: HeaderContext,
) -> BitResult<DeltaHeader> {
    let mut header = DeltaHeader::default();

    let next = if ctx.full {
        reader.read_one_bit()
    } else {
        header.remove = reader.read_one_bit();
        false
    };

    let num = if next {
        numbase.wrapping_add(1)
    } else if reader.read_one_bit() {
        reader.read_bits(NUMBER_BITS)?
    } else {
        numbase.wrapping_add(reader.read_bits(DELTA_BITS)?)
    };
    header.number = EntityId::new(num);
    *numbase = num;

    if header.remove {
        return Ok(header);
    }

    header.custom = reader.read_one_bit();
    if ctx.has_instance_baselines && reader.read_one_bit() {
        header.instance_baseline = Some(reader.read_bits(DELTA_BITS)?);
    }
    if ctx.full && header.instance_baseline.is_none() && reader.read_one_bit() {
        header.offset = reader.read_bits(DELTA_BITS)?;
    }
    Ok(header)
}
