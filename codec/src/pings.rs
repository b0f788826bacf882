//! The ping and packet loss table sent to clients.

use bitstream::{BitResult, ByteBuffer};
use wire::{write_bit_section, MessageReader, MessageWrite, SvcOp};

use crate::history::{ClientFrame, FrameHistory};
use crate::types::FrameSequence;

const SLOT_BITS: u32 = 5;
const PING_BITS: u32 = 12;
const LOSS_BITS: u32 = 7;

/// One row of the ping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRow {
    pub slot: u32,
    /// Milliseconds; saturates at 4095 on the wire.
    pub ping: u32,
    /// Percent; saturates at 127 on the wire.
    pub loss: u32,
}

/// Appends `svc_pings` with one row per active client.
pub fn write_pings<I>(msg: &mut ByteBuffer, rows: I) -> BitResult<()>
where
    I: IntoIterator<Item = PingRow>,
{
    msg.write_byte(SvcOp::Pings.raw())?;
    write_bit_section(msg, |w| {
        for row in rows {
            w.write_one_bit(true)?;
            w.write_bits(row.slot, SLOT_BITS)?;
            w.write_bits(row.ping, PING_BITS)?;
            w.write_bits(row.loss, LOSS_BITS)?;
        }
        w.write_one_bit(false)
    })
}

/// Reads the rows of a ping table whose opcode was already consumed.
pub fn read_pings(msg: &mut MessageReader<'_>) -> Vec<PingRow> {
    msg.read_bit_section(|bits| {
        let mut rows = Vec::new();
        while !bits.is_bad_read() && bits.read_one_bit() {
            let slot = bits.read_bits(SLOT_BITS).unwrap_or_default();
            let ping = bits.read_bits(PING_BITS).unwrap_or_default();
            let loss = bits.read_bits(LOSS_BITS).unwrap_or_default();
            if bits.is_bad_read() {
                break;
            }
            rows.push(PingRow { slot, ping, loss });
        }
        rows
    })
}

/// Average round trip over recently acknowledged frames, in milliseconds.
///
/// Looks at the frames just before `incoming_acknowledged`: half the history
/// when it holds fewer than 32 frames, otherwise 16. Frames that were never
/// acknowledged are skipped.
#[must_use]
pub fn calc_ping(frames: &FrameHistory<ClientFrame>, incoming_acknowledged: FrameSequence) -> u32 {
    let capacity = frames.capacity();
    let back = if capacity <= 31 { capacity / 2 } else { 16 };

    let mut total = 0.0f32;
    let mut count = 0u32;
    for i in 0..back as u32 {
        let sequence = FrameSequence::new(incoming_acknowledged.raw().wrapping_sub(i + 1));
        if let Some(frame) = frames.slot(sequence) {
            if frame.ping_time > 0.0 {
                total += frame.ping_time;
                count += 1;
            }
        }
    }

    if count == 0 {
        return 0;
    }
    let average = total / count as f32;
    if average > 0.0 {
        (average * 1000.0) as u32
    } else {
        0
    }
}
