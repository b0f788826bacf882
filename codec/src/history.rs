//! Per-client frame history keyed by outgoing sequence.

use std::num::NonZeroUsize;

use crate::error::{CodecError, CodecResult};
use crate::entity::PacketEntities;
use crate::types::FrameSequence;

/// One sent frame: when it left and what the client was shown.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    /// Server time the frame was sent.
    pub sent_time: f64,
    /// Round trip in seconds once acknowledged, negative until then.
    pub ping_time: f32,
    /// The entities written in this frame.
    pub entities: PacketEntities,
}

impl Default for ClientFrame {
    fn default() -> Self {
        Self {
            sent_time: 0.0,
            ping_time: -1.0,
            entities: PacketEntities::default(),
        }
    }
}

/// A fixed-capacity ring of frames indexed by `sequence & mask`.
///
/// Slots are overwritten cyclically and never individually freed. A lookup by
/// sequence only succeeds while the slot still holds that exact sequence.
#[derive(Debug)]
pub struct FrameHistory<T> {
    entries: Vec<Option<Entry<T>>>,
    mask: u32,
    last_sequence: Option<FrameSequence>,
}

#[derive(Debug)]
struct Entry<T> {
    sequence: FrameSequence,
    value: T,
}

impl<T> FrameHistory<T> {
    /// Creates a new history.
    ///
    /// The capacity is rounded up to a power of two.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get().next_power_of_two();
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            mask: (cap - 1) as u32,
            last_sequence: None,
        }
    }

    /// Returns the capacity of the history.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of frames stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Returns `true` if no frame has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_sequence.is_none()
    }

    /// Returns the newest sequence stored.
    #[must_use]
    pub const fn last_sequence(&self) -> Option<FrameSequence> {
        self.last_sequence
    }

    const fn index(&self, sequence: FrameSequence) -> usize {
        (sequence.raw() & self.mask) as usize
    }

    /// Stores a frame at `sequence`, overwriting whatever shared its slot.
    ///
    /// Sequences must not decrease; storing the newest sequence again
    /// replaces it.
    pub fn insert(&mut self, sequence: FrameSequence, value: T) -> CodecResult<()> {
        if let Some(last) = self.last_sequence {
            if sequence < last {
                return Err(CodecError::HistoryOutOfOrder {
                    last,
                    new: sequence,
                });
            }
        }

        let idx = self.index(sequence);
        self.entries[idx] = Some(Entry { sequence, value });
        self.last_sequence = Some(sequence);
        Ok(())
    }

    /// Returns the frame stored for an exact sequence, if it is still held.
    #[must_use]
    pub fn get(&self, sequence: FrameSequence) -> Option<&T> {
        self.entries[self.index(sequence)]
            .as_ref()
            .filter(|entry| entry.sequence == sequence)
            .map(|entry| &entry.value)
    }

    /// Mutable access to the frame stored for an exact sequence.
    pub fn get_mut(&mut self, sequence: FrameSequence) -> Option<&mut T> {
        let idx = self.index(sequence);
        self.entries[idx]
            .as_mut()
            .filter(|entry| entry.sequence == sequence)
            .map(|entry| &mut entry.value)
    }

    /// Returns whatever frame occupies the slot `sequence` maps to.
    ///
    /// Unlike [`get`](Self::get) this does not check that the slot still
    /// belongs to `sequence`.
    #[must_use]
    pub fn slot(&self, sequence: FrameSequence) -> Option<&T> {
        self.entries[self.index(sequence)]
            .as_ref()
            .map(|entry| &entry.value)
    }

    /// Drops every stored frame.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
        self.last_sequence = None;
    }

    /// Returns an iterator from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (FrameSequence, &T)> {
        let cap = self.entries.len() as u32;
        let (first, last) = self.last_sequence.map_or((1, 0), |last| {
            (last.raw().saturating_sub(cap - 1), last.raw())
        });
        (first..=last).filter_map(move |raw| {
            let sequence = FrameSequence::new(raw);
            self.get(sequence).map(|value| (sequence, value))
        })
    }
}
