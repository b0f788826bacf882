//! Packet entity messages: the merge walk that turns two frames into records.

use bitstream::{BitReader, BitWriter, ByteBuffer};
use wire::{MessageReader, MessageWrite, SvcOp, ENTITY_SENTINEL};

use crate::baseline::Baselines;
use crate::encoder::{DeltaDescriptor, EntityDeltaEncoder};
use crate::entity::{EntityState, PacketEntities};
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::header::{
    read_delta_header, write_delta_header, DeltaHeader, HeaderContext, MAX_BASELINE_OFFSET,
};
use crate::limits::CodecLimits;
use crate::types::{EntityId, FrameSequence};

const TERMINATOR_BITS: u32 = 16;
const BASELINE_BIAS: i64 = 6;

/// The acknowledged frame a packet is delta-compressed against.
#[derive(Debug, Clone, Copy)]
pub struct DeltaSource<'a> {
    pub sequence: FrameSequence,
    pub entities: &'a PacketEntities,
}

/// Writes packet entity messages for one client.
#[derive(Debug, Clone)]
pub struct SnapshotDeltaBuilder<'a> {
    baselines: &'a Baselines,
    max_clients: u32,
    instanced_baselines: bool,
    search_window: usize,
}

impl<'a> SnapshotDeltaBuilder<'a> {
    /// Creates a builder drawing on `baselines`.
    #[must_use]
    pub fn new(baselines: &'a Baselines, limits: &CodecLimits) -> Self {
        Self {
            baselines,
            max_clients: 32,
            instanced_baselines: true,
            search_window: limits
                .baseline_search_window
                .min(MAX_BASELINE_OFFSET as usize),
        }
    }

    /// Sets how many entity numbers are player slots.
    #[must_use]
    pub const fn with_max_clients(mut self, max_clients: u32) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Enables or disables instance baselines for new entities.
    #[must_use]
    pub const fn with_instanced_baselines(mut self, enabled: bool) -> Self {
        self.instanced_baselines = enabled;
        self
    }

    /// Appends a packet entities message for `to` to `msg`.
    ///
    /// With a `from` frame the message is `svc_deltapacketentities` and only
    /// carries changes; without one every entity is added against a baseline.
    pub fn write<E>(
        &self,
        encoder: &mut E,
        msg: &mut ByteBuffer,
        to: &PacketEntities,
        from: Option<DeltaSource<'_>>,
    ) -> CodecResult<()>
    where
        E: EntityDeltaEncoder + ?Sized,
    {
        let count = to.len() as i16;
        match from {
            Some(src) => {
                msg.write_byte(SvcOp::DeltaPacketEntities.raw())?;
                msg.write_short(count)?;
                msg.write_byte(src.sequence.wire_byte())?;
            }
            None => {
                msg.write_byte(SvcOp::PacketEntities.raw())?;
                msg.write_short(count)?;
            }
        }

        let old = from.map_or(&[][..], |src| src.entities.as_slice());
        let new = to.as_slice();
        let full = from.is_none();
        let has_instance_baselines = !self.baselines.instances.is_empty();
        let update_ctx = HeaderContext {
            full: false,
            has_instance_baselines,
        };
        let add_ctx = HeaderContext {
            full,
            has_instance_baselines,
        };

        let mut writer = BitWriter::begin(msg);
        let mut numbase = 0u32;
        let (mut oldnum, mut newnum) = (0usize, 0usize);

        while newnum < new.len() || oldnum < old.len() {
            let newindex = new.get(newnum).map_or(ENTITY_SENTINEL, |s| s.number.raw());
            let oldindex = old.get(oldnum).map_or(ENTITY_SENTINEL, |s| s.number.raw());

            if newindex == oldindex {
                let to_state = &new[newnum];
                let custom = to_state.is_custom();
                let descriptor = DeltaDescriptor::select(newindex, custom, self.max_clients);
                let header = DeltaHeader::entity(to_state.number, custom);
                encoder.write_delta(
                    &old[oldnum],
                    to_state,
                    false,
                    descriptor,
                    &mut writer,
                    &mut |w: &mut BitWriter<'_>| {
                        write_delta_header(w, &mut numbase, &header, update_ctx)
                    },
                )?;
                oldnum += 1;
                newnum += 1;
                continue;
            }

            if newindex > oldindex {
                write_delta_header(
                    &mut writer,
                    &mut numbase,
                    &DeltaHeader::remove(EntityId::new(oldindex)),
                    update_ctx,
                )?;
                oldnum += 1;
                continue;
            }

            let to_state = &new[newnum];
            let custom = to_state.is_custom();
            let descriptor = DeltaDescriptor::select(newindex, custom, self.max_clients);
            let mut header = DeltaHeader::entity(to_state.number, custom);
            let mut baseline = self
                .baselines
                .statics
                .get(to_state.number)
                .ok_or(CodecError::MissingBaseline { number: newindex })?;

            if self.instanced_baselines
                && has_instance_baselines
                && newindex > self.baselines.statics.last_static()
            {
                if let Some((index, state)) = to_state
                    .class
                    .and_then(|class| self.baselines.instances.find(class))
                {
                    header.instance_baseline = Some(index);
                    baseline = state;
                }
            } else if full {
                let offset = self.find_best_baseline(&*encoder, new, newnum, baseline, descriptor);
                if offset > 0 {
                    header.offset = offset as u32;
                    baseline = &new[newnum - offset];
                }
            }

            encoder.write_delta(
                baseline,
                to_state,
                true,
                descriptor,
                &mut writer,
                &mut |w: &mut BitWriter<'_>| write_delta_header(w, &mut numbase, &header, add_ctx),
            )?;
            newnum += 1;
        }

        writer.write_bits(0, TERMINATOR_BITS)?;
        writer.end()?;
        Ok(())
    }

    /// Looks back through earlier entities of the same packet for a cheaper
    /// baseline than `baseline`, returning the distance to it (0 if none).
    ///
    /// A candidate must have the same entity type and cost strictly fewer
    /// bits; the scan runs backwards so the nearest of equal candidates wins.
    pub fn find_best_baseline<E>(
        &self,
        encoder: &E,
        entities: &[EntityState],
        index: usize,
        baseline: &EntityState,
        descriptor: DeltaDescriptor,
    ) -> usize
    where
        E: EntityDeltaEncoder + ?Sized,
    {
        let to = &entities[index];
        let mut best_bits = i64::from(encoder.test_delta(baseline, to, descriptor)) - BASELINE_BIAS;
        let mut best = index;

        let mut i = index;
        while best_bits > 0 && i > 0 && index - (i - 1) <= self.search_window {
            i -= 1;
            let candidate = &entities[i];
            if candidate.entity_type != to.entity_type {
                continue;
            }
            let bits = i64::from(encoder.test_delta(candidate, to, descriptor));
            if bits < best_bits {
                best_bits = bits;
                best = i;
            }
        }

        index - best
    }
}

/// The byte-aligned prefix of a packet entities message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketEntitiesHeader {
    /// Number of entities in the resulting frame.
    pub count: usize,
    /// Low byte of the frame the message is a delta against.
    pub delta_sequence: Option<u8>,
}

impl PacketEntitiesHeader {
    /// Reads the opcode, count and optional delta sequence.
    pub fn read(msg: &mut MessageReader<'_>) -> CodecResult<Self> {
        let op = msg.read_byte();
        if msg.is_bad_read() {
            return Err(CodecError::Truncated);
        }
        let op = SvcOp::parse(op as u8)?;
        let count = msg.read_short() as u16 as usize;
        let delta_sequence = match op {
            SvcOp::PacketEntities => None,
            SvcOp::DeltaPacketEntities => Some(msg.read_byte() as u8),
            other => return Err(CodecError::UnexpectedOpcode { op: other.raw() }),
        };
        if msg.is_bad_read() {
            return Err(CodecError::Truncated);
        }
        Ok(Self {
            count,
            delta_sequence,
        })
    }
}

/// Reads packet entity messages written by [`SnapshotDeltaBuilder`].
#[derive(Debug, Clone)]
pub struct PacketEntitiesReader<'a> {
    baselines: &'a Baselines,
    max_clients: u32,
    max_entities: usize,
}

impl<'a> PacketEntitiesReader<'a> {
    /// Creates a reader drawing on the same baselines as the writer.
    #[must_use]
    pub fn new(baselines: &'a Baselines, limits: &CodecLimits) -> Self {
        Self {
            baselines,
            max_clients: 32,
            max_entities: limits.max_packet_entities,
        }
    }

    /// Sets how many entity numbers are player slots.
    #[must_use]
    pub const fn with_max_clients(mut self, max_clients: u32) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Reads the record stream following `header`.
    ///
    /// `from` must be the frame named by `header.delta_sequence`.
    pub fn read_body<E>(
        &self,
        encoder: &E,
        msg: &mut MessageReader<'_>,
        header: &PacketEntitiesHeader,
        from: Option<&PacketEntities>,
    ) -> CodecResult<PacketEntities>
    where
        E: EntityDeltaEncoder + ?Sized,
    {
        if header.count > self.max_entities {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::PacketEntities,
                limit: self.max_entities,
                actual: header.count,
            });
        }
        let old = match (header.delta_sequence, from) {
            (Some(_), Some(frame)) => frame.as_slice(),
            (Some(sequence), None) => return Err(CodecError::MissingDeltaFrame { sequence }),
            (None, _) => &[][..],
        };
        let ctx = HeaderContext {
            full: header.delta_sequence.is_none(),
            has_instance_baselines: !self.baselines.instances.is_empty(),
        };

        let mut bits = msg.begin_bit_reading();
        let records = self.read_records(encoder, &mut bits, old, ctx);
        msg.end_bit_reading(bits.end());
        let entities = records?;
        if msg.is_bad_read() {
            return Err(CodecError::Truncated);
        }
        if entities.len() != header.count {
            return Err(CodecError::CountMismatch {
                expected: header.count,
                actual: entities.len(),
            });
        }
        PacketEntities::new(entities)
    }

    /// Reads a complete message, header included.
    pub fn read<E>(
        &self,
        encoder: &E,
        msg: &mut MessageReader<'_>,
        from: Option<&PacketEntities>,
    ) -> CodecResult<(PacketEntitiesHeader, PacketEntities)>
    where
        E: EntityDeltaEncoder + ?Sized,
    {
        let header = PacketEntitiesHeader::read(msg)?;
        let entities = self.read_body(encoder, msg, &header, from)?;
        Ok((header, entities))
    }

    fn read_records<E>(
        &self,
        encoder: &E,
        bits: &mut BitReader<'_>,
        old: &[EntityState],
        ctx: HeaderContext,
    ) -> CodecResult<Vec<EntityState>>
    where
        E: EntityDeltaEncoder + ?Sized,
    {
        let mut out: Vec<EntityState> = Vec::new();
        let mut oldnum = 0;
        let mut numbase = 0u32;

        loop {
            if bits.is_bad_read() {
                return Err(CodecError::Truncated);
            }
            if bits.peek_bits(TERMINATOR_BITS)? == 0 {
                bits.read_bits(TERMINATOR_BITS)?;
                break;
            }

            let header = read_delta_header(bits, &mut numbase, ctx)?;
            let number = header.number.raw();
            while oldnum < old.len() && old[oldnum].number.raw() < number {
                out.push(old[oldnum].clone());
                oldnum += 1;
            }
            if let Some(last) = out.last() {
                if last.number.raw() >= number {
                    return Err(CodecError::UnorderedRecord {
                        previous: last.number.raw(),
                        current: number,
                    });
                }
            }

            let descriptor = DeltaDescriptor::select(number, header.custom, self.max_clients);
            let previous = old
                .get(oldnum)
                .filter(|state| state.number == header.number);
            if previous.is_some() {
                oldnum += 1;
            }
            if header.remove {
                continue;
            }

            let baseline = if let Some(prev) = previous {
                prev
            } else if let Some(index) = header.instance_baseline {
                self.baselines
                    .instances
                    .get(index)
                    .ok_or(CodecError::MissingInstanceBaseline { index })?
            } else if header.offset > 0 {
                let offset = header.offset as usize;
                if offset > out.len() {
                    return Err(CodecError::InvalidBaselineOffset {
                        offset: header.offset,
                        available: out.len(),
                    });
                }
                &out[out.len() - offset]
            } else {
                self.baselines
                    .statics
                    .get(header.number)
                    .ok_or(CodecError::MissingBaseline { number })?
            };

            let mut state = encoder.read_delta(baseline, descriptor, bits)?;
            state.number = header.number;
            out.push(state);
        }

        out.extend(old[oldnum..].iter().cloned());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FieldListEncoder;
    use crate::types::{ClassId, EntityType};

    fn state(n: u32, fields: &[i32]) -> EntityState {
        EntityState::new(EntityId::new(n), fields.to_vec())
    }

    fn pack(states: Vec<EntityState>) -> PacketEntities {
        PacketEntities::new(states).unwrap()
    }

    fn baselines() -> Baselines {
        Baselines::new(128, &CodecLimits::default())
    }

    #[test]
    fn full_update_header_bytes() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let mut msg = ByteBuffer::new("msg", 256);
        builder
            .write(
                &mut FieldListEncoder::default(),
                &mut msg,
                &pack(vec![state(1, &[5])]),
                None,
            )
            .unwrap();
        let bytes = msg.as_slice();
        assert_eq!(bytes[0], 40);
        assert_eq!(&bytes[1..3], &[1, 0]);
    }

    #[test]
    fn delta_update_header_bytes() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let from = pack(vec![state(1, &[5])]);
        let mut msg = ByteBuffer::new("msg", 256);
        builder
            .write(
                &mut FieldListEncoder::default(),
                &mut msg,
                &from,
                Some(DeltaSource {
                    sequence: FrameSequence::new(0x1_07),
                    entities: &from,
                }),
            )
            .unwrap();
        // unchanged entity: header bytes, then only the 16-bit terminator
        assert_eq!(msg.as_slice(), &[41, 1, 0, 0x07, 0, 0]);
    }

    #[test]
    fn empty_full_update_is_just_terminator() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let mut msg = ByteBuffer::new("msg", 64);
        builder
            .write(
                &mut FieldListEncoder::default(),
                &mut msg,
                &PacketEntities::default(),
                None,
            )
            .unwrap();
        assert_eq!(msg.as_slice(), &[40, 0, 0, 0, 0]);
    }

    #[test]
    fn best_baseline_prefers_cheaper_neighbour() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let encoder = FieldListEncoder::default();
        let entities = vec![
            state(40, &[1, 2, 3, 4]),
            state(41, &[9, 9, 9, 9]),
            state(42, &[1, 2, 3, 5]),
        ];
        let static_baseline = baselines.statics.get(EntityId::new(42)).unwrap();
        let offset = builder.find_best_baseline(
            &encoder,
            &entities,
            2,
            static_baseline,
            DeltaDescriptor::Entity,
        );
        assert_eq!(offset, 2);
    }

    #[test]
    fn best_baseline_ignores_other_types() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let encoder = FieldListEncoder::default();
        let entities = vec![
            state(40, &[1, 2, 3, 4]).with_type(EntityType::BEAM),
            state(41, &[1, 2, 3, 4]),
        ];
        let static_baseline = baselines.statics.get(EntityId::new(41)).unwrap();
        let offset = builder.find_best_baseline(
            &encoder,
            &entities,
            1,
            static_baseline,
            DeltaDescriptor::Entity,
        );
        assert_eq!(offset, 0);
    }

    #[test]
    fn best_baseline_respects_window() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::for_testing());
        let encoder = FieldListEncoder::default();
        let mut entities = vec![state(10, &[7, 7, 7])];
        entities.extend((11..20).map(|n| state(n, &[n as i32, 0, 0])));
        entities.push(state(20, &[7, 7, 7]));
        let static_baseline = baselines.statics.get(EntityId::new(20)).unwrap();
        let index = entities.len() - 1;
        let offset = builder.find_best_baseline(
            &encoder,
            &entities,
            index,
            static_baseline,
            DeltaDescriptor::Entity,
        );
        assert!(offset <= 4);
        assert_ne!(offset, index);
    }

    #[test]
    fn instance_baseline_used_after_last_static() {
        let mut baselines = baselines();
        baselines.statics.set_last_static(50);
        baselines
            .instances
            .add(ClassId::new(3), state(0, &[100, 200]))
            .unwrap();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let mut encoder = FieldListEncoder::default();

        let to = pack(vec![
            state(10, &[100, 200]).with_class(ClassId::new(3)),
            state(60, &[100, 201]).with_class(ClassId::new(3)),
        ]);
        let mut msg = ByteBuffer::new("msg", 256);
        builder.write(&mut encoder, &mut msg, &to, None).unwrap();

        let reader = PacketEntitiesReader::new(&baselines, &CodecLimits::default());
        let mut input = MessageReader::new(msg.as_slice());
        let (header, decoded) = reader.read(&encoder, &mut input, None).unwrap();
        assert_eq!(header.delta_sequence, None);
        let fields: Vec<_> = decoded.iter().map(|s| s.fields.clone()).collect();
        assert_eq!(fields, vec![vec![100, 200], vec![100, 201]]);
    }

    #[test]
    fn delta_without_frame_is_rejected() {
        let baselines = baselines();
        let reader = PacketEntitiesReader::new(&baselines, &CodecLimits::default());
        let data = [41u8, 0, 0, 3, 0, 0];
        let mut input = MessageReader::new(&data);
        let err = reader
            .read(&FieldListEncoder::default(), &mut input, None)
            .unwrap_err();
        assert_eq!(err, CodecError::MissingDeltaFrame { sequence: 3 });
    }

    #[test]
    fn other_opcode_is_rejected() {
        let mut input = MessageReader::new(&[7u8, 0, 0, 0, 0]);
        let err = PacketEntitiesHeader::read(&mut input).unwrap_err();
        assert_eq!(err, CodecError::UnexpectedOpcode { op: 7 });
    }

    #[test]
    fn truncated_body_is_reported() {
        let baselines = baselines();
        let builder = SnapshotDeltaBuilder::new(&baselines, &CodecLimits::default());
        let mut encoder = FieldListEncoder::default();
        let to = pack(vec![state(3, &[1, 2, 3]), state(9, &[4, 5, 6])]);
        let mut msg = ByteBuffer::new("msg", 256);
        builder.write(&mut encoder, &mut msg, &to, None).unwrap();

        let cut = &msg.as_slice()[..msg.len() - 3];
        let reader = PacketEntitiesReader::new(&baselines, &CodecLimits::default());
        let err = reader
            .read(&encoder, &mut MessageReader::new(cut), None)
            .unwrap_err();
        assert!(!err.is_internal_fault());
    }
}
