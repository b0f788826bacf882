use std::num::NonZeroUsize;

use bitstream::ByteBuffer;
use codec::{
    calc_ping, collect_visible, Baselines, ClientFrame, CodecLimits, DeltaSource, EntityId,
    EntityState, EntityType, FieldListEncoder, FrameHistory, FrameSequence, PacketEntities,
    PacketEntitiesReader, SnapshotDeltaBuilder,
};
use wire::MessageReader;

fn state(n: u32, fields: &[i32]) -> EntityState {
    EntityState::new(EntityId::new(n), fields.to_vec())
}

fn pack(states: Vec<EntityState>) -> PacketEntities {
    PacketEntities::new(states).unwrap()
}

fn same_wire_state(a: &PacketEntities, b: &PacketEntities) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.number, y.number);
        assert_eq!(x.entity_type, y.entity_type);
        assert_eq!(x.fields, y.fields);
    }
}

struct Link {
    baselines: Baselines,
    limits: CodecLimits,
    encoder: FieldListEncoder,
}

impl Link {
    fn new() -> Self {
        let limits = CodecLimits::default();
        Self {
            baselines: Baselines::new(512, &limits),
            limits,
            encoder: FieldListEncoder::default(),
        }
    }

    fn send(&mut self, to: &PacketEntities, from: Option<DeltaSource<'_>>) -> ByteBuffer {
        let builder = SnapshotDeltaBuilder::new(&self.baselines, &self.limits).with_max_clients(8);
        let mut msg = ByteBuffer::new("datagram", 4000);
        builder.write(&mut self.encoder, &mut msg, to, from).unwrap();
        msg
    }

    fn receive(&self, msg: &ByteBuffer, from: Option<&PacketEntities>) -> PacketEntities {
        let reader = PacketEntitiesReader::new(&self.baselines, &self.limits).with_max_clients(8);
        let mut input = MessageReader::new(msg.as_slice());
        let (_, entities) = reader.read(&self.encoder, &mut input, from).unwrap();
        assert!(input.remaining().is_empty());
        entities
    }
}

#[test]
fn full_then_delta_sequence() {
    let mut link = Link::new();

    let frame1 = pack(vec![
        state(1, &[100, 200, 0]),
        state(2, &[110, 200, 0]),
        state(40, &[5, 5, 5, 5]),
        state(41, &[5, 5, 5, 6]),
        state(300, &[-50, 12]).with_type(EntityType::BEAM),
    ]);
    let msg = link.send(&frame1, None);
    let seen1 = link.receive(&msg, None);
    same_wire_state(&seen1, &frame1);

    // 2 moves, 40 leaves, 41 unchanged, 77 appears, 300 changes
    let frame2 = pack(vec![
        state(1, &[100, 200, 0]),
        state(2, &[111, 201, 0]),
        state(41, &[5, 5, 5, 6]),
        state(77, &[1]),
        state(300, &[-51, 12]).with_type(EntityType::BEAM),
    ]);
    let msg = link.send(
        &frame2,
        Some(DeltaSource {
            sequence: FrameSequence::new(1),
            entities: &frame1,
        }),
    );
    assert_eq!(msg.as_slice()[0], 41);
    assert_eq!(msg.as_slice()[3], 1);
    let seen2 = link.receive(&msg, Some(&seen1));
    same_wire_state(&seen2, &frame2);
}

#[test]
fn delta_is_smaller_than_full_for_static_scene() {
    let mut link = Link::new();
    let frame = pack((50..120).map(|n| state(n, &[n as i32, 1, 2, 3])).collect());

    let full = link.send(&frame, None);
    let delta = link.send(
        &frame,
        Some(DeltaSource {
            sequence: FrameSequence::new(9),
            entities: &frame,
        }),
    );
    // nothing changed: opcode, count, sequence, terminator
    assert_eq!(delta.len(), 6);
    assert!(full.len() > delta.len());
}

#[test]
fn neighbour_baselines_shrink_full_updates() {
    let mut link = Link::new();
    let similar = pack((50..60).map(|n| state(n, &[7, 7, 7, 7, 7, n as i32])).collect());
    let msg = link.send(&similar, None);
    let seen = link.receive(&msg, None);
    same_wire_state(&seen, &similar);

    // entities sharing most fields with a neighbour only pay for the difference
    let mut unrelated = Link::new();
    let spread = pack(
        (50..60)
            .map(|n| state(n, &[n as i32, -(n as i32), n as i32 * 3, 1, 2, n as i32]))
            .collect(),
    );
    let spread_msg = unrelated.send(&spread, None);
    assert!(msg.len() < spread_msg.len());
}

#[test]
fn frame_history_drives_deltas_and_ping() {
    let mut link = Link::new();
    let mut history: FrameHistory<ClientFrame> =
        FrameHistory::new(NonZeroUsize::new(wire::UPDATE_BACKUP).unwrap());
    let mut client_view: Option<PacketEntities> = None;
    let limits = CodecLimits::default();

    for seq in 1..=5u32 {
        let visible = collect_visible(
            (1..=3).map(|n| state(n, &[n as i32 * 10, seq as i32])),
            &limits,
        )
        .unwrap();

        let acked = seq.checked_sub(1).map(FrameSequence::new);
        let source = acked
            .and_then(|s| history.get(s))
            .map(|frame| &frame.entities);
        let msg = link.send(
            &visible,
            source.zip(acked).map(|(entities, sequence)| DeltaSource {
                sequence,
                entities,
            }),
        );
        let seen = link.receive(&msg, source.and(client_view.as_ref()));
        same_wire_state(&seen, &visible);
        client_view = Some(seen);

        history
            .insert(
                FrameSequence::new(seq),
                ClientFrame {
                    sent_time: f64::from(seq),
                    ping_time: 0.08,
                    entities: visible,
                },
            )
            .unwrap();
    }

    let ping = calc_ping(&history, FrameSequence::new(6));
    assert!((79..=80).contains(&ping), "{ping}");
}
