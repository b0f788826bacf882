#![no_main]

use codec::{Baselines, CodecLimits, EntityId, EntityState, FieldListEncoder, PacketEntities, PacketEntitiesReader};
use libfuzzer_sys::fuzz_target;
use wire::MessageReader;

fuzz_target!(|data: &[u8]| {
    let limits = CodecLimits::default();
    let baselines = Baselines::new(900, &limits);
    let reader = PacketEntitiesReader::new(&baselines, &limits);
    let encoder = FieldListEncoder::default();

    let from = PacketEntities::new(vec![
        EntityState::new(EntityId::new(1), vec![0, 1]),
        EntityState::new(EntityId::new(33), vec![5]),
    ])
    .ok();

    let mut msg = MessageReader::new(data);
    let _ = reader.read(&encoder, &mut msg, from.as_ref());
});
