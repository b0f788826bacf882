#![no_main]

use libfuzzer_sys::fuzz_target;
use wire::{ConnectionlessPacket, InfoString, Limits};

fuzz_target!(|data: &[u8]| {
    for limits in [Limits::default(), Limits::for_testing()] {
        let Some(packet) = ConnectionlessPacket::parse(data, &limits) else {
            continue;
        };
        let command = &packet.command;
        let _ = packet.kind();
        let _ = command.args();
        for n in 0..=command.argc() {
            let _ = command.rest_after(n);
        }
        for i in 0..command.argc() {
            let mut info = InfoString::new(command.argv(i));
            if info.is_valid(&limits) {
                let _ = info.value_for_key("name");
                info.remove_key("password");
                let _ = info.set_value_for_key("name", "fuzz", &limits);
            }
        }
    }
});
