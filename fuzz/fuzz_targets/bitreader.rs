#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Input bytes pick a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 7;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_one_bit();
            }
            1 => {
                let bits = u32::from(data[idx - 1] % 40);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let bits = u32::from(data[idx - 1] % 40);
                let _ = reader.read_signed_bits(bits);
            }
            3 => {
                let _ = reader.read_bit_coord();
            }
            4 => {
                let _ = reader.read_bit_vec3_coord();
            }
            5 => {
                let _ = reader.read_bit_string();
            }
            _ => {
                let mut dst = [0u8; 16];
                reader.read_bit_data(&mut dst);
            }
        }
        if reader.is_bad_read() {
            break;
        }
    }
});
