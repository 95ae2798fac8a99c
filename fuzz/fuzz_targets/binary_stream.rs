#![no_main]

use bitstream::BinaryStream;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut stream = BinaryStream::reader(data);
    let mut idx = 0usize;

    // Use input bytes to drive a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 7;
        idx += 1;

        let result = match op {
            0 => stream.serialize_u8(&mut 0),
            1 => stream.serialize_u16(&mut 0),
            2 => stream.serialize_u32(&mut 0),
            3 => stream.serialize_f32(&mut 0.0),
            4 => stream.serialize_varu32(&mut 0),
            5 => stream.serialize_vars32(&mut 0),
            _ => stream.read_blob(256).map(|_| ()),
        };
        assert!(stream.offset() <= data.len());
        if result.is_err() {
            break;
        }
    }
});
