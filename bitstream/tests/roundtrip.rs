use bitstream::{BinaryStream, NetSerialize, StreamError, StreamResult};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Circle {
    pos: [f32; 3],
    radius: f32,
    color: [f32; 3],
}

impl NetSerialize for Circle {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        self.pos.serialize(stream)?;
        stream.serialize_f32(&mut self.radius)?;
        self.color.serialize(stream)
    }
}

#[test]
fn writer_then_reader_reproduces_fields() {
    let mut circle = Circle {
        pos: [-9.75, 3.25, 0.0],
        radius: 1.5,
        color: [0.0, 1.0, 0.0],
    };
    let bytes = bitstream::encode_to_vec(&mut circle).unwrap();
    assert_eq!(bytes.len(), 7 * 4);

    let mut decoded = Circle::default();
    bitstream::decode_from_slice(&bytes, &mut decoded).unwrap();
    assert_eq!(decoded, circle);
}

#[test]
fn one_byte_short_signals_truncation() {
    let mut circle = Circle {
        pos: [1.0, 2.0, 3.0],
        radius: 0.5,
        color: [0.5, 0.5, 0.5],
    };
    let bytes = bitstream::encode_to_vec(&mut circle).unwrap();

    let mut reader = BinaryStream::reader(&bytes[..bytes.len() - 1]);
    let mut decoded = Circle::default();
    let err = decoded.serialize(&mut reader).unwrap_err();
    assert_eq!(
        err,
        StreamError::UnexpectedEof {
            requested: 4,
            available: 3
        }
    );
}

#[test]
fn mixed_primitives_roundtrip() {
    let mut writer = BinaryStream::writer();
    writer.serialize_bool(&mut true).unwrap();
    writer.serialize_u16(&mut 0xBEEF).unwrap();
    writer.serialize_varu32(&mut 300).unwrap();
    writer.serialize_vars32(&mut -1).unwrap();
    writer.serialize_bytes(&mut [1u8, 2, 3]).unwrap();
    writer.serialize_blob(&mut vec![4, 5], 8).unwrap();
    writer.serialize_f64(&mut std::f64::consts::PI).unwrap();
    let bytes = writer.into_bytes().unwrap();

    let mut reader = BinaryStream::reader(&bytes);
    let mut flag = false;
    let mut short = 0u16;
    let mut var = 0u32;
    let mut signed = 0i32;
    let mut fixed = [0u8; 3];
    let mut blob = Vec::new();
    let mut pi = 0.0f64;
    reader.serialize_bool(&mut flag).unwrap();
    reader.serialize_u16(&mut short).unwrap();
    reader.serialize_varu32(&mut var).unwrap();
    reader.serialize_vars32(&mut signed).unwrap();
    reader.serialize_bytes(&mut fixed).unwrap();
    reader.serialize_blob(&mut blob, 8).unwrap();
    reader.serialize_f64(&mut pi).unwrap();

    assert!(flag);
    assert_eq!(short, 0xBEEF);
    assert_eq!(var, 300);
    assert_eq!(signed, -1);
    assert_eq!(fixed, [1, 2, 3]);
    assert_eq!(blob, vec![4, 5]);
    assert_eq!(pi.to_bits(), std::f64::consts::PI.to_bits());
    assert!(reader.is_exhausted());
}
