use proptest::prelude::*;
use wire::{decode_message, DecodeError, Limits, MessageWriter, RecordKind, HEADER_SIZE};

#[derive(Clone, Debug)]
struct Record {
    kind: RecordKind,
    id: u32,
    payload: Vec<u8>,
}

fn record_strategy() -> impl Strategy<Value = Record> {
    let kind = prop_oneof![
        Just(RecordKind::Create),
        Just(RecordKind::Update),
        Just(RecordKind::Delete),
    ];
    (kind, any::<u32>(), prop::collection::vec(any::<u8>(), 0..32)).prop_map(
        |(kind, id, payload)| Record {
            kind,
            id,
            payload: if kind.has_payload() { payload } else { Vec::new() },
        },
    )
}

fn encode(records: &[Record]) -> Vec<u8> {
    let mut writer = MessageWriter::new(&Limits::for_testing());
    for record in records {
        writer.push(record.kind, record.id, &record.payload).unwrap();
    }
    writer.finish()
}

proptest! {
    #[test]
    fn prop_records_survive_encoding(records in prop::collection::vec(record_strategy(), 0..16)) {
        let bytes = encode(&records);
        let message = decode_message(&bytes, &Limits::for_testing()).unwrap();
        prop_assert_eq!(message.records.len(), records.len());
        for (decoded, original) in message.records.iter().zip(&records) {
            prop_assert_eq!(decoded.kind, original.kind);
            prop_assert_eq!(decoded.object_id, original.id);
            prop_assert_eq!(decoded.payload, original.payload.as_slice());
        }
    }

    #[test]
    fn prop_any_truncation_is_rejected(
        records in prop::collection::vec(record_strategy(), 1..8),
        cut in any::<prop::sample::Index>(),
    ) {
        let bytes = encode(&records);
        let len = HEADER_SIZE + cut.index(bytes.len() - HEADER_SIZE);
        prop_assert!(decode_message(&bytes[..len], &Limits::for_testing()).is_err());
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_message(&bytes, &Limits::for_testing());
    }

    #[test]
    fn prop_arbitrary_body_never_panics(body in prop::collection::vec(any::<u8>(), 0..128), count in 0u32..80) {
        let mut bytes = MessageWriter::new(&Limits::for_testing()).finish();
        bytes[8..12].copy_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&body);
        match decode_message(&bytes, &Limits::for_testing()) {
            Ok(message) => prop_assert_eq!(message.records.len(), count as usize),
            Err(DecodeError::LimitsExceeded { .. })
            | Err(DecodeError::UnknownRecordKind { .. })
            | Err(DecodeError::TrailingBytes { .. })
            | Err(DecodeError::Stream(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }
}
