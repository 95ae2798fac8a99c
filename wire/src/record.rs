//! Record framing for replication messages.
//!
//! A message is a [`MessageHeader`] followed by `record_count` records:
//!
//! ```text
//! kind: u8 | object_id: varu32 | [payload_len: varu32 | payload]
//! ```
//!
//! Create and Update carry a payload, Delete does not.

use bitstream::{BinaryStream, StreamError};

use crate::error::{DecodeError, EncodeError, LimitKind, WireResult};
use crate::header::{read_header, write_header, MessageHeader, HEADER_SIZE};
use crate::limits::Limits;

/// Record kinds for version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RecordKind {
    Create = 1,
    Update = 2,
    Delete = 3,
}

impl RecordKind {
    /// Parses a record kind from a raw byte.
    pub const fn parse(kind: u8) -> Result<Self, DecodeError> {
        match kind {
            1 => Ok(Self::Create),
            2 => Ok(Self::Update),
            3 => Ok(Self::Delete),
            _ => Err(DecodeError::UnknownRecordKind { kind }),
        }
    }

    /// Returns `true` if records of this kind carry a payload.
    #[must_use]
    pub const fn has_payload(self) -> bool {
        !matches!(self, Self::Delete)
    }
}

/// A record borrowed from a decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireRecord<'a> {
    pub kind: RecordKind,
    pub object_id: u32,
    /// Init data for Create, sync data for Update, empty for Delete.
    pub payload: &'a [u8],
}

/// A decoded replication message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaMessage<'a> {
    pub header: MessageHeader,
    pub records: Vec<WireRecord<'a>>,
}

/// Decodes a whole replication message.
///
/// Decoding is all-or-nothing: a truncated record, an unknown kind, or bytes
/// left over after the last declared record fail the entire message.
pub fn decode_message<'a>(buf: &'a [u8], limits: &Limits) -> WireResult<ReplicaMessage<'a>> {
    if buf.len() > limits.max_message_bytes {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::MessageBytes,
            limit: limits.max_message_bytes,
            actual: buf.len(),
        });
    }

    let mut stream = BinaryStream::reader(buf);
    let header = read_header(&mut stream)?;
    let count = header.record_count as usize;
    if count > limits.max_records {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::RecordCount,
            limit: limits.max_records,
            actual: count,
        });
    }

    // Every record takes at least two bytes, which bounds the allocation.
    let mut records = Vec::with_capacity(count.min(stream.remaining() / 2));
    for _ in 0..count {
        records.push(read_record(&mut stream, limits)?);
    }

    if stream.remaining() != 0 {
        return Err(DecodeError::TrailingBytes {
            records: header.record_count,
            remaining: stream.remaining(),
        });
    }

    Ok(ReplicaMessage { header, records })
}

fn read_record<'a>(stream: &mut BinaryStream<'a>, limits: &Limits) -> WireResult<WireRecord<'a>> {
    let mut raw_kind = 0u8;
    stream.serialize_u8(&mut raw_kind)?;
    let kind = RecordKind::parse(raw_kind)?;

    let mut object_id = 0u32;
    stream.serialize_varu32(&mut object_id)?;

    let payload = if kind.has_payload() {
        stream
            .read_blob(limits.max_payload_len)
            .map_err(|err| match err {
                StreamError::LengthExceeded { length, max } => DecodeError::LimitsExceeded {
                    kind: LimitKind::PayloadLength,
                    limit: max,
                    actual: length,
                },
                other => DecodeError::Stream(other),
            })?
    } else {
        &[]
    };

    Ok(WireRecord {
        kind,
        object_id,
        payload,
    })
}

/// Builds one replication message record by record.
///
/// Records are appended to an internal body buffer; [`finish_into`](Self::finish_into)
/// prepends the header once the record count is known.
#[derive(Debug)]
pub struct MessageWriter {
    body: BinaryStream<'static>,
    record_count: u32,
    max_records: usize,
    max_payload_len: usize,
    max_message_bytes: usize,
}

impl MessageWriter {
    /// Creates an empty writer bound to the given limits.
    #[must_use]
    pub fn new(limits: &Limits) -> Self {
        Self {
            body: BinaryStream::writer(),
            record_count: 0,
            max_records: limits.max_records,
            max_payload_len: limits.max_payload_len,
            max_message_bytes: limits.max_message_bytes,
        }
    }

    /// Number of records appended so far.
    #[must_use]
    pub const fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Returns `true` if no records have been appended.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Bytes the finished message will occupy.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body.offset()
    }

    /// Appends a Create record carrying the object's init data.
    pub fn push_create(&mut self, object_id: u32, init_data: &[u8]) -> Result<(), EncodeError> {
        self.push(RecordKind::Create, object_id, init_data)
    }

    /// Appends an Update record carrying the object's sync data.
    pub fn push_update(&mut self, object_id: u32, sync_data: &[u8]) -> Result<(), EncodeError> {
        self.push(RecordKind::Update, object_id, sync_data)
    }

    /// Appends a Delete record.
    pub fn push_delete(&mut self, object_id: u32) -> Result<(), EncodeError> {
        self.push(RecordKind::Delete, object_id, &[])
    }

    /// Appends a record of any kind. The payload is ignored for Delete.
    pub fn push(
        &mut self,
        kind: RecordKind,
        object_id: u32,
        payload: &[u8],
    ) -> Result<(), EncodeError> {
        if self.record_count as usize >= self.max_records {
            return Err(EncodeError::TooManyRecords {
                limit: self.max_records,
            });
        }
        if kind.has_payload() && payload.len() > self.max_payload_len {
            return Err(EncodeError::PayloadTooLarge {
                length: payload.len(),
                max: self.max_payload_len,
            });
        }

        let required = self
            .encoded_len()
            .saturating_add(record_len(kind, object_id, payload.len()));
        if required > self.max_message_bytes {
            return Err(EncodeError::MessageTooLarge {
                required,
                max: self.max_message_bytes,
            });
        }

        // Writer-mode primitives only fail on oversized blobs, checked above.
        let length = payload.len();
        let max = self.max_payload_len;
        let mut raw_kind = kind as u8;
        let mut id = object_id;
        let written = self
            .body
            .serialize_u8(&mut raw_kind)
            .and_then(|()| self.body.serialize_varu32(&mut id))
            .and_then(|()| {
                if kind.has_payload() {
                    self.body.write_blob(payload, max)
                } else {
                    Ok(())
                }
            });
        written.map_err(|_| EncodeError::PayloadTooLarge { length, max })?;
        self.record_count += 1;
        Ok(())
    }

    /// Writes header and records into `out`, replacing its contents.
    ///
    /// Reusing `out` across ticks keeps its allocation.
    pub fn finish_into(self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.encoded_len());
        write_header(&MessageHeader::new(self.record_count), out);
        out.extend_from_slice(self.body.data());
    }

    /// Finishes the message into a new buffer.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        self.finish_into(&mut out);
        out
    }
}

/// Encoded size of one record with a payload of `payload_len` bytes.
///
/// The payload length is ignored for Delete.
#[must_use]
pub fn record_len(kind: RecordKind, object_id: u32, payload_len: usize) -> usize {
    let mut len = 1 + varint_len(object_id);
    if kind.has_payload() {
        let prefix = u32::try_from(payload_len).map_or(5, varint_len);
        len = len.saturating_add(prefix).saturating_add(payload_len);
    }
    len
}

/// Size of a message holding only a Create with `init_len` bytes, followed by
/// an Update with `sync_len` bytes when `sync_len` is non-zero.
///
/// Assumes the widest object id, so the result holds for every id.
#[must_use]
pub fn create_message_len(init_len: usize, sync_len: usize) -> usize {
    let mut len = HEADER_SIZE.saturating_add(record_len(RecordKind::Create, u32::MAX, init_len));
    if sync_len > 0 {
        len = len.saturating_add(record_len(RecordKind::Update, u32::MAX, sync_len));
    }
    len
}

const fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}
