//! Inspection and decoding tools for captured replication messages.
//!
//! This crate provides utilities for understanding what a connection sent:
//!
//! - Summarize a message header and its per-kind record counts and sizes
//! - Decode every record into structured JSON or a readable listing
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to understand what the replicator is doing.
//! - **Same limits as the receiver** - A capture the tools accept is one a peer would accept.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;
use wire::{decode_message, Limits, MessageHeader, RecordKind};

/// Count and payload size of one record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub count: usize,
    pub payload_bytes: usize,
}

impl KindSummary {
    fn push(&mut self, payload_len: usize) {
        self.count += 1;
        self.payload_bytes += payload_len;
    }
}

/// Structural summary of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectReport {
    pub header: MessageHeader,
    pub byte_len: usize,
    pub creates: KindSummary,
    pub updates: KindSummary,
    pub deletes: KindSummary,
}

impl InspectReport {
    /// Bytes spent on framing rather than payload.
    #[must_use]
    pub const fn overhead_bytes(&self) -> usize {
        self.byte_len - self.creates.payload_bytes - self.updates.payload_bytes
    }
}

/// Decodes `bytes` and summarizes it per record kind.
pub fn inspect_message(bytes: &[u8], limits: &Limits) -> Result<InspectReport> {
    let message = decode_message(bytes, limits).context("decode message")?;
    let mut report = InspectReport {
        header: message.header,
        byte_len: bytes.len(),
        creates: KindSummary::default(),
        updates: KindSummary::default(),
        deletes: KindSummary::default(),
    };
    for record in &message.records {
        let summary = match record.kind {
            RecordKind::Create => &mut report.creates,
            RecordKind::Update => &mut report.updates,
            RecordKind::Delete => &mut report.deletes,
        };
        summary.push(record.payload.len());
    }
    Ok(report)
}

/// A fully decoded message, ready for `serde_json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedMessage {
    pub version: u16,
    pub flags: u16,
    pub record_count: u32,
    pub byte_len: usize,
    pub records: Vec<DecodedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedRecord {
    pub kind: &'static str,
    pub object_id: u32,
    pub payload_len: usize,
    /// Lowercase hex, empty for deletes.
    pub payload: String,
}

/// Decodes every record of `bytes`.
pub fn decode_message_json(bytes: &[u8], limits: &Limits) -> Result<DecodedMessage> {
    let message = decode_message(bytes, limits).context("decode message")?;
    let records = message
        .records
        .iter()
        .map(|record| DecodedRecord {
            kind: kind_name(record.kind),
            object_id: record.object_id,
            payload_len: record.payload.len(),
            payload: hex(record.payload),
        })
        .collect();
    Ok(DecodedMessage {
        version: message.header.version,
        flags: message.header.flags,
        record_count: message.header.record_count,
        byte_len: bytes.len(),
        records,
    })
}

/// One line per record, preceded by a header line.
#[must_use]
pub fn format_decode_pretty(message: &DecodedMessage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "version: {} flags: 0x{:04x} records: {} ({} bytes)",
        message.version, message.flags, message.record_count, message.byte_len
    );
    for record in &message.records {
        if record.payload.is_empty() {
            let _ = writeln!(out, "  {:<6} #{}", record.kind, record.object_id);
        } else {
            let _ = writeln!(
                out,
                "  {:<6} #{} [{} bytes] {}",
                record.kind, record.object_id, record.payload_len, record.payload
            );
        }
    }
    out
}

#[must_use]
pub const fn kind_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Create => "create",
        RecordKind::Update => "update",
        RecordKind::Delete => "delete",
    }
}

#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
