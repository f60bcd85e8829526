//! Record Separator decoder
//!
//! The agent streams a JSON text sequence: UTF-8 JSON values separated by
//! the ASCII Record Separator (0x1E). There is no length prefix and no
//! enclosing array, so a record can arrive split across any number of
//! network chunks, and one chunk can carry many records plus the start of
//! the next.
//!
//! ```text
//! chunk 1: {"name":"working-set","value":123.4}␞{"name":"gc-heap
//! chunk 2: -size","value":45.6}␞
//!                                 │
//!                                 ▼
//!          working-set=123.4, gc-heap-size=45.6
//! ```
//!
//! [`RecordDecoder`] owns the not-yet-delimited bytes of exactly one
//! connection attempt. A new attempt gets a new decoder; partial data is
//! never carried across reconnects.

use crate::error::StreamError;
use bytes::{Buf, BytesMut};
use livemetrics_core::MetricRecord;

/// ASCII Record Separator
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Default cap on bytes buffered for a single record (1 MiB)
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Incremental decoder for Record Separator framed JSON
///
/// Push chunks with [`push`](Self::push), then drain complete records with
/// [`next_record`](Self::next_record) until it returns `None`. When the
/// connection ends, [`finish`](Self::finish) parses whatever trailing
/// content is left.
///
/// Bytes (not chars) are buffered, so a multi-byte UTF-8 sequence split
/// across chunks is reassembled before it is decoded. 0x1E never occurs
/// inside a multi-byte sequence, so scanning bytes is safe.
#[derive(Debug)]
pub struct RecordDecoder {
    buffer: BytesMut,
    /// Bytes already scanned without finding a separator
    scanned: usize,
    max_record_bytes: usize,
    /// Dropping the tail of an oversized record until the next separator
    discarding: bool,
}

impl RecordDecoder {
    /// Create a decoder with the default record size limit
    pub fn new() -> Self {
        Self::with_max_record_bytes(DEFAULT_MAX_RECORD_BYTES)
    }

    /// Create a decoder that gives up on records larger than `limit` bytes
    pub fn with_max_record_bytes(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_record_bytes: limit.max(1),
            discarding: false,
        }
    }

    /// Append a chunk received from the network
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete record, if a separator has arrived
    ///
    /// Returns:
    /// - `Some(Ok(record))` for a delimited segment that parsed
    /// - `Some(Err(StreamError::Decode))` for a delimited segment that did not
    /// - `Some(Err(StreamError::Oversized))` once per record that outgrew the limit
    /// - `None` when no separator remains; the remainder stays buffered
    ///
    /// Whitespace-only segments (including empty ones between adjacent
    /// separators) are skipped.
    pub fn next_record(&mut self) -> Option<Result<MetricRecord, StreamError>> {
        loop {
            let found = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == RECORD_SEPARATOR)
                .map(|offset| self.scanned + offset);

            let Some(pos) = found else {
                return self.check_overflow();
            };

            let segment = self.buffer.split_to(pos);
            self.buffer.advance(1);
            self.scanned = 0;

            if std::mem::take(&mut self.discarding) {
                continue;
            }

            if let Some(decoded) = parse_segment(&segment) {
                return Some(decoded);
            }
        }
    }

    /// Parse trailing content left when the connection ends
    ///
    /// Returns `None` when the buffer is empty or whitespace. The buffer is
    /// cleared either way.
    pub fn finish(&mut self) -> Option<Result<MetricRecord, StreamError>> {
        let segment = self.buffer.split();
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        parse_segment(&segment)
    }

    /// Number of bytes waiting for a separator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Whether any bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn check_overflow(&mut self) -> Option<Result<MetricRecord, StreamError>> {
        self.scanned = self.buffer.len();

        if self.discarding {
            self.buffer.clear();
            self.scanned = 0;
            return None;
        }

        if self.buffer.len() > self.max_record_bytes {
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
            return Some(Err(StreamError::Oversized {
                limit: self.max_record_bytes,
            }));
        }

        None
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim and parse one segment; `None` for whitespace-only segments
fn parse_segment(segment: &[u8]) -> Option<Result<MetricRecord, StreamError>> {
    let text = match std::str::from_utf8(segment) {
        Ok(text) => text,
        Err(e) => return Some(Err(StreamError::Decode(format!("invalid UTF-8: {e}")))),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(
        MetricRecord::from_json(trimmed)
            .map_err(|e| StreamError::Decode(format!("invalid JSON: {e}"))),
    )
}
