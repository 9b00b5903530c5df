use serde::Serialize;
use serde_json::Value;

/// A single parsed log line, tracked by the position it was read from.
///
/// Records are immutable once produced. The tailer owns a record until it
/// is handed to the output queue; after that it belongs to the in-flight
/// batch until the batch is acknowledged.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Record {
    pub source: String,
    pub line: u64,
    pub offset: u64,
    pub payload: Value,
}

impl Record {
    /// Build a record from a raw line. The line is parsed as JSON; a line
    /// that is not valid JSON ships with a null payload rather than
    /// blocking delivery.
    pub fn new(source: &str, line: u64, offset: u64, text: &str) -> Self {
        let payload = serde_json::from_str(text).unwrap_or(Value::Null);
        Self {
            source: source.to_string(),
            line,
            offset,
            payload,
        }
    }

    /// Byte length of the re-encoded payload. Together with `offset` this
    /// determines the durable offset committed after a positive ack:
    /// `offset + encoded_len + 1` (the trailing newline).
    pub fn encoded_len(&self) -> u64 {
        serde_json::to_string(&self.payload)
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }

    /// The durable offset to commit once this record (as the last of its
    /// batch) has been positively acknowledged.
    pub fn next_offset(&self) -> u64 {
        self.offset + self.encoded_len() + 1
    }
}

/// An ordered, non-empty group of records from a single source, delivered
/// to the dispatcher as one unit. The router never merges records from
/// different sources into one batch.
pub type Batch = Vec<Record>;

/// Outcome notification for one delivered batch, keyed by its last record.
#[derive(Debug, Clone)]
pub struct Ack {
    pub record: Record,
    pub has_error: bool,
}

impl Ack {
    pub fn new(record: Record, has_error: bool) -> Self {
        Self { record, has_error }
    }
}
