use serde_derive::{Deserialize, Serialize};

use crate::common::{PageKey, Result, TransactionID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogRecordType {
    BeginRecord,
    CommitRecord,
    AbortRecord,
    UpdateRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    Begin(TransactionID),
    Update {
        tid: TransactionID,
        page: PageKey,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Commit(TransactionID),
    Abort(TransactionID),
}

impl LogRecord {
    pub fn tid(&self) -> TransactionID {
        match self {
            LogRecord::Begin(tid) | LogRecord::Commit(tid) | LogRecord::Abort(tid) => *tid,
            LogRecord::Update { tid, .. } => *tid,
        }
    }

    pub fn record_type(&self) -> LogRecordType {
        match self {
            LogRecord::Begin(_) => LogRecordType::BeginRecord,
            LogRecord::Update { .. } => LogRecordType::UpdateRecord,
            LogRecord::Commit(_) => LogRecordType::CommitRecord,
            LogRecord::Abort(_) => LogRecordType::AbortRecord,
        }
    }
}

/// A decoded record together with the byte offset its frame starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub offset: u64,
    pub record: LogRecord,
}

pub(crate) const FRAME_HEADER_SIZE: usize = 4;

/// Frame layout: little-endian `u32` payload length, then the bincode payload.
pub(crate) fn encode_frame(record: &LogRecord, out: &mut Vec<u8>) -> Result<()> {
    let payload = bincode::serialize(record)?;
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

/// Decodes whole frames from `bytes`, numbering offsets from `base`.
///
/// Returns the entries and the length of the well-formed prefix; anything
/// past that prefix is a torn or damaged frame.
pub(crate) fn decode_frames(bytes: &[u8], base: u64) -> (Vec<LogEntry>, usize) {
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos + FRAME_HEADER_SIZE <= bytes.len() {
        let mut len_buf = [0u8; FRAME_HEADER_SIZE];
        len_buf.copy_from_slice(&bytes[pos..pos + FRAME_HEADER_SIZE]);
        let len = u32::from_le_bytes(len_buf) as usize;

        let start = pos + FRAME_HEADER_SIZE;
        if start + len > bytes.len() {
            break;
        }
        let record: LogRecord = match bincode::deserialize(&bytes[start..start + len]) {
            Ok(record) => record,
            Err(_) => break,
        };

        entries.push(LogEntry {
            offset: base + pos as u64,
            record,
        });
        pos = start + len;
    }

    (entries, pos)
}
