use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::log_record::{decode_frames, encode_frame, LogEntry, LogRecord, LogRecordType};
use crate::common::{DbError, PageKey, Result, TransactionID};

/// Append-only write-ahead log.
///
/// Appends land in an in-memory tail; `force` writes the tail to the file and
/// syncs it. Nothing counts as durable until `force` has returned `Ok`.
pub struct LogFile {
    file: File,
    path: PathBuf,
    durable_len: u64,
    pending: Vec<u8>,
    pending_base: u64,
    record_counts: HashMap<LogRecordType, u64>,
    force_count: u64,
}

impl LogFile {
    /// Opens (or creates) the log at `path`. A torn frame at the end of an
    /// existing log is cut off.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (entries, valid_len) = decode_frames(&bytes, 0);
        if valid_len < bytes.len() {
            warn!(
                "truncating {} trailing bytes of torn log record in {}",
                bytes.len() - valid_len,
                path.display()
            );
            file.set_len(valid_len as u64)?;
            file.sync_data()?;
        }

        let mut record_counts = HashMap::new();
        for entry in &entries {
            *record_counts.entry(entry.record.record_type()).or_insert(0) += 1;
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            durable_len: valid_len as u64,
            pending: Vec::new(),
            pending_base: valid_len as u64,
            record_counts,
            force_count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, record: &LogRecord) -> Result<()> {
        encode_frame(record, &mut self.pending)?;
        *self.record_counts.entry(record.record_type()).or_insert(0) += 1;
        Ok(())
    }

    pub fn log_begin(&mut self, tid: TransactionID) -> Result<()> {
        self.append(&LogRecord::Begin(tid))
    }

    pub fn log_update(
        &mut self,
        tid: TransactionID,
        page: PageKey,
        before: &[u8],
        after: &[u8],
    ) -> Result<()> {
        self.append(&LogRecord::Update {
            tid,
            page,
            before: before.to_vec(),
            after: after.to_vec(),
        })
    }

    pub fn log_commit(&mut self, tid: TransactionID) -> Result<()> {
        self.append(&LogRecord::Commit(tid))
    }

    pub fn log_abort(&mut self, tid: TransactionID) -> Result<()> {
        self.append(&LogRecord::Abort(tid))
    }

    /// Writes every buffered record and waits for the device to acknowledge.
    pub fn force(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.file.seek(SeekFrom::Start(self.durable_len))?;
            self.file.write_all(&self.pending)?;
        }
        self.file.sync_data()?;

        self.durable_len += self.pending.len() as u64;
        self.pending.clear();
        self.pending_base = self.durable_len;
        self.force_count += 1;
        debug!("log forced, {} bytes durable", self.durable_len);
        Ok(())
    }

    /// Position in the buffered tail, for `discard_pending_from`.
    pub fn pending_mark(&self) -> usize {
        self.pending.len()
    }

    /// Drops every buffered record appended after `mark` and cuts the file
    /// back to its durable length, so bytes a failed `force` may have left
    /// past it are never read back as records.
    pub fn discard_pending_from(&mut self, mark: usize) -> Result<()> {
        if mark < self.pending.len() {
            let base = self.pending_base + mark as u64;
            let (dropped, _) = decode_frames(&self.pending[mark..], base);
            for entry in &dropped {
                if let Some(count) = self.record_counts.get_mut(&entry.record.record_type()) {
                    *count = count.saturating_sub(1);
                }
            }
            self.pending.truncate(mark);
            debug!("discarded {} buffered log record(s)", dropped.len());
        }
        self.file.set_len(self.durable_len)?;
        Ok(())
    }

    /// Every record in append order, buffered ones included.
    pub fn records(&self) -> Result<Vec<LogEntry>> {
        let mut bytes = vec![0u8; self.durable_len as usize];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut bytes)?;

        let (mut entries, valid_len) = decode_frames(&bytes, 0);
        if valid_len != bytes.len() {
            return Err(DbError::CorruptLog {
                offset: valid_len as u64,
            });
        }

        let (tail, tail_len) = decode_frames(&self.pending, self.pending_base);
        if tail_len != self.pending.len() {
            return Err(DbError::CorruptLog {
                offset: self.pending_base + tail_len as u64,
            });
        }
        entries.extend(tail);
        Ok(entries)
    }

    /// Every record, newest first.
    pub fn records_rev(&self) -> Result<impl Iterator<Item = LogEntry>> {
        Ok(self.records()?.into_iter().rev())
    }

    pub fn durable_len(&self) -> u64 {
        self.durable_len
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn force_count(&self) -> u64 {
        self.force_count
    }

    pub fn get_total_log_records(&self) -> u64 {
        self.record_counts.values().sum()
    }

    pub fn get_total_log_records_of_type(&self, record_type: LogRecordType) -> u64 {
        *self.record_counts.get(&record_type).unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FileId;

    #[test]
    fn unforced_records_are_lost_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let t1 = TransactionID(1);

        {
            let mut log = LogFile::open(&path).unwrap();
            log.log_begin(t1).unwrap();
            log.force().unwrap();
            log.log_commit(t1).unwrap();
            assert!(log.has_pending());
            assert_eq!(log.records().unwrap().len(), 2);
        }

        let log = LogFile::open(&path).unwrap();
        let records: Vec<LogRecord> = log.records().unwrap().into_iter().map(|e| e.record).collect();
        assert_eq!(records, vec![LogRecord::Begin(t1)]);
    }

    #[test]
    fn discarded_records_never_become_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let t1 = TransactionID(2);

        let mut log = LogFile::open(&path).unwrap();
        log.log_begin(t1).unwrap();
        let mark = log.pending_mark();
        log.log_update(t1, PageKey::new(FileId(1), 0), &[0; 2], &[9; 2])
            .unwrap();
        log.log_commit(t1).unwrap();

        log.discard_pending_from(mark).unwrap();
        assert_eq!(log.get_total_log_records(), 1);
        assert_eq!(log.get_total_log_records_of_type(LogRecordType::CommitRecord), 0);
        log.force().unwrap();
        drop(log);

        let log = LogFile::open(&path).unwrap();
        let records: Vec<LogRecord> = log.records().unwrap().into_iter().map(|e| e.record).collect();
        assert_eq!(records, vec![LogRecord::Begin(t1)]);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let t1 = TransactionID(4);

        let durable = {
            let mut log = LogFile::open(&path).unwrap();
            log.log_begin(t1).unwrap();
            log.log_update(t1, PageKey::new(FileId(1), 0), &[0; 4], &[1; 4])
                .unwrap();
            log.force().unwrap();
            log.durable_len()
        };
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[200, 0, 0, 0, 1, 2]).unwrap();
        }

        let log = LogFile::open(&path).unwrap();
        assert_eq!(log.durable_len(), durable);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), durable);
        assert_eq!(log.get_total_log_records(), 2);
        let newest = log.records_rev().unwrap().next().unwrap();
        assert_eq!(newest.record.record_type(), LogRecordType::UpdateRecord);
    }
}
