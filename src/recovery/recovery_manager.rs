use std::collections::HashSet;

use log::{debug, info};

use crate::buffer::PageTable;
use crate::common::{PageKey, Result, TransactionID};
use crate::log_mod::{LogEntry, LogFile, LogRecord};
use crate::storage::FileRegistry;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub committed: Vec<TransactionID>,
    pub aborted: Vec<TransactionID>,
    /// Transactions with no terminal record, rolled back by recovery.
    pub losers: Vec<TransactionID>,
    pub redone: usize,
    pub undone: usize,
}

/// Writes `image` as the content of `key`: through the cached copy when there
/// is one, and always to the file store.
fn apply_image(key: PageKey, image: &[u8], pages: &PageTable, files: &FileRegistry) -> Result<()> {
    let file = files.get(key.file)?;
    match pages.get(key) {
        Some(page) => {
            page.restore(image);
            file.flush_page(page)
        }
        None => file.write_page(key.page_no, image),
    }
}

/// Undoes the logged updates of `tid`, newest first, stopping at its begin
/// record. Pages stolen to disk are fixed in the file store even when they are
/// no longer cached.
pub fn rollback(
    log: &LogFile,
    tid: TransactionID,
    pages: &PageTable,
    files: &FileRegistry,
) -> Result<usize> {
    let mut undone = 0;
    for entry in log.records_rev()? {
        match &entry.record {
            LogRecord::Update {
                tid: owner,
                page,
                before,
                ..
            } if *owner == tid => {
                apply_image(*page, before, pages, files)?;
                undone += 1;
            }
            LogRecord::Begin(owner) if *owner == tid => break,
            _ => {}
        }
    }
    debug!("rolled back {} update(s) of {}", undone, tid);
    Ok(undone)
}

struct Analysis {
    committed: HashSet<TransactionID>,
    aborted: HashSet<TransactionID>,
    losers: HashSet<TransactionID>,
}

fn analysis_phase(logs: &[LogEntry]) -> Analysis {
    let mut committed = HashSet::new();
    let mut aborted = HashSet::new();
    let mut seen = HashSet::new();

    for entry in logs {
        let tid = entry.record.tid();
        match entry.record {
            LogRecord::Begin(_) => {
                // A reused id starts a fresh life.
                committed.remove(&tid);
                aborted.remove(&tid);
                seen.insert(tid);
            }
            LogRecord::Update { .. } => {
                seen.insert(tid);
            }
            // The last terminal record decides the outcome.
            LogRecord::Commit(_) => {
                aborted.remove(&tid);
                committed.insert(tid);
            }
            LogRecord::Abort(_) => {
                committed.remove(&tid);
                aborted.insert(tid);
            }
        }
    }

    let losers = seen
        .into_iter()
        .filter(|tid| !committed.contains(tid) && !aborted.contains(tid))
        .collect();

    Analysis {
        committed,
        aborted,
        losers,
    }
}

fn redo_phase(
    logs: &[LogEntry],
    committed: &HashSet<TransactionID>,
    pages: &PageTable,
    files: &FileRegistry,
) -> Result<usize> {
    let mut redone = 0;
    for entry in logs {
        if let LogRecord::Update {
            tid, page, after, ..
        } = &entry.record
        {
            if committed.contains(tid) {
                apply_image(*page, after, pages, files)?;
                redone += 1;
            }
        }
    }
    Ok(redone)
}

fn undo_phase(
    logs: &[LogEntry],
    losers: &HashSet<TransactionID>,
    pages: &PageTable,
    files: &FileRegistry,
) -> Result<usize> {
    let mut undone = 0;
    for entry in logs.iter().rev() {
        if let LogRecord::Update {
            tid, page, before, ..
        } = &entry.record
        {
            if losers.contains(tid) {
                apply_image(*page, before, pages, files)?;
                undone += 1;
            }
        }
    }
    Ok(undone)
}

fn sorted(set: &HashSet<TransactionID>) -> Vec<TransactionID> {
    let mut ids: Vec<TransactionID> = set.iter().copied().collect();
    ids.sort();
    ids
}

/// Startup recovery: redo every committed transaction's after-images in log
/// order, then undo every unfinished transaction's before-images in reverse
/// order and close it with an abort record.
///
/// Re-running converges to the same state: each step writes an absolute page
/// image, and the abort records written here mark the undone transactions as
/// finished.
pub fn recover(log: &mut LogFile, pages: &PageTable, files: &FileRegistry) -> Result<RecoveryReport> {
    let logs = log.records()?;
    if logs.is_empty() {
        debug!("recovery: log is empty");
        return Ok(RecoveryReport::default());
    }

    let analysis = analysis_phase(&logs);
    let redone = redo_phase(&logs, &analysis.committed, pages, files)?;
    let undone = undo_phase(&logs, &analysis.losers, pages, files)?;

    let losers = sorted(&analysis.losers);
    for tid in &losers {
        log.log_abort(*tid)?;
    }
    if !losers.is_empty() {
        log.force()?;
    }

    let report = RecoveryReport {
        committed: sorted(&analysis.committed),
        aborted: sorted(&analysis.aborted),
        losers,
        redone,
        undone,
    };
    info!(
        "recovery: {} committed, {} aborted, {} rolled back; {} redone, {} undone",
        report.committed.len(),
        report.aborted.len(),
        report.losers.len(),
        report.redone,
        report.undone
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FileId;

    fn entry(record: LogRecord) -> LogEntry {
        LogEntry { offset: 0, record }
    }

    #[test]
    fn analysis_classifies_transactions() {
        let (t1, t2, t3, t4) = (
            TransactionID(1),
            TransactionID(2),
            TransactionID(3),
            TransactionID(4),
        );
        let update = |tid| LogRecord::Update {
            tid,
            page: PageKey::new(FileId(1), 0),
            before: vec![0],
            after: vec![1],
        };
        let logs: Vec<LogEntry> = vec![
            LogRecord::Begin(t1),
            update(t1),
            LogRecord::Begin(t2),
            LogRecord::Commit(t1),
            LogRecord::Begin(t3),
            LogRecord::Abort(t2),
            update(t3),
            update(t4),
        ]
        .into_iter()
        .map(entry)
        .collect();

        let analysis = analysis_phase(&logs);
        assert_eq!(sorted(&analysis.committed), vec![t1]);
        assert_eq!(sorted(&analysis.aborted), vec![t2]);
        assert_eq!(sorted(&analysis.losers), vec![t3, t4]);
    }

    #[test]
    fn last_terminal_record_wins() {
        let (t1, t2) = (TransactionID(1), TransactionID(2));
        let logs: Vec<LogEntry> = vec![
            LogRecord::Begin(t1),
            LogRecord::Commit(t1),
            LogRecord::Abort(t1),
            LogRecord::Begin(t2),
            LogRecord::Abort(t2),
            LogRecord::Commit(t2),
        ]
        .into_iter()
        .map(entry)
        .collect();

        let analysis = analysis_phase(&logs);
        assert_eq!(sorted(&analysis.committed), vec![t2]);
        assert_eq!(sorted(&analysis.aborted), vec![t1]);
        assert!(analysis.losers.is_empty());
    }
}
