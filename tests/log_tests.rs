use txdb::{
    common::{FileId, PageKey, Result, TransactionID},
    log_mod::{LogFile, LogRecord, LogRecordType},
};

#[test]
fn test_log_basic() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut log = LogFile::open(&dir.path().join("wal.log"))?;

    let txn_id = TransactionID(1);
    let page = PageKey::new(FileId(1), 3);

    log.log_begin(txn_id)?;
    log.log_update(txn_id, page, &[0; 10], &[1; 10])?;
    log.log_commit(txn_id)?;

    assert_eq!(log.get_total_log_records_of_type(LogRecordType::BeginRecord), 1);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::UpdateRecord), 1);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::CommitRecord), 1);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::AbortRecord), 0);
    assert_eq!(log.durable_len(), 0);

    log.force()?;
    assert!(log.durable_len() > 0);
    assert_eq!(log.force_count(), 1);
    Ok(())
}

#[test]
fn test_scans_in_both_directions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut log = LogFile::open(&dir.path().join("wal.log"))?;
    let (t1, t2) = (TransactionID(1), TransactionID(2));

    log.log_begin(t1)?;
    log.log_begin(t2)?;
    log.force()?;
    log.log_abort(t2)?;
    log.log_commit(t1)?;

    let forward: Vec<LogRecord> = log.records()?.into_iter().map(|e| e.record).collect();
    assert_eq!(
        forward,
        vec![
            LogRecord::Begin(t1),
            LogRecord::Begin(t2),
            LogRecord::Abort(t2),
            LogRecord::Commit(t1),
        ]
    );

    let backward: Vec<TransactionID> = log.records_rev()?.map(|e| e.record.tid()).collect();
    assert_eq!(backward, vec![t1, t2, t2, t1]);

    let offsets: Vec<u64> = log.records()?.into_iter().map(|e| e.offset).collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn test_forced_records_survive_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wal.log");
    let t1 = TransactionID(9);

    {
        let mut log = LogFile::open(&path)?;
        log.log_begin(t1)?;
        log.log_update(t1, PageKey::new(FileId(2), 0), b"before", b"after!")?;
        log.force()?;
    }

    let mut log = LogFile::open(&path)?;
    assert_eq!(log.get_total_log_records(), 2);
    log.log_commit(t1)?;
    log.force()?;

    let records: Vec<LogRecord> = log.records()?.into_iter().map(|e| e.record).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2], LogRecord::Commit(t1));
    Ok(())
}
