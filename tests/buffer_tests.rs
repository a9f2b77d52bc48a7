use std::sync::Arc;

use tempfile::TempDir;
use txdb::{
    log_mod::{LogRecord, LogRecordType},
    BufferPool, DbError, DbFile, FileId, HeapFile, LogFile, Permission, RecoveryPolicy, Result,
};

const PAGE_SIZE: usize = 64;

fn setup(capacity: usize, policy: RecoveryPolicy, pages: usize) -> Result<(TempDir, BufferPool, Arc<dyn DbFile>)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir()?;
    let log = LogFile::open(&dir.path().join("wal.log"))?;
    let pool = BufferPool::new(capacity, log, policy);

    let heap = HeapFile::in_memory(FileId(1), PAGE_SIZE);
    for _ in 0..pages {
        heap.allocate_page()?;
    }
    let file: Arc<dyn DbFile> = Arc::new(heap);
    pool.register_file(Arc::clone(&file));
    Ok((dir, pool, file))
}

#[test]
fn test_cache_never_exceeds_capacity() -> Result<()> {
    let (_dir, pool, file) = setup(3, RecoveryPolicy::NO_STEAL_FORCE, 10)?;
    let tid = pool.start_transaction()?;

    for page_no in [0, 1, 2, 3, 0, 4, 5, 9, 1, 8, 2, 7, 6, 3] {
        let page = pool.get_page(&file, page_no, tid, Permission::Read)?;
        assert_eq!(page.page_no(), page_no);
        assert!(pool.num_cached_pages() <= 3);
    }
    assert_eq!(pool.num_cached_pages(), 3);

    pool.commit_transaction(tid)?;
    Ok(())
}

#[test]
fn test_no_steal_reports_full_pool() -> Result<()> {
    let (_dir, pool, file) = setup(2, RecoveryPolicy::NO_STEAL_FORCE, 3)?;
    let tid = pool.start_transaction()?;

    for page_no in 0..2 {
        let page = pool.get_page(&file, page_no, tid, Permission::Write)?;
        page.write(tid, |data| data[0] = 1);
    }

    assert!(matches!(
        pool.get_page(&file, 2, tid, Permission::Read),
        Err(DbError::BufferPoolFull)
    ));
    // Nothing was written behind the transaction's back.
    assert_eq!(file.read_page(0)?.data(), vec![0u8; PAGE_SIZE]);
    assert_eq!(pool.num_cached_pages(), 2);
    assert!(pool.is_running(tid));

    pool.abort_transaction(tid)?;
    Ok(())
}

#[test]
fn test_clean_pages_are_evicted_before_dirty_ones() -> Result<()> {
    let (_dir, pool, file) = setup(2, RecoveryPolicy::NO_STEAL_FORCE, 3)?;
    let tid = pool.start_transaction()?;

    let dirty = pool.get_page(&file, 0, tid, Permission::Write)?;
    dirty.write(tid, |data| data[0] = 7);
    pool.get_page(&file, 1, tid, Permission::Read)?;
    pool.get_page(&file, 2, tid, Permission::Read)?;

    assert!(pool.cached_page(file.page_key(0)).is_some());
    assert!(pool.cached_page(file.page_key(1)).is_none());
    assert!(pool.cached_page(file.page_key(2)).is_some());

    pool.commit_transaction(tid)?;
    Ok(())
}

#[test]
fn test_steal_logs_before_writing_page() -> Result<()> {
    let (_dir, pool, file) = setup(2, RecoveryPolicy::STEAL_FORCE, 3)?;
    let tid = pool.start_transaction()?;

    for page_no in 0..2 {
        let page = pool.get_page(&file, page_no, tid, Permission::Write)?;
        page.write(tid, |data| data.fill(page_no as u8 + 1));
    }

    pool.get_page(&file, 2, tid, Permission::Read)?;
    assert!(pool.num_cached_pages() <= 2);

    let log = pool.log_file();
    let log = log.lock();
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::UpdateRecord), 1);
    assert!(!log.has_pending());
    let stolen = match log.records_rev()?.next().map(|e| e.record) {
        Some(LogRecord::Update { tid: owner, page, before, after }) => {
            assert_eq!(owner, tid);
            assert_eq!(before, vec![0u8; PAGE_SIZE]);
            assert_eq!(after, vec![page.page_no as u8 + 1; PAGE_SIZE]);
            page
        }
        other => panic!("expected an update record, got {:?}", other),
    };
    drop(log);

    assert_eq!(
        file.read_page(stolen.page_no)?.data(),
        vec![stolen.page_no as u8 + 1; PAGE_SIZE]
    );

    // Rolling back must fix the stolen page on disk even though it left the cache.
    pool.abort_transaction(tid)?;
    for page_no in 0..3 {
        assert_eq!(file.read_page(page_no)?.data(), vec![0u8; PAGE_SIZE]);
    }
    Ok(())
}

#[test]
fn test_steal_skips_pages_with_live_handles() -> Result<()> {
    let (_dir, pool, file) = setup(1, RecoveryPolicy::STEAL_FORCE, 2)?;
    let tid = pool.start_transaction()?;

    let page = pool.get_page(&file, 0, tid, Permission::Write)?;
    page.write(tid, |data| data[0] = 9);

    assert!(matches!(
        pool.get_page(&file, 1, tid, Permission::Read),
        Err(DbError::BufferPoolFull)
    ));

    drop(page);
    pool.get_page(&file, 1, tid, Permission::Read)?;
    pool.commit_transaction(tid)?;
    Ok(())
}

#[test]
fn test_flush_all_pages_cleans_cache() -> Result<()> {
    let (_dir, pool, file) = setup(4, RecoveryPolicy::NO_STEAL_FORCE, 2)?;
    let tid = pool.start_transaction()?;

    let page = pool.get_page(&file, 1, tid, Permission::Write)?;
    page.write(tid, |data| data[3] = 3);
    pool.flush_all_pages()?;

    assert!(!page.is_dirty());
    assert_eq!(file.read_page(1)?.read(|data| data[3]), 3);
    Ok(())
}
