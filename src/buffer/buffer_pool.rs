use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use super::page_table::PageTable;
use crate::common::{DbError, PageKey, Permission, RecoveryPolicy, Result, TransactionID};
use crate::lock::{LockManager, LockOutcome};
use crate::log_mod::LogFile;
use crate::recovery::{self, RecoveryReport};
use crate::storage::{DbFile, FileRegistry, Page};
use crate::transaction::{TransactionStatus, TransactionTable};

/// Everything guarded by the coordinating lock.
struct PoolState {
    pages: PageTable,
    locks: LockManager,
    transactions: TransactionTable,
    // Per-page queues of callers parked on a `Wait` outcome.
    wait_queues: HashMap<PageKey, Arc<Condvar>>,
}

/// Bounded page cache and the transaction front door of the engine.
///
/// Page cache, lock table and transaction table share one coordinating mutex;
/// every mutation of them happens under a guard that is released on all exit
/// paths. The log sits behind its own mutex and is only taken while the
/// coordinating lock is held.
pub struct BufferPool {
    max_pages: usize,
    policy: RecoveryPolicy,
    state: Mutex<PoolState>,
    log: Arc<Mutex<LogFile>>,
    files: FileRegistry,
}

impl BufferPool {
    pub fn new(max_pages: usize, log: LogFile, policy: RecoveryPolicy) -> Self {
        Self {
            max_pages,
            policy,
            state: Mutex::new(PoolState {
                pages: PageTable::new(),
                locks: LockManager::new(),
                transactions: TransactionTable::new(),
                wait_queues: HashMap::new(),
            }),
            log: Arc::new(Mutex::new(log)),
            files: FileRegistry::new(),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn policy(&self) -> RecoveryPolicy {
        self.policy
    }

    pub fn log_file(&self) -> Arc<Mutex<LogFile>> {
        Arc::clone(&self.log)
    }

    /// Makes a file store resolvable from page keys found in the log.
    pub fn register_file(&self, file: Arc<dyn DbFile>) {
        self.files.register(file);
    }

    pub fn num_cached_pages(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn cached_page(&self, key: PageKey) -> Option<Arc<Page>> {
        self.state.lock().pages.get(key).cloned()
    }

    pub fn is_running(&self, tid: TransactionID) -> bool {
        self.state.lock().transactions.is_active(tid)
    }

    pub fn transaction_status(&self, tid: TransactionID) -> Option<TransactionStatus> {
        self.state.lock().transactions.status(tid)
    }

    pub fn write_locked_pages(&self, tid: TransactionID) -> Vec<PageKey> {
        self.state.lock().locks.write_locked_pages(tid)
    }

    /// The page `tid` is currently parked on, if any.
    pub fn waiting_on(&self, tid: TransactionID) -> Option<PageKey> {
        self.state.lock().locks.waiting_on(tid)
    }

    /// Replays the log against the registered files. Must run before the
    /// first transaction begins; an empty log is a no-op.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let state = self.state.lock();
        if state.transactions.active_count() > 0 {
            return Err(DbError::Other(
                "recovery requires that no transaction is running".to_string(),
            ));
        }
        let mut log = self.log.lock();
        recovery::recover(&mut log, &state.pages, &self.files)
    }

    pub fn begin_transaction(&self, tid: TransactionID) -> Result<()> {
        let mut state = self.state.lock();
        state.transactions.begin(tid)?;
        if let Err(err) = self.log.lock().log_begin(tid) {
            state.transactions.finish(tid, TransactionStatus::Aborted);
            return Err(err);
        }
        debug!("{} began", tid);
        Ok(())
    }

    /// Begins a transaction under a freshly allocated id.
    pub fn start_transaction(&self) -> Result<TransactionID> {
        let tid = TransactionID::fresh();
        self.begin_transaction(tid)?;
        Ok(tid)
    }

    /// Returns page `page_no` of `file`, locked for `tid` with `perm`.
    ///
    /// Blocks while the lock is held incompatibly by another transaction. If
    /// waiting would deadlock, `tid` is aborted and `TransactionAborted` is
    /// returned; the transaction is gone and only a new one may retry.
    ///
    /// Under STEAL, a dirty page is never stolen while its writer still holds
    /// the handle returned here. Callers that keep every handle alive can
    /// therefore still see `BufferPoolFull`; drop handles once done writing.
    pub fn get_page(
        &self,
        file: &Arc<dyn DbFile>,
        page_no: usize,
        tid: TransactionID,
        perm: Permission,
    ) -> Result<Arc<Page>> {
        self.files.register(Arc::clone(file));
        let key = file.page_key(page_no);
        let mut state = self.state.lock();

        loop {
            // Re-checked after every wake-up: an abort may have happened meanwhile.
            if !state.transactions.is_active(tid) {
                return Err(state.transactions.inactive_error(tid));
            }

            let page = self.ensure_cached(&mut state, file.as_ref(), key)?;

            match state.locks.try_lock(key, tid, perm) {
                LockOutcome::Grant => return Ok(page),
                LockOutcome::Wait => {
                    drop(page);
                    let queue = Arc::clone(state.wait_queues.entry(key).or_default());
                    queue.wait(&mut state);
                }
                LockOutcome::Abort => {
                    drop(page);
                    self.abort_locked(&mut state, tid)?;
                    return Err(DbError::TransactionAborted(tid));
                }
            }
        }
    }

    fn ensure_cached(
        &self,
        state: &mut PoolState,
        file: &dyn DbFile,
        key: PageKey,
    ) -> Result<Arc<Page>> {
        if let Some(page) = state.pages.get(key) {
            return Ok(Arc::clone(page));
        }
        if state.pages.len() >= self.max_pages {
            self.evict_page(state)?;
        }

        let page = Arc::new(file.read_page(key.page_no)?);
        state.pages.insert(Arc::clone(&page));
        Ok(page)
    }

    // A page is pinned while an active transaction holds it exclusively and a
    // handle to it is still out; evicting it would split the holder's copy
    // from the cache.
    fn is_pinned(state: &PoolState, page: &Arc<Page>) -> bool {
        match state.locks.exclusive_holder(page.key()) {
            Some(holder) => state.transactions.is_active(holder) && Arc::strong_count(page) > 1,
            None => false,
        }
    }

    fn find_page(
        state: &PoolState,
        pred: impl Fn(&PoolState, &Arc<Page>) -> bool,
    ) -> Option<Arc<Page>> {
        state.pages.iter().find(|page| pred(state, page)).cloned()
    }

    fn evict_page(&self, state: &mut PoolState) -> Result<()> {
        // First choice: any clean page.
        let clean = Self::find_page(state, |s, page| {
            !page.is_dirty() && !Self::is_pinned(s, page)
        });
        if let Some(page) = clean {
            state.pages.remove(page.key());
            debug!("evicted clean page {}", page.key());
            return Ok(());
        }

        // Dirty pages of finished transactions (NO-FORCE): already logged.
        let committed = Self::find_page(state, |s, page| match page.dirtier() {
            Some(owner) => !s.transactions.is_active(owner) && !Self::is_pinned(s, page),
            None => false,
        });
        if let Some(page) = committed {
            self.write_back(&page)?;
            page.mark_clean();
            state.pages.remove(page.key());
            debug!("flushed and evicted committed page {}", page.key());
            return Ok(());
        }

        if !self.policy.steal {
            return Err(DbError::BufferPoolFull);
        }

        let stolen = Self::find_page(state, |s, page| match page.dirtier() {
            Some(owner) => s.transactions.is_active(owner) && !Self::is_pinned(s, page),
            None => false,
        });
        let page = match stolen {
            Some(page) => page,
            None => return Err(DbError::BufferPoolFull),
        };
        let owner = match page.dirtier() {
            Some(owner) => owner,
            None => return Err(DbError::BufferPoolFull),
        };

        // The update record must be durable before the page reaches the file.
        {
            let mut log = self.log.lock();
            log.log_update(owner, page.key(), &page.before_image(), &page.data())?;
            log.force()?;
        }
        self.write_back(&page)?;
        state.pages.remove(page.key());
        info!("stole page {} dirtied by active {}", page.key(), owner);
        Ok(())
    }

    /// Commits `tid`: its updates and commit record are forced to the log,
    /// then under FORCE its dirty pages are written to their files.
    ///
    /// If the log cannot be forced, the records are discarded and `tid` stays
    /// running. Once the commit record is durable the transaction is finished
    /// as committed even if a page write fails; that page stays cached and
    /// dirty, and the write error is returned.
    pub fn commit_transaction(&self, tid: TransactionID) -> Result<()> {
        let mut state = self.state.lock();
        if !state.transactions.is_active(tid) {
            return Err(state.transactions.inactive_error(tid));
        }

        let dirty: Vec<Arc<Page>> = state
            .locks
            .write_locked_pages(tid)
            .into_iter()
            .filter_map(|key| state.pages.get(key).cloned())
            .filter(|page| page.is_dirty())
            .collect();

        {
            let mut log = self.log.lock();
            let mark = log.pending_mark();
            if let Err(err) = Self::log_commit_records(&mut log, tid, &dirty) {
                if let Err(discard_err) = log.discard_pending_from(mark) {
                    warn!("could not discard commit records of {}: {}", tid, discard_err);
                }
                warn!("{} failed to commit: {}", tid, err);
                return Err(err);
            }
        }
        for page in &dirty {
            // Later undo is relative to this commit point.
            page.set_before_image();
        }

        state.transactions.finish(tid, TransactionStatus::Committed);
        Self::release_and_wake(&mut state, tid);

        let mut result = Ok(());
        if self.policy.force {
            for page in &dirty {
                match self.write_back(page) {
                    Ok(()) => page.mark_clean(),
                    Err(err) => {
                        warn!("{} committed but page {} was not written: {}", tid, page.key(), err);
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                }
            }
        }
        info!("{} committed, {} page(s) written", tid, dirty.len());
        result
    }

    fn log_commit_records(log: &mut LogFile, tid: TransactionID, dirty: &[Arc<Page>]) -> Result<()> {
        for page in dirty {
            log.log_update(tid, page.key(), &page.before_image(), &page.data())?;
        }
        log.log_commit(tid)?;
        log.force()
    }

    fn write_back(&self, page: &Page) -> Result<()> {
        self.files.get(page.file_id())?.flush_page(page)
    }

    /// Aborts `tid`, undoing every change it made.
    ///
    /// If the undo itself fails, `tid` stays running and the abort may be
    /// retried. Otherwise the transaction is finished as aborted; a later
    /// failure to write a page back or to force the abort record is still
    /// returned, with the page kept cached and dirty.
    pub fn abort_transaction(&self, tid: TransactionID) -> Result<()> {
        let mut state = self.state.lock();
        if !state.transactions.is_active(tid) {
            return Err(state.transactions.inactive_error(tid));
        }
        self.abort_locked(&mut state, tid)
    }

    fn abort_locked(&self, state: &mut PoolState, tid: TransactionID) -> Result<()> {
        let mut log = self.log.lock();
        // Without STEAL an active transaction has no update records yet.
        if self.policy.steal {
            recovery::rollback(&log, tid, &state.pages, &self.files)?;
        }

        let mut result = Ok(());
        for key in state.locks.write_locked_pages(tid) {
            let page = match state.pages.get(key) {
                Some(page) => Arc::clone(page),
                None => continue,
            };
            // A dirty page's before-image is its content as of the last
            // commit, which the file store may not have seen yet.
            if page.is_dirty() {
                page.restore(&page.before_image());
                if let Err(err) = self.write_back(&page) {
                    warn!("page {} kept dirty after abort of {}: {}", key, tid, err);
                    page.set_dirty(tid, true);
                    if result.is_ok() {
                        result = Err(err);
                    }
                    continue;
                }
            }
            state.pages.remove(key);
        }

        let logged = match log.log_abort(tid) {
            Ok(()) => log.force(),
            Err(err) => Err(err),
        };
        if let Err(err) = logged {
            warn!("abort record of {} not forced: {}", tid, err);
            if result.is_ok() {
                result = Err(err);
            }
        }
        drop(log);

        state.transactions.finish(tid, TransactionStatus::Aborted);
        Self::release_and_wake(state, tid);
        info!("{} aborted", tid);
        result
    }

    fn release_and_wake(state: &mut PoolState, tid: TransactionID) {
        for key in state.locks.release_locks(tid) {
            if let Some(queue) = state.wait_queues.remove(&key) {
                queue.notify_all();
            }
        }
    }

    /// Writes every cached page to its file and marks it clean. Testing only:
    /// it ignores locks and the write-ahead rule.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();
        for page in state.pages.iter() {
            self.files.get(page.file_id())?.flush_page(page)?;
            page.mark_clean();
        }
        Ok(())
    }

    /// Drops every cached page without writing it back. Testing only.
    pub fn discard_all_pages(&self) {
        let mut state = self.state.lock();
        if state.transactions.active_count() > 0 {
            warn!("discarding cached pages while transactions are running");
        }
        state.pages.clear();
    }
}
