use std::collections::{HashMap, HashSet};

use crate::common::{DbError, Result, TransactionID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

/// Lifecycle of every transaction the buffer pool has seen since startup.
///
/// Only ids in `active` may touch pages. Finished ids keep their terminal
/// status so a caller blocked in `get_page` can tell an abort apart from a
/// never-started transaction.
#[derive(Debug, Default)]
pub struct TransactionTable {
    active: HashSet<TransactionID>,
    finished: HashMap<TransactionID, TransactionStatus>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, tid: TransactionID) -> Result<()> {
        if !self.active.insert(tid) {
            return Err(DbError::IllegalTransaction(tid));
        }
        self.finished.remove(&tid);
        Ok(())
    }

    pub fn is_active(&self, tid: TransactionID) -> bool {
        self.active.contains(&tid)
    }

    pub fn status(&self, tid: TransactionID) -> Option<TransactionStatus> {
        if self.active.contains(&tid) {
            return Some(TransactionStatus::Active);
        }
        self.finished.get(&tid).copied()
    }

    /// Moves `tid` to a terminal state. Returns false if it was not active.
    pub fn finish(&mut self, tid: TransactionID, status: TransactionStatus) -> bool {
        debug_assert!(status != TransactionStatus::Active);
        if !self.active.remove(&tid) {
            return false;
        }
        self.finished.insert(tid, status);
        true
    }

    /// The error to report for an operation by a transaction that is not active.
    pub fn inactive_error(&self, tid: TransactionID) -> DbError {
        match self.finished.get(&tid) {
            Some(TransactionStatus::Aborted) => DbError::TransactionAborted(tid),
            _ => DbError::IllegalTransaction(tid),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_ids(&self) -> Vec<TransactionID> {
        let mut ids: Vec<TransactionID> = self.active.iter().copied().collect();
        ids.sort();
        ids
    }
}
