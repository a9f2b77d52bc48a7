use std::collections::{HashMap, HashSet};

use log::{debug, info};

use super::wait_for_graph::WaitForGraph;
use crate::common::{PageKey, Permission, TransactionID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Shared(HashSet<TransactionID>),
    Exclusive(TransactionID),
}

/// Result of a single, non-blocking lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Grant,
    /// Incompatible with a current holder; retry once the page is released.
    Wait,
    /// Waiting would close a cycle in the wait-for graph. The requester is the
    /// victim and must abort.
    Abort,
}

/// Page-level two-phase lock table. Pages absent from the table are free.
pub struct LockManager {
    locks: HashMap<PageKey, LockState>,
    held: HashMap<TransactionID, HashSet<PageKey>>,
    waiting: HashMap<TransactionID, PageKey>,
    wait_for: WaitForGraph,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: HashMap::new(),
            held: HashMap::new(),
            waiting: HashMap::new(),
            wait_for: WaitForGraph::new(),
        }
    }

    fn conflicting_holders(
        &self,
        key: PageKey,
        tid: TransactionID,
        perm: Permission,
    ) -> Vec<TransactionID> {
        match (self.locks.get(&key), perm) {
            (None, _) => Vec::new(),
            (Some(LockState::Exclusive(holder)), _) if *holder == tid => Vec::new(),
            (Some(LockState::Exclusive(holder)), _) => vec![*holder],
            (Some(LockState::Shared(_)), Permission::Read) => Vec::new(),
            // Covers upgrade: a sole shared holder has no conflicts.
            (Some(LockState::Shared(holders)), Permission::Write) => {
                holders.iter().copied().filter(|h| *h != tid).collect()
            }
        }
    }

    pub fn try_lock(&mut self, key: PageKey, tid: TransactionID, perm: Permission) -> LockOutcome {
        let conflicts = self.conflicting_holders(key, tid, perm);

        // Edges from an earlier attempt may point at holders that have since left.
        self.wait_for.remove_waiter(tid);

        if conflicts.is_empty() {
            self.grant(key, tid, perm);
            self.waiting.remove(&tid);
            return LockOutcome::Grant;
        }

        for holder in &conflicts {
            self.wait_for.add_edge(tid, *holder);
        }
        self.waiting.insert(tid, key);

        if let Some(cycle) = self.wait_for.find_cycle_from(tid) {
            info!("deadlock on {}: {} aborts, cycle {:?}", key, tid, cycle);
            return LockOutcome::Abort;
        }

        debug!("{} waits for {:?} on {}", tid, conflicts, key);
        LockOutcome::Wait
    }

    fn grant(&mut self, key: PageKey, tid: TransactionID, perm: Permission) {
        match perm {
            Permission::Write => {
                self.locks.insert(key, LockState::Exclusive(tid));
            }
            Permission::Read => match self.locks.get_mut(&key) {
                Some(LockState::Shared(holders)) => {
                    holders.insert(tid);
                }
                // Already exclusive, and necessarily ours.
                Some(LockState::Exclusive(_)) => {}
                None => {
                    self.locks.insert(key, LockState::Shared(HashSet::from([tid])));
                }
            },
        }
        self.held.entry(tid).or_default().insert(key);
    }

    /// Releases everything `tid` holds and forgets it as a waiter.
    ///
    /// Returns the pages whose waiters should re-check: the ones released and
    /// the one `tid` itself was queued on.
    pub fn release_locks(&mut self, tid: TransactionID) -> Vec<PageKey> {
        let mut touched: Vec<PageKey> = self
            .held
            .remove(&tid)
            .unwrap_or_default()
            .into_iter()
            .collect();

        for key in &touched {
            let now_free = match self.locks.get_mut(key) {
                Some(LockState::Shared(holders)) => {
                    holders.remove(&tid);
                    holders.is_empty()
                }
                Some(LockState::Exclusive(holder)) => *holder == tid,
                None => false,
            };
            if now_free {
                self.locks.remove(key);
            }
        }

        if let Some(key) = self.waiting.remove(&tid) {
            touched.push(key);
        }
        self.wait_for.remove_transaction(tid);
        touched
    }

    /// Pages on which `tid` currently holds an exclusive lock.
    pub fn write_locked_pages(&self, tid: TransactionID) -> Vec<PageKey> {
        let mut pages: Vec<PageKey> = self
            .held
            .get(&tid)
            .into_iter()
            .flatten()
            .filter(|key| self.exclusive_holder(**key) == Some(tid))
            .copied()
            .collect();
        pages.sort();
        pages
    }

    pub fn exclusive_holder(&self, key: PageKey) -> Option<TransactionID> {
        match self.locks.get(&key) {
            Some(LockState::Exclusive(holder)) => Some(*holder),
            _ => None,
        }
    }

    pub fn lock_state(&self, key: PageKey) -> Option<&LockState> {
        self.locks.get(&key)
    }

    pub fn waiting_on(&self, tid: TransactionID) -> Option<PageKey> {
        self.waiting.get(&tid).copied()
    }
}
