use std::collections::{HashMap, HashSet};

use crate::common::TransactionID;

pub(crate) struct WaitForGraph {
    // key: transaction id, value: the transactions that the key transaction is waiting for
    graph: HashMap<TransactionID, HashSet<TransactionID>>,
}

impl WaitForGraph {
    pub(crate) fn new() -> Self {
        Self {
            graph: HashMap::new(),
        }
    }

    pub(crate) fn add_edge(&mut self, from: TransactionID, to: TransactionID) {
        self.graph.entry(from).or_default().insert(to);
    }

    /// Drops every outgoing edge of `tid`; it is no longer blocked.
    pub(crate) fn remove_waiter(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
    }

    /// Drops `tid` entirely, including edges of transactions waiting on it.
    pub(crate) fn remove_transaction(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
        self.graph.retain(|_, targets| {
            targets.remove(&tid);
            !targets.is_empty()
        });
    }

    /// Returns a cycle passing through `start`, listed from `start` onwards.
    pub(crate) fn find_cycle_from(&self, start: TransactionID) -> Option<Vec<TransactionID>> {
        let mut visited = HashSet::new();
        let mut path = vec![start];
        if self.search(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn search(
        &self,
        start: TransactionID,
        current: TransactionID,
        visited: &mut HashSet<TransactionID>,
        path: &mut Vec<TransactionID>,
    ) -> bool {
        let targets = match self.graph.get(&current) {
            Some(targets) => targets,
            None => return false,
        };

        for &next in targets {
            if next == start {
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if self.search(start, next, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: u64) -> TransactionID {
        TransactionID(id)
    }

    #[test]
    fn finds_cycle_through_start_only() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(t(1), t(2));
        graph.add_edge(t(2), t(3));
        graph.add_edge(t(3), t(2));

        // 1 reaches a cycle but is not part of it.
        assert!(graph.find_cycle_from(t(1)).is_none());
        assert_eq!(graph.find_cycle_from(t(2)), Some(vec![t(2), t(3)]));
    }

    #[test]
    fn removing_a_transaction_breaks_its_cycles() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(t(1), t(2));
        graph.add_edge(t(2), t(1));
        assert!(graph.find_cycle_from(t(1)).is_some());

        graph.remove_transaction(t(2));
        assert!(graph.find_cycle_from(t(1)).is_none());
        assert!(graph.find_cycle_from(t(2)).is_none());
    }
}
