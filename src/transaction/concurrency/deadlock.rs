use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::lock_manager::LockRequestQueue;
use crate::transaction::concurrency::transaction::TransactionState;

pub(crate) type LockTable = Mutex<HashMap<Rid, LockRequestQueue>>;

/// Detector thread body: wake on a fixed interval, rebuild the wait-for
/// graph under the lock-table mutex, and abort victims until no cycle
/// remains.
pub(crate) fn run_detection(table: Arc<LockTable>, running: Arc<AtomicBool>, interval: Duration) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let mut guard = table.lock();
        detect_once(&mut guard);
    }
}

/// One detection cycle. The graph is scratch state, rebuilt from the
/// lock table every time and never persisted.
pub(crate) fn detect_once(table: &mut HashMap<Rid, LockRequestQueue>) {
    let mut graph = WaitsForGraph::default();
    // RID each waiter is parked on, to know which condvar to poke.
    let mut waits_on = HashMap::new();
    let mut waiters = HashMap::new();

    for (rid, queue) in table.iter() {
        for waiting in queue.requests.iter().filter(|r| !r.granted) {
            if waiting.txn.state() == TransactionState::Aborted {
                continue;
            }
            waits_on.insert(waiting.txn.id(), *rid);
            waiters.insert(waiting.txn.id(), waiting.txn.clone());
            for granted in queue.requests.iter().filter(|r| r.granted) {
                if granted.txn.state() == TransactionState::Aborted {
                    continue;
                }
                graph.add_edge(waiting.txn.id(), granted.txn.id());
            }
        }
    }

    while let Some(victim) = graph.cycle_victim() {
        warn!("deadlock detected, aborting youngest transaction {}", victim);
        let txn = waiters
            .get(&victim)
            .expect("a cycle member has an outgoing edge and therefore waits");
        txn.set_state(TransactionState::Aborted);
        graph.remove_node(victim);

        // Wake the victim so its waiter observes the abort.
        if let Some(rid) = waits_on.get(&victim) {
            if let Some(queue) = table.get(rid) {
                queue.cv.notify_all();
            }
        }
    }
}

/// Directed graph of "waits on a lock granted to" edges between live
/// transactions.
#[derive(Default)]
pub(crate) struct WaitsForGraph {
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    NotVisited,
    OnStack,
    Done,
}

impl WaitsForGraph {
    pub(crate) fn add_edge(&mut self, from: TxnId, to: TxnId) {
        self.edges.entry(from).or_default().insert(to);
    }

    pub(crate) fn remove_node(&mut self, txn_id: TxnId) {
        self.edges.remove(&txn_id);
        for targets in self.edges.values_mut() {
            targets.remove(&txn_id);
        }
    }

    /// Find a cycle and return its youngest (maximum) transaction id.
    /// DFS with tri-state marks; vertices and edges are visited in
    /// sorted order so victim selection is deterministic.
    pub(crate) fn cycle_victim(&self) -> Option<TxnId> {
        let mut marks: HashMap<TxnId, Mark> = HashMap::new();
        let mut stack: Vec<TxnId> = Vec::new();

        let vertices: Vec<TxnId> = self.edges.keys().copied().collect();
        for vertex in vertices {
            if marks.get(&vertex).copied().unwrap_or(Mark::NotVisited) == Mark::NotVisited {
                if let Some(victim) = self.dfs(vertex, &mut marks, &mut stack) {
                    return Some(victim);
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        vertex: TxnId,
        marks: &mut HashMap<TxnId, Mark>,
        stack: &mut Vec<TxnId>,
    ) -> Option<TxnId> {
        marks.insert(vertex, Mark::OnStack);
        stack.push(vertex);

        if let Some(targets) = self.edges.get(&vertex) {
            for &target in targets {
                match marks.get(&target).copied().unwrap_or(Mark::NotVisited) {
                    Mark::OnStack => {
                        // Back edge: the cycle is the stack suffix
                        // starting at the target.
                        let start = stack
                            .iter()
                            .position(|&t| t == target)
                            .expect("on-stack vertex is on the stack");
                        return stack[start..].iter().copied().max();
                    }
                    Mark::NotVisited => {
                        if let Some(victim) = self.dfs(target, marks, stack) {
                            return Some(victim);
                        }
                    }
                    Mark::Done => {}
                }
            }
        }

        stack.pop();
        marks.insert(vertex, Mark::Done);
        None
    }
}
