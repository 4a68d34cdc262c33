//! A deduplicated FIFO of entries awaiting background refresh, dispatched
//! onto the configured [`resilience_executor::Executor`].

use crate::entry::Entry;
use crate::refresher::SingleFlightRefresher;
use resilience_executor::Executor;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

struct QueueState<K, V, E> {
    fifo: VecDeque<Entry<K, V, E>>,
    deduper: HashSet<K>,
}

pub(crate) struct RefreshQueue<K, V, E>
where
    E: Send + Sync,
{
    state: Mutex<QueueState<K, V, E>>,
    refresher: Arc<SingleFlightRefresher<K, V, E>>,
    executor: Arc<dyn Executor>,
    bulk_reload_size_limit: usize,
}

impl<K, V, E> RefreshQueue<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new(
        refresher: Arc<SingleFlightRefresher<K, V, E>>,
        executor: Arc<dyn Executor>,
        bulk_reload_size_limit: usize,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState {
                fifo: VecDeque::new(),
                deduper: HashSet::new(),
            }),
            refresher,
            executor,
            bulk_reload_size_limit,
        }
    }

    /// Enqueues `entry` for background refresh and dispatches a worker on
    /// the executor, unless it was already queued.
    pub(crate) fn add(self: &Arc<Self>, entry: Entry<K, V, E>) {
        let newly_queued = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.deduper.insert(entry.key.clone()) {
                state.fifo.push_back(entry);
                true
            } else {
                false
            }
        };

        if newly_queued {
            let queue = Arc::clone(self);
            self.executor.spawn(Box::new(move || queue.run()));
        }
    }

    /// Enqueues a batch without dispatching a worker — used when the
    /// caller intends to drain the queue itself (`refresh`/`refresh_now`).
    pub(crate) fn add_all_no_run(&self, entries: Vec<Entry<K, V, E>>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for entry in entries {
            if state.deduper.insert(entry.key.clone()) {
                state.fifo.push_back(entry);
            }
        }
    }

    /// Drains the FIFO, batching into bulk-reloader calls when one is
    /// configured, otherwise one entry at a time. Safe to call
    /// concurrently from multiple workers: each drained batch is removed
    /// from the deduper as it is processed, so no entry is refreshed
    /// twice by overlapping `run()` calls.
    pub(crate) fn run(&self) {
        loop {
            let batch = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.fifo.is_empty() {
                    return;
                }
                let limit = if self.refresher.has_bulk_reloader() {
                    self.bulk_reload_size_limit.max(1)
                } else {
                    1
                };
                let mut batch = Vec::with_capacity(limit);
                for _ in 0..limit {
                    match state.fifo.pop_front() {
                        Some(entry) => batch.push(entry),
                        None => break,
                    }
                }
                for entry in &batch {
                    state.deduper.remove(&entry.key);
                }
                batch
            };

            if self.refresher.has_bulk_reloader() {
                self.refresher.refresh_or_leave_bulk(&batch);
            } else {
                for entry in &batch {
                    self.refresher.refresh_or_leave(entry);
                }
            }
        }
    }
}
