// ABOUTME: Update scheduler: collects occurrences whose state changed and flushes them in one batch.
// ABOUTME: flush() is explicit; spawn_driver() runs it one cooperative tick after the first schedule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::hooks::runtime::ContextId;
use crate::subscription::Subscription;

type Listener = Arc<dyn Fn() + Send + Sync>;
type BatchObserver = Arc<dyn Fn(&[ContextId]) + Send + Sync>;

#[derive(Default)]
struct SchedulerState {
    /// Pending occurrences in first-scheduled order, without duplicates.
    pending: Vec<ContextId>,
    listeners: HashMap<ContextId, Vec<(u64, Listener)>>,
    observers: Vec<(u64, BatchObserver)>,
    next_listener_id: u64,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    wake: Notify,
}

/// Batches re-render requests per occurrence. Cloning yields another handle
/// to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState::default()),
                wake: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark an occurrence as needing a re-render. Repeated calls before the
    /// next flush coalesce.
    pub fn schedule(&self, id: ContextId) {
        let first_in_batch = {
            let mut state = self.state();
            if state.pending.contains(&id) {
                return;
            }
            state.pending.push(id);
            state.pending.len() == 1
        };
        if first_in_batch {
            self.shared.wake.notify_one();
        }
    }

    pub fn is_pending(&self, id: ContextId) -> bool {
        self.state().pending.contains(&id)
    }

    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// Notify listeners of every pending occurrence, then batch observers,
    /// and clear the pending set. Returns the number of occurrences flushed.
    pub fn flush(&self) -> usize {
        let (batch, listeners, observers) = {
            let mut state = self.state();
            if state.pending.is_empty() {
                return 0;
            }
            let batch = std::mem::take(&mut state.pending);
            let listeners: Vec<Listener> = batch
                .iter()
                .filter_map(|id| state.listeners.get(id))
                .flat_map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)))
                .collect();
            let observers: Vec<BatchObserver> =
                state.observers.iter().map(|(_, o)| Arc::clone(o)).collect();
            (batch, listeners, observers)
        };

        tracing::debug!("scheduler flushing {} occurrence(s)", batch.len());

        for listener in listeners {
            listener();
        }
        for observer in observers {
            observer(&batch);
        }
        batch.len()
    }

    /// Register a listener for one occurrence.
    pub fn subscribe(&self, id: ContextId, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let listener_id = {
            let mut state = self.state();
            let listener_id = state.next_listener_id;
            state.next_listener_id += 1;
            state
                .listeners
                .entry(id)
                .or_default()
                .push((listener_id, Arc::new(listener)));
            listener_id
        };

        let shared = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(listeners) = state.listeners.get_mut(&id) {
                    listeners.retain(|(lid, _)| *lid != listener_id);
                    if listeners.is_empty() {
                        state.listeners.remove(&id);
                    }
                }
            }
        })
    }

    /// Register an observer notified once per flush with the whole batch.
    pub fn observe(&self, observer: impl Fn(&[ContextId]) + Send + Sync + 'static) -> Subscription {
        let observer_id = {
            let mut state = self.state();
            let observer_id = state.next_listener_id;
            state.next_listener_id += 1;
            state.observers.push((observer_id, Arc::new(observer)));
            observer_id
        };

        let shared = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.observers.retain(|(oid, _)| *oid != observer_id);
            }
        })
    }

    /// Number of listeners currently registered for an occurrence.
    pub fn listener_count(&self, id: ContextId) -> usize {
        self.state().listeners.get(&id).map_or(0, Vec::len)
    }

    /// Spawn a task that flushes one cooperative tick after the first
    /// schedule of each batch. Abort the handle to stop it.
    pub fn spawn_driver(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                scheduler.shared.wake.notified().await;
                tokio::task::yield_now().await;
                scheduler.flush();
            }
        })
    }
}
