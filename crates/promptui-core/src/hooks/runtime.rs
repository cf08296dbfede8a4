// ABOUTME: Arena of render-context records, one per mounted component occurrence, keyed by handle.
// ABOUTME: Tracks which occurrences a render pass visited and unmounts the rest when the pass ends.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

use crate::hooks::HookError;
use crate::hooks::scheduler::Scheduler;

/// Opaque handle identifying one mounted component occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(u64);

impl ContextId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Cleanup returned by an effect; runs before the effect re-runs and on unmount.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// One hook's storage. The value's concrete type is fixed by the hook kind
/// that first claimed the slot.
#[derive(Default)]
pub(crate) struct HookSlot {
    pub(crate) value: Option<Box<dyn Any + Send>>,
}

pub(crate) struct ContextRecord {
    path: String,
    component: String,
    pub(crate) slots: Vec<HookSlot>,
}

impl ContextRecord {
    /// Effect cleanups still owed by this record.
    fn take_cleanups(&mut self) -> Vec<Cleanup> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.value.as_mut())
            .filter_map(|value| value.downcast_mut::<super::EffectCell>())
            .filter_map(|cell| cell.cleanup.take())
            .collect()
    }
}

#[derive(Default)]
struct Arena {
    next_id: u64,
    by_path: HashMap<String, ContextId>,
    records: HashMap<ContextId, ContextRecord>,
    visited: HashSet<ContextId>,
}

pub(crate) struct RuntimeShared {
    arena: Mutex<Arena>,
    pub(crate) scheduler: Scheduler,
}

impl RuntimeShared {
    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against slot `index` of occurrence `id`, creating the slot if
    /// this is the first evaluation to reach it.
    pub(crate) fn with_slot<R>(
        &self,
        id: ContextId,
        index: usize,
        f: impl FnOnce(&str, &mut HookSlot) -> Result<R, HookError>,
    ) -> Result<R, HookError> {
        let mut arena = self.arena();
        let record = arena.records.get_mut(&id).ok_or(HookError::NoActiveContext)?;
        if record.slots.len() <= index {
            record.slots.resize_with(index + 1, HookSlot::default);
        }
        let component = record.component.clone();
        f(&component, &mut record.slots[index])
    }

    pub(crate) fn is_mounted(&self, id: ContextId) -> bool {
        self.arena().records.contains_key(&id)
    }
}

/// Owner of every occurrence's hook state for one page. Cloning yields
/// another handle to the same arena.
#[derive(Clone)]
pub struct HookRuntime {
    pub(crate) shared: Arc<RuntimeShared>,
}

impl Default for HookRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRuntime {
    pub fn new() -> Self {
        Self::with_scheduler(Scheduler::new())
    }

    pub fn with_scheduler(scheduler: Scheduler) -> Self {
        Self {
            shared: Arc::new(RuntimeShared {
                arena: Mutex::new(Arena::default()),
                scheduler,
            }),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeShared> {
        Arc::downgrade(&self.shared)
    }

    /// Start a render pass: forget which occurrences were visited last time.
    pub fn begin_pass(&self) {
        self.shared.arena().visited.clear();
    }

    /// Resolve the occurrence at `path`, creating its record on first visit.
    /// A different component at the same path replaces the old occurrence.
    pub fn mount(&self, path: &str, component: &str) -> ContextId {
        let (id, replaced) = {
            let mut arena = self.shared.arena();
            let mut replaced = None;
            if let Some(&existing) = arena.by_path.get(path) {
                let same = arena
                    .records
                    .get(&existing)
                    .is_some_and(|r| r.component == component);
                if same {
                    arena.visited.insert(existing);
                    return existing;
                }
                replaced = arena.records.remove(&existing);
            }

            arena.next_id += 1;
            let id = ContextId(arena.next_id);
            arena.by_path.insert(path.to_string(), id);
            arena.records.insert(
                id,
                ContextRecord {
                    path: path.to_string(),
                    component: component.to_string(),
                    slots: Vec::new(),
                },
            );
            arena.visited.insert(id);
            (id, replaced)
        };

        if let Some(mut old) = replaced {
            tracing::debug!("replacing {} at {} with {}", old.component, path, component);
            for cleanup in old.take_cleanups() {
                cleanup.run();
            }
        }
        id
    }

    /// Finish a render pass: unmount every occurrence the pass did not visit.
    /// Returns the number of occurrences unmounted.
    pub fn end_pass(&self) -> usize {
        let removed: Vec<ContextRecord> = {
            let mut arena = self.shared.arena();
            let stale: Vec<ContextId> = arena
                .records
                .keys()
                .filter(|id| !arena.visited.contains(id))
                .copied()
                .collect();
            stale
                .into_iter()
                .filter_map(|id| {
                    let record = arena.records.remove(&id)?;
                    arena.by_path.remove(&record.path);
                    Some(record)
                })
                .collect()
        };

        let count = removed.len();
        for mut record in removed {
            tracing::debug!("unmounting {} at {}", record.component, record.path);
            for cleanup in record.take_cleanups() {
                cleanup.run();
            }
        }
        count
    }

    /// Unmount everything, running outstanding effect cleanups.
    pub fn dispose(&self) {
        let records: Vec<ContextRecord> = {
            let mut arena = self.shared.arena();
            arena.by_path.clear();
            arena.visited.clear();
            arena.records.drain().map(|(_, r)| r).collect()
        };
        for mut record in records {
            for cleanup in record.take_cleanups() {
                cleanup.run();
            }
        }
    }

    pub fn is_mounted(&self, id: ContextId) -> bool {
        self.shared.is_mounted(id)
    }

    /// Number of mounted occurrences.
    pub fn len(&self) -> usize {
        self.shared.arena().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occurrence mounted at `path`, if any.
    pub fn context_at(&self, path: &str) -> Option<ContextId> {
        self.shared.arena().by_path.get(path).copied()
    }
}

impl fmt::Debug for HookRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRuntime")
            .field("mounted", &self.len())
            .finish()
    }
}
