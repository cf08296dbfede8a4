// ABOUTME: Hook primitives (state, effect, memo, callback, ref) bound to an explicit render context.
// ABOUTME: Each call claims the next slot of the occurrence, so call order must not vary between renders.

pub mod runtime;
pub mod scheduler;

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use thiserror::Error;

use crate::env::RenderEnv;
use crate::props::Handler;

pub use runtime::{Cleanup, ContextId, HookRuntime};
pub use scheduler::Scheduler;

use runtime::RuntimeShared;

/// Errors raised by hook calls.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hooks must be invoked during component evaluation")]
    NoActiveContext,

    #[error("hook order changed in {component}: slot {index} belongs to a different hook")]
    OrderChanged { component: String, index: usize },

    #[error("{hook} requires a router context; render the component through a page")]
    MissingRouter { hook: &'static str },
}

fn order_changed(component: &str, index: usize) -> HookError {
    HookError::OrderChanged {
        component: component.to_string(),
        index,
    }
}

struct StateCell<T>(T);

#[derive(Default)]
pub(crate) struct EffectCell {
    initialized: bool,
    deps: Option<Box<dyn std::any::Any + Send>>,
    pub(crate) cleanup: Option<Cleanup>,
}

struct MemoCell<D, T> {
    deps: D,
    value: T,
}

/// Hook access for one evaluation of one component occurrence. The slot
/// cursor starts at zero for every evaluation.
pub struct Hooks<'a> {
    runtime: &'a HookRuntime,
    env: &'a RenderEnv,
    id: ContextId,
    cursor: usize,
}

impl<'a> Hooks<'a> {
    /// Open an evaluation of occurrence `id`. The renderer does this for
    /// every sync component; tests may do it directly.
    pub fn new(runtime: &'a HookRuntime, env: &'a RenderEnv, id: ContextId) -> Self {
        Self {
            runtime,
            env,
            id,
            cursor: 0,
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.id
    }

    pub fn env(&self) -> &RenderEnv {
        self.env
    }

    pub fn runtime(&self) -> &HookRuntime {
        self.runtime
    }

    fn next_index(&mut self) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        index
    }

    fn shared(&self) -> &RuntimeShared {
        &self.runtime.shared
    }

    /// A handle that schedules a re-render of this occurrence.
    pub fn updater(&self) -> Updater {
        Updater {
            runtime: self.runtime.downgrade(),
            id: self.id,
        }
    }

    /// State that persists across evaluations of this occurrence.
    pub fn use_state<T>(&mut self, initial: T) -> Result<(T, StateSetter<T>), HookError>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        self.use_state_with(move || initial)
    }

    /// Like [`Hooks::use_state`], computing the initial value only on the
    /// first evaluation.
    pub fn use_state_with<T, F>(&mut self, init: F) -> Result<(T, StateSetter<T>), HookError>
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnOnce() -> T,
    {
        let index = self.next_index();
        let existing = self.shared().with_slot(self.id, index, |component, slot| {
            match slot.value.as_ref() {
                None => Ok(None),
                Some(value) => value
                    .downcast_ref::<StateCell<T>>()
                    .map(|cell| Some(cell.0.clone()))
                    .ok_or_else(|| order_changed(component, index)),
            }
        })?;

        let value = match existing {
            Some(value) => value,
            None => {
                let value = init();
                let stored = value.clone();
                self.shared().with_slot(self.id, index, |_, slot| {
                    slot.value.get_or_insert_with(|| Box::new(StateCell(stored)));
                    Ok(())
                })?;
                value
            }
        };

        let setter = StateSetter {
            runtime: self.runtime.downgrade(),
            id: self.id,
            index,
            _marker: PhantomData,
        };
        Ok((value, setter))
    }

    /// Run `effect` on every evaluation, calling the previous cleanup first.
    pub fn use_effect<F>(&mut self, effect: F) -> Result<(), HookError>
    where
        F: FnOnce() -> Option<Cleanup>,
    {
        self.run_effect::<(), F>(None, effect)
    }

    /// Run `effect` on the first evaluation and whenever `deps` differs from
    /// the previous evaluation's deps.
    pub fn use_effect_with<D, F>(&mut self, deps: D, effect: F) -> Result<(), HookError>
    where
        D: PartialEq + Send + 'static,
        F: FnOnce() -> Option<Cleanup>,
    {
        self.run_effect(Some(deps), effect)
    }

    fn run_effect<D, F>(&mut self, deps: Option<D>, effect: F) -> Result<(), HookError>
    where
        D: PartialEq + Send + 'static,
        F: FnOnce() -> Option<Cleanup>,
    {
        let index = self.next_index();
        let (should_run, previous_cleanup) =
            self.shared().with_slot(self.id, index, |component, slot| {
                let value = slot
                    .value
                    .get_or_insert_with(|| Box::new(EffectCell::default()));
                let cell = value
                    .downcast_mut::<EffectCell>()
                    .ok_or_else(|| order_changed(component, index))?;

                let changed = match (&deps, &cell.deps) {
                    (None, _) => true,
                    (Some(_), _) if !cell.initialized => true,
                    (Some(new), Some(old)) => old.downcast_ref::<D>().is_none_or(|old| old != new),
                    (Some(_), None) => true,
                };

                if changed {
                    Ok((true, cell.cleanup.take()))
                } else {
                    Ok((false, None))
                }
            })?;

        if !should_run {
            return Ok(());
        }

        if let Some(cleanup) = previous_cleanup {
            cleanup.run();
        }
        let cleanup = effect();

        self.shared().with_slot(self.id, index, |component, slot| {
            let cell = slot
                .value
                .as_mut()
                .and_then(|v| v.downcast_mut::<EffectCell>())
                .ok_or_else(|| order_changed(component, index))?;
            cell.initialized = true;
            cell.deps = deps.map(|d| Box::new(d) as Box<dyn std::any::Any + Send>);
            cell.cleanup = cleanup;
            Ok(())
        })
    }

    /// Cached value recomputed only when `deps` changes.
    pub fn use_memo<D, T, F>(&mut self, deps: D, compute: F) -> Result<T, HookError>
    where
        D: PartialEq + Send + 'static,
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        let index = self.next_index();
        let cached = self.shared().with_slot(self.id, index, |component, slot| {
            match slot.value.as_ref() {
                None => Ok(None),
                Some(value) => {
                    let cell = value
                        .downcast_ref::<MemoCell<D, T>>()
                        .ok_or_else(|| order_changed(component, index))?;
                    Ok((cell.deps == deps).then(|| cell.value.clone()))
                }
            }
        })?;

        if let Some(value) = cached {
            return Ok(value);
        }

        let value = compute();
        let stored = value.clone();
        self.shared().with_slot(self.id, index, |_, slot| {
            slot.value = Some(Box::new(MemoCell { deps, value: stored }));
            Ok(())
        })?;
        Ok(value)
    }

    /// A handler whose identity is kept until `deps` changes.
    pub fn use_callback<D>(&mut self, deps: D, handler: Handler) -> Result<Handler, HookError>
    where
        D: PartialEq + Send + 'static,
    {
        self.use_memo(deps, move || handler)
    }

    /// A mutable container initialized once and kept across evaluations.
    pub fn use_ref<T>(&mut self, initial: T) -> Result<HookRef<T>, HookError>
    where
        T: Send + 'static,
    {
        let index = self.next_index();
        self.shared().with_slot(self.id, index, |component, slot| {
            let value = slot.value.get_or_insert_with(|| {
                Box::new(HookRef {
                    inner: Arc::new(Mutex::new(initial)),
                })
            });
            value
                .downcast_ref::<HookRef<T>>()
                .cloned()
                .ok_or_else(|| order_changed(component, index))
        })
    }
}

/// Setter returned by [`Hooks::use_state`].
pub struct StateSetter<T> {
    runtime: Weak<RuntimeShared>,
    id: ContextId,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: Weak::clone(&self.runtime),
            id: self.id,
            index: self.index,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSetter")
            .field("context", &self.id)
            .field("slot", &self.index)
            .finish()
    }
}

impl<T> StateSetter<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Replace the value. Returns true when the value changed and a
    /// re-render was scheduled.
    pub fn set(&self, value: T) -> bool {
        self.update(move |_| value)
    }

    /// Compute the next value from the current one. The read, `f` and the
    /// store happen under one lock of the hook arena, so `f` must not touch
    /// hook state itself.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let Some(shared) = self.runtime.upgrade() else {
            return false;
        };

        let changed = shared.with_slot(self.id, self.index, |component, slot| {
            let cell = slot
                .value
                .as_mut()
                .and_then(|v| v.downcast_mut::<StateCell<T>>())
                .ok_or_else(|| order_changed(component, self.index))?;
            let next = f(&cell.0);
            if next == cell.0 {
                return Ok(false);
            }
            cell.0 = next;
            Ok(true)
        });
        match changed {
            Ok(true) => {
                shared.scheduler.schedule(self.id);
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::debug!("dropping state update for {}: {}", self.id, e);
                false
            }
        }
    }
}

/// Container returned by [`Hooks::use_ref`].
pub struct HookRef<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for HookRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for HookRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HookRef(..)")
    }
}

impl<T> HookRef<T> {
    pub fn current(&self) -> T
    where
        T: Clone,
    {
        self.with(|v| v.clone())
    }

    pub fn set_current(&self, value: T) {
        self.with(|v| *v = value);
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn ptr_eq(&self, other: &HookRef<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Schedules a re-render of one occurrence from outside the render.
#[derive(Debug, Clone)]
pub struct Updater {
    runtime: Weak<RuntimeShared>,
    id: ContextId,
}

impl Updater {
    /// Returns false when the occurrence is gone.
    pub fn request(&self) -> bool {
        match self.runtime.upgrade() {
            Some(shared) if shared.is_mounted(self.id) => {
                shared.scheduler.schedule(self.id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        runtime: HookRuntime,
        env: RenderEnv,
        id: ContextId,
    }

    impl Fixture {
        fn new() -> Self {
            let runtime = HookRuntime::new();
            let id = runtime.mount("test", "Test");
            Self {
                runtime,
                env: RenderEnv::default(),
                id,
            }
        }

        /// One evaluation of the occurrence.
        fn eval(&self) -> Hooks<'_> {
            Hooks::new(&self.runtime, &self.env, self.id)
        }
    }

    fn counting() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    #[test]
    fn state_initializes_with_value_and_function() {
        let fx = Fixture::new();
        let mut hooks = fx.eval();
        let (a, _) = hooks.use_state(0).unwrap();
        let (b, _) = hooks.use_state_with(|| 42).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 42);
    }

    #[test]
    fn initializer_runs_only_once() {
        let fx = Fixture::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&calls);
            let mut hooks = fx.eval();
            hooks
                .use_state_with(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    1
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn next_evaluation_observes_updated_value() {
        let fx = Fixture::new();
        let (count, set_count) = fx.eval().use_state(5).unwrap();
        assert_eq!(count, 5);

        assert!(set_count.update(|prev| prev + 10));
        let (count, _) = fx.eval().use_state(5).unwrap();
        assert_eq!(count, 15);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let fx = Fixture::new();
        let (_, setter) = fx.eval().use_state(0u64).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let setter = setter.clone();
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        setter.update(|n| n + 1);
                    }
                });
            }
        });

        let (count, _) = fx.eval().use_state(0u64).unwrap();
        assert_eq!(count, 16_000);
    }

    #[test]
    fn same_value_does_not_schedule() {
        let fx = Fixture::new();
        let (_, set_count) = fx.eval().use_state(0).unwrap();

        assert!(!set_count.set(0));
        assert_eq!(fx.runtime.scheduler().pending_len(), 0);

        assert!(set_count.set(1));
        assert!(fx.runtime.scheduler().is_pending(fx.id));
    }

    #[test]
    fn hooks_fail_after_occurrence_is_gone() {
        let fx = Fixture::new();
        let (_, setter) = fx.eval().use_state(0).unwrap();
        fx.runtime.dispose();

        let err = fx.eval().use_state(0).unwrap_err();
        assert!(matches!(err, HookError::NoActiveContext));
        assert_eq!(err.to_string(), "hooks must be invoked during component evaluation");
        assert!(!setter.set(3));
    }

    #[test]
    fn changing_hook_order_is_reported() {
        let fx = Fixture::new();
        fx.eval().use_state(1u8).unwrap();
        let err = fx.eval().use_ref(String::new()).unwrap_err();
        assert!(matches!(err, HookError::OrderChanged { index: 0, .. }));
    }

    #[test]
    fn effect_runs_on_first_render() {
        let fx = Fixture::new();
        let (runs, _) = counting();
        let r = Arc::clone(&runs);
        fx.eval()
            .use_effect_with((), move || {
                r.fetch_add(1, Ordering::SeqCst);
                None
            })
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_skips_when_deps_unchanged_and_reruns_when_changed() {
        let fx = Fixture::new();
        let (runs, _) = counting();
        for deps in [vec![1, 2], vec![1, 2], vec![3]] {
            let r = Arc::clone(&runs);
            fx.eval()
                .use_effect_with(deps, move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    None
                })
                .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cleanup_runs_before_next_effect() {
        let fx = Fixture::new();
        let (runs, cleanups) = counting();
        let order = Arc::new(Mutex::new(Vec::new()));

        for dep in [1, 2] {
            let r = Arc::clone(&runs);
            let c = Arc::clone(&cleanups);
            let o = Arc::clone(&order);
            fx.eval()
                .use_effect_with(dep, move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    o.lock().unwrap().push(format!("effect {}", dep));
                    let o = Arc::clone(&o);
                    Some(Cleanup::new(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                        o.lock().unwrap().push(format!("cleanup {}", dep));
                    }))
                })
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["effect 1", "cleanup 1", "effect 2"]
        );

        fx.runtime.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2, "unmount runs the last cleanup");
    }

    #[test]
    fn effect_without_deps_runs_every_time() {
        let fx = Fixture::new();
        let (runs, _) = counting();
        for _ in 0..2 {
            let r = Arc::clone(&runs);
            fx.eval()
                .use_effect(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    None
                })
                .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_may_set_state_synchronously() {
        let fx = Fixture::new();
        let mut hooks = fx.eval();
        let (_, set_flag) = hooks.use_state(false).unwrap();
        hooks
            .use_effect_with((), move || {
                set_flag.set(true);
                None
            })
            .unwrap();
        assert!(fx.runtime.scheduler().is_pending(fx.id));
        let (flag, _) = fx.eval().use_state(false).unwrap();
        assert!(flag);
    }

    #[test]
    fn memo_recomputes_only_on_dep_change() {
        let fx = Fixture::new();
        let computes = Arc::new(AtomicUsize::new(0));
        let mut results = Vec::new();
        for dep in ["a", "a", "b"] {
            let c = Arc::clone(&computes);
            let value = fx
                .eval()
                .use_memo(dep.to_string(), move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    format!("{}!", dep)
                })
                .unwrap();
            results.push(value);
        }
        assert_eq!(computes.load(Ordering::SeqCst), 2);
        assert_eq!(results, vec!["a!", "a!", "b!"]);
    }

    #[test]
    fn callback_identity_is_stable_until_deps_change() {
        let fx = Fixture::new();
        let first = fx.eval().use_callback(1, Handler::noop()).unwrap();
        let second = fx.eval().use_callback(1, Handler::noop()).unwrap();
        let third = fx.eval().use_callback(2, Handler::noop()).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&third));
    }

    #[test]
    fn ref_is_initialized_once_and_persists() {
        let fx = Fixture::new();
        let r1 = fx.eval().use_ref(10).unwrap();
        r1.set_current(11);
        let r2 = fx.eval().use_ref(99).unwrap();
        assert!(r1.ptr_eq(&r2));
        assert_eq!(r2.current(), 11);
        assert!(!fx.runtime.scheduler().is_pending(fx.id), "refs never schedule");
    }

    #[test]
    fn updater_schedules_only_mounted_occurrences() {
        let fx = Fixture::new();
        let updater = fx.eval().updater();
        assert!(updater.request());
        assert!(fx.runtime.scheduler().is_pending(fx.id));

        fx.runtime.dispose();
        assert!(!updater.request());
    }
}
