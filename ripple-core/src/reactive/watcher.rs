//! Watcher Implementation
//!
//! A Watcher is one reactive computation: a render function, a computed
//! value, or a user callback on some expression. It owns a getter, and every
//! evaluation of that getter rediscovers exactly which [`Dep`]s it reads.
//!
//! # How Watchers Work
//!
//! 1. An evaluation pushes the watcher onto the target stack, runs the
//!    getter, and pops it again.
//!
//! 2. Every `Dep::depend` call made by the getter lands in
//!    [`Target::add_dep`]. The watcher records the Dep for the current pass
//!    and subscribes to it unless it is already subscribed from the last pass.
//!
//! 3. After the getter returns (or panics), the Deps that were read last pass
//!    but not this pass are unsubscribed. Dependencies never accumulate.
//!
//! 4. When a Dep notifies, [`Subscriber::update`] either marks the watcher
//!    dirty (computed), queues it (when attached to an [`UpdateQueue`]), or
//!    re-runs it on the spot.
//!
//! 5. A notification that arrives while the watcher's own getter is running
//!    (the getter wrote to state it reads) does not start a nested pass. The
//!    running pass finishes, and then the getter runs again with fresh deps.
//!
//! # Variants
//!
//! - [`WatcherKind::Render`]: evaluates on creation, re-runs on update.
//! - [`WatcherKind::Computed`]: lazy. Update only marks it dirty and the
//!   owner calls [`Watcher::evaluate`] when it needs the value.
//! - [`WatcherKind::User`]: like render, but calls a change callback with the
//!   new and old values whenever a re-run produces a different value.
//!
//! # Teardown
//!
//! [`Watcher::teardown`] unsubscribes from every Dep and turns `update`,
//! `run` and `add_dep` into no-ops. Dropping the last handle does the same.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use super::context::{self, TargetGuard};
use super::dep::{Dep, DepId};
use super::subscriber::{Subscriber, SubscriberId, Target};
use crate::config::QueueConfig;
use crate::scheduler::{Job, UpdateQueue};

/// What a watcher is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherKind {
    /// Eager re-evaluation with no callback, e.g. a render function.
    Render,

    /// Lazy, cached evaluation. Notifications only mark it dirty.
    Computed,

    /// Eager re-evaluation followed by a change callback.
    User,
}

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Callback<T> = Box<dyn Fn(&T, Option<&T>) + Send + Sync>;
type Hook = Box<dyn Fn() + Send + Sync>;

/// The Deps read by the last completed pass and by the pass in progress.
#[derive(Default)]
struct DepSets {
    deps: IndexMap<DepId, Dep>,
    new_deps: IndexMap<DepId, Dep>,
}

struct WatcherInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    id: SubscriberId,
    kind: WatcherKind,
    me: Weak<WatcherInner<T>>,
    getter: Getter<T>,
    callback: Option<Callback<T>>,
    before: Option<Hook>,
    sync: bool,
    queue: Option<UpdateQueue>,
    value: Mutex<Option<T>>,
    deps: Mutex<DepSets>,
    dirty: AtomicBool,
    active: AtomicBool,
    evaluating: AtomicBool,
    rerun: AtomicBool,
    evaluations: AtomicUsize,
}

/// Keeps the watcher on the target stack for the duration of one pass.
///
/// Dropping it pops the target and reconciles the dep sets, on the normal
/// path and during unwinding alike.
struct Evaluation<'a> {
    subscriber_id: SubscriberId,
    deps: &'a Mutex<DepSets>,
    evaluating: &'a AtomicBool,
    outermost: bool,
    target: Option<TargetGuard>,
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        drop(self.target.take());
        cleanup_deps(self.subscriber_id, self.deps);
        if self.outermost {
            self.evaluating.store(false, Ordering::SeqCst);
        }
    }
}

/// Unsubscribe from Deps the finished pass did not read, then promote the
/// pass's set to "last pass".
fn cleanup_deps(subscriber_id: SubscriberId, deps: &Mutex<DepSets>) {
    let stale: SmallVec<[Dep; 4]> = {
        let mut sets = deps.lock();
        let DepSets { deps, new_deps } = &mut *sets;

        let stale = deps
            .iter()
            .filter(|(id, _)| !new_deps.contains_key(*id))
            .map(|(_, dep)| dep.clone())
            .collect();

        std::mem::swap(deps, new_deps);
        new_deps.clear();
        stale
    };

    if !stale.is_empty() {
        trace!(watcher = %subscriber_id, dropped = stale.len(), "dropping stale deps");
    }

    for dep in stale {
        dep.remove_sub(subscriber_id);
    }
}

impl<T> WatcherInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn get(&self) -> T {
        let target = self.me.upgrade().map(|me| me as Arc<dyn Target>);
        let _evaluation = Evaluation {
            subscriber_id: self.id,
            deps: &self.deps,
            evaluating: &self.evaluating,
            outermost: !self.evaluating.swap(true, Ordering::SeqCst),
            target: Some(context::push_target(target)),
        };

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        trace!(watcher = %self.id, kind = ?self.kind, "evaluate");

        (self.getter)()
    }

    /// Run passes of the getter until one finishes without the watcher being
    /// notified during it.
    fn compute(&self) -> T {
        let limit = self
            .queue
            .as_ref()
            .map_or(QueueConfig::default().max_update_count, |queue| {
                queue.config().max_update_count
            });

        let mut passes = 0u32;
        loop {
            self.rerun.store(false, Ordering::SeqCst);
            let value = self.get();

            if !self.rerun.swap(false, Ordering::SeqCst) || !self.is_active() {
                return value;
            }

            passes += 1;
            if passes >= limit {
                error!(
                    watcher = %self.id,
                    limit,
                    "getter keeps invalidating its own deps, giving up"
                );
                return value;
            }

            trace!(watcher = %self.id, "notified during evaluation, re-running");
        }
    }

    fn evaluate(&self) -> T {
        let value = self.compute();
        *self.value.lock() = Some(value.clone());
        self.dirty.store(false, Ordering::SeqCst);
        value
    }

    fn run(&self) {
        if !self.is_active() {
            return;
        }

        let value = self.compute();
        let previous = {
            let mut current = self.value.lock();
            if current.as_ref() == Some(&value) {
                return;
            }
            current.replace(value.clone())
        };

        if let Some(callback) = &self.callback {
            callback(&value, previous.as_ref());
        }
    }

    fn depend(&self) {
        let deps: SmallVec<[Dep; 8]> = self.deps.lock().deps.values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let held = {
            let mut sets = self.deps.lock();
            let DepSets { mut deps, new_deps } = std::mem::take(&mut *sets);
            deps.extend(new_deps);
            deps
        };

        debug!(watcher = %self.id, deps = held.len(), "teardown");

        for dep in held.values() {
            dep.remove_sub(self.id);
        }
    }
}

impl<T> Subscriber for WatcherInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        if !self.is_active() {
            return;
        }

        let evaluating = self.evaluating.load(Ordering::SeqCst);

        if self.kind == WatcherKind::Computed {
            self.dirty.store(true, Ordering::SeqCst);
            if evaluating {
                self.rerun.store(true, Ordering::SeqCst);
            }
            return;
        }

        if !self.sync {
            if let (Some(queue), Some(me)) = (&self.queue, self.me.upgrade()) {
                queue.queue(me);
                return;
            }
        }

        if evaluating {
            self.rerun.store(true, Ordering::SeqCst);
            return;
        }

        self.run();
    }

    fn is_lazy(&self) -> bool {
        self.kind == WatcherKind::Computed
    }
}

impl<T> Target for WatcherInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn add_dep(&self, dep: &Dep) {
        if !self.is_active() {
            return;
        }

        let id = dep.id();
        let subscribe = {
            let mut sets = self.deps.lock();
            if sets.new_deps.contains_key(&id) {
                false
            } else {
                sets.new_deps.insert(id, dep.clone());
                !sets.deps.contains_key(&id)
            }
        };

        if subscribe {
            if let Some(me) = self.me.upgrade() {
                let me: Arc<dyn Subscriber> = me;
                dep.add_sub(&me);
            }
        }
    }
}

impl<T> Job for WatcherInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn before(&self) {
        if let Some(before) = &self.before {
            if self.is_active() {
                before();
            }
        }
    }

    fn run(&self) {
        WatcherInner::run(self);
    }
}

impl<T> Drop for WatcherInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A reactive computation that re-evaluates when the state it read changes.
///
/// Cloning a `Watcher` creates a new handle to the same computation. The
/// watcher is torn down when the last handle is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let count = Observed::new(1);
///
/// let label = Watcher::watch(
///     { let count = count.clone(); move || format!("count = {}", count.get()) },
///     |new, old| println!("{old:?} -> {new}"),
/// );
///
/// count.set(2); // prints: Some("count = 1") -> count = 2
/// label.teardown();
/// count.set(3); // prints nothing
/// ```
pub struct Watcher<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<WatcherInner<T>>,
}

impl<T> Watcher<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a render watcher. The getter runs immediately.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder(getter).build()
    }

    /// Create a computed watcher. The getter does not run until
    /// [`evaluate`](Self::evaluate) is called.
    pub fn lazy<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder(getter).lazy().build()
    }

    /// Create a user watcher that calls `callback(new, old)` whenever a
    /// re-run produces a different value.
    pub fn watch<F, C>(getter: F, callback: C) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        Self::builder(getter).on_change(callback).build()
    }

    /// Start configuring a watcher.
    pub fn builder<F>(getter: F) -> WatcherBuilder<T>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        WatcherBuilder {
            getter: Box::new(getter),
            lazy: false,
            sync: false,
            immediate: false,
            callback: None,
            before: None,
            queue: None,
        }
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Get what kind of watcher this is.
    pub fn kind(&self) -> WatcherKind {
        self.inner.kind
    }

    /// Run one tracked pass of the getter and return its result.
    ///
    /// The dependency set is replaced by whatever this pass reads. The
    /// stored value is left alone: use [`run`](Self::run) or
    /// [`evaluate`](Self::evaluate) for that.
    ///
    /// If the getter panics, the target stack is restored and the deps read
    /// so far are reconciled before the panic continues.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Recompute, store the value, and clear the dirty flag.
    pub fn evaluate(&self) -> T {
        self.inner.evaluate()
    }

    /// Recompute and, if the value changed, store it and fire the change
    /// callback. Does nothing once torn down.
    pub fn run(&self) {
        self.inner.run();
    }

    /// React to a change in one of the watcher's Deps.
    pub fn update(&self) {
        Subscriber::update(&*self.inner);
    }

    /// Register every Dep this watcher read with the active target.
    ///
    /// Lets an outer computation that reads a computed value depend on the
    /// computed value's own sources.
    pub fn depend(&self) {
        self.inner.depend();
    }

    /// Unsubscribe from every Dep and stop reacting. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    /// Check if the watcher has not been torn down.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Check if a computed watcher needs to re-evaluate.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Get the last stored value.
    pub fn value(&self) -> Option<T> {
        self.inner.value.lock().clone()
    }

    /// Get the IDs of the Deps read by the last completed pass.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.deps.lock().deps.keys().copied().collect()
    }

    /// Get the number of Deps read by the last completed pass.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().deps.len()
    }

    /// Get the number of times the getter has run.
    pub fn evaluation_count(&self) -> usize {
        self.inner.evaluations.load(Ordering::Relaxed)
    }
}

impl<T> Clone for Watcher<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Watcher<T>
where
    T: Clone + Send + Sync + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("value", &self.value())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Configures and creates a [`Watcher`].
pub struct WatcherBuilder<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    getter: Getter<T>,
    lazy: bool,
    sync: bool,
    immediate: bool,
    callback: Option<Callback<T>>,
    before: Option<Hook>,
    queue: Option<UpdateQueue>,
}

impl<T> WatcherBuilder<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Make this a computed watcher. Overrides every other option except
    /// the getter: lazy watchers never run on their own, so they never
    /// queue and never call back.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Re-run inside `update()` even when a queue is attached.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Call the change callback once at creation, with no old value.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Call `callback(new, old)` whenever a re-run changes the value.
    pub fn on_change<C>(mut self, callback: C) -> Self
    where
        C: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Run `hook` right before the queue re-runs this watcher.
    pub fn before<H>(mut self, hook: H) -> Self
    where
        H: Fn() + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Defer re-runs to `queue` instead of running inside `update()`.
    pub fn queue(mut self, queue: &UpdateQueue) -> Self {
        self.queue = Some(queue.clone());
        self
    }

    /// Create the watcher. Non-lazy watchers evaluate once here.
    pub fn build(self) -> Watcher<T> {
        let kind = if self.lazy {
            WatcherKind::Computed
        } else if self.callback.is_some() {
            WatcherKind::User
        } else {
            WatcherKind::Render
        };

        let inner = Arc::new_cyclic(|me| WatcherInner {
            id: SubscriberId::new(),
            kind,
            me: me.clone(),
            getter: self.getter,
            callback: self.callback,
            before: self.before,
            sync: self.sync,
            queue: self.queue,
            value: Mutex::new(None),
            deps: Mutex::new(DepSets::default()),
            dirty: AtomicBool::new(self.lazy),
            active: AtomicBool::new(true),
            evaluating: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            evaluations: AtomicUsize::new(0),
        });

        debug!(watcher = %inner.id, kind = ?kind, "watcher created");

        if !self.lazy {
            let value = inner.compute();
            *inner.value.lock() = Some(value.clone());

            if self.immediate {
                if let Some(callback) = &inner.callback {
                    callback(&value, None);
                }
            }
        }

        Watcher { inner }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
